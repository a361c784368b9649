//! Chess rule engine.
//!
//! The room core only talks to the [`RuleEngine`] trait. [`StandardRules`] is the
//! engine the server ships with: regular piece movement, pawn double steps and
//! promotion, check, checkmate and stalemate. Castling and en passant are not
//! supported, matching the web client.

use std::fmt;
use std::str::FromStr;

use crate::constants::{Color, GameEndReason, Winner};
use crate::{Error, Result};

/// Board layout of the standard starting position, rank 8 first.
pub const STARTING_LAYOUT: &str =
    "rnbqkbnr/pppppppp/......../......../......../......../PPPPPPPP/RNBQKBNR";

/// A square on the board. `file` 0 is the a-file, `rank` 0 is rank 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        (file < 8 && rank < 8).then_some(Self { file, rank })
    }

    pub fn file(&self) -> u8 {
        self.file
    }

    pub fn rank(&self) -> u8 {
        self.rank
    }

    fn index(&self) -> usize {
        self.rank as usize * 8 + self.file as usize
    }

    fn offset(&self, df: i8, dr: i8) -> Option<Self> {
        let file = self.file as i8 + df;
        let rank = self.rank as i8 + dr;
        if (0..8).contains(&file) && (0..8).contains(&rank) {
            Some(Self {
                file: file as u8,
                rank: rank as u8,
            })
        } else {
            None
        }
    }
}

impl FromStr for Square {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(Error::InvalidSquare(s.to_string()));
        }
        let file = bytes[0].to_ascii_lowercase().wrapping_sub(b'a');
        let rank = bytes[1].wrapping_sub(b'1');
        Square::new(file, rank).ok_or_else(|| Error::InvalidSquare(s.to_string()))
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.file) as char, self.rank + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceKind::Pawn),
            'n' => Some(PieceKind::Knight),
            'b' => Some(PieceKind::Bishop),
            'r' => Some(PieceKind::Rook),
            'q' => Some(PieceKind::Queen),
            'k' => Some(PieceKind::King),
            _ => None,
        }
    }

    fn as_char(&self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: Color,
}

impl Piece {
    /// Uppercase letters are white pieces, lowercase are black.
    pub fn from_char(c: char) -> Option<Self> {
        let kind = PieceKind::from_char(c)?;
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        Some(Self { kind, color })
    }

    pub fn as_char(&self) -> char {
        let c = self.kind.as_char();
        match self.color {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }
}

/// A move as sent by a client: `e2e4`, optionally followed by a promotion piece (`e7e8n`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
}

impl Move {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }
}

impl FromStr for Move {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if !s.is_ascii() || !(4..=5).contains(&s.len()) {
            return Err(Error::MalformedMessage(format!("invalid move '{}'", s)));
        }
        let from = s[0..2].parse()?;
        let to = s[2..4].parse()?;
        let promotion = match s[4..].chars().next() {
            Some(c) => Some(PieceKind::from_char(c).ok_or_else(|| {
                Error::MalformedMessage(format!("invalid promotion piece '{}'", c))
            })?),
            None => None,
        };
        Ok(Self {
            from,
            to,
            promotion,
        })
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(kind) = self.promotion {
            write!(f, "{}", kind.as_char())?;
        }
        Ok(())
    }
}

/// Game status after a move has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Continued,
    Ended {
        winner: Winner,
        reason: GameEndReason,
    },
}

/// Rule engine the room core delegates to.
///
/// The engine owns the board representation. The core only guarantees that
/// calls for one room never run concurrently.
pub trait RuleEngine: Send + Sync + 'static {
    type State: Send + 'static;

    /// Starting position, white to move.
    fn init_board(&self) -> Self::State;

    /// Apply `mv` in place. Returns false if the move was rejected and the
    /// state left untouched.
    fn apply_move(&self, state: &mut Self::State, mv: &Move) -> bool;

    fn check_outcome(&self, state: &Self::State) -> MoveOutcome;

    /// Side to move.
    fn turn(&self, state: &Self::State) -> Color;

    /// Board representation sent to clients.
    fn serialize_board(&self, state: &Self::State) -> String;
}

const KNIGHT_STEPS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];
const KING_STEPS: [(i8, i8); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];
const ROOK_DIRS: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const BISHOP_DIRS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    squares: [Option<Piece>; 64],
    turn: Color,
}

impl Default for Board {
    fn default() -> Self {
        Self::standard()
    }
}

impl Board {
    pub fn standard() -> Self {
        match Self::from_layout(STARTING_LAYOUT, Color::White) {
            Ok(board) => board,
            Err(_) => unreachable!("starting layout is valid"),
        }
    }

    /// Build a board from the serialized layout: eight ranks from rank 8 down
    /// to rank 1 separated by `/`, `.` for an empty square.
    pub fn from_layout(layout: &str, turn: Color) -> Result<Self> {
        let ranks: Vec<&str> = layout.split('/').collect();
        if ranks.len() != 8 {
            return Err(Error::MalformedMessage(format!(
                "layout has {} ranks",
                ranks.len()
            )));
        }

        let mut squares = [None; 64];
        for (row, rank_str) in ranks.iter().enumerate() {
            let chars: Vec<char> = rank_str.chars().collect();
            if chars.len() != 8 {
                return Err(Error::MalformedMessage(format!(
                    "rank '{}' is not 8 squares",
                    rank_str
                )));
            }
            let rank = 7 - row;
            for (file, c) in chars.into_iter().enumerate() {
                squares[rank * 8 + file] = match c {
                    '.' => None,
                    c => Some(Piece::from_char(c).ok_or_else(|| {
                        Error::MalformedMessage(format!("unknown piece '{}'", c))
                    })?),
                };
            }
        }

        Ok(Self { squares, turn })
    }

    pub fn layout(&self) -> String {
        let mut out = String::with_capacity(71);
        for rank in (0..8).rev() {
            if rank != 7 {
                out.push('/');
            }
            for file in 0..8 {
                out.push(
                    self.squares[rank * 8 + file]
                        .map(|p| p.as_char())
                        .unwrap_or('.'),
                );
            }
        }
        out
    }

    pub fn turn(&self) -> Color {
        self.turn
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.squares[sq.index()]
    }

    /// Play `mv` for the side to move. Illegal moves leave the board untouched.
    pub fn play(&mut self, mv: &Move) -> bool {
        let Some(piece) = self.piece_at(mv.from) else {
            return false;
        };
        if piece.color != self.turn || !self.legal_targets(mv.from).contains(&mv.to) {
            return false;
        }

        self.move_piece(mv);
        self.turn = self.turn.opposite();
        true
    }

    pub fn outcome(&self) -> MoveOutcome {
        if self.has_legal_move(self.turn) {
            return MoveOutcome::Continued;
        }
        if self.in_check(self.turn) {
            MoveOutcome::Ended {
                winner: self.turn.opposite().into(),
                reason: GameEndReason::Checkmate,
            }
        } else {
            MoveOutcome::Ended {
                winner: Winner::Draw,
                reason: GameEndReason::Stalemate,
            }
        }
    }

    pub fn in_check(&self, color: Color) -> bool {
        self.king_square(color)
            .is_some_and(|king| self.is_attacked(king, color.opposite()))
    }

    fn move_piece(&mut self, mv: &Move) {
        let Some(mut piece) = self.squares[mv.from.index()].take() else {
            return;
        };
        let last_rank = match piece.color {
            Color::White => 7,
            Color::Black => 0,
        };
        if piece.kind == PieceKind::Pawn && mv.to.rank == last_rank {
            piece.kind = match mv.promotion {
                Some(kind @ (PieceKind::Knight | PieceKind::Bishop | PieceKind::Rook)) => kind,
                _ => PieceKind::Queen,
            };
        }
        self.squares[mv.to.index()] = Some(piece);
    }

    fn squares_of(&self, color: Color) -> impl Iterator<Item = Square> + '_ {
        (0..64u8).filter_map(move |i| {
            let sq = Square {
                file: i % 8,
                rank: i / 8,
            };
            self.piece_at(sq)
                .filter(|p| p.color == color)
                .map(|_| sq)
        })
    }

    fn king_square(&self, color: Color) -> Option<Square> {
        self.squares_of(color).find(|sq| {
            self.piece_at(*sq)
                .is_some_and(|p| p.kind == PieceKind::King)
        })
    }

    fn is_attacked(&self, target: Square, by: Color) -> bool {
        self.squares_of(by)
            .any(|from| self.attacks(from).contains(&target))
    }

    fn has_legal_move(&self, color: Color) -> bool {
        self.squares_of(color)
            .any(|from| !self.legal_targets(from).is_empty())
    }

    /// Targets that do not leave the mover's own king in check.
    fn legal_targets(&self, from: Square) -> Vec<Square> {
        let Some(piece) = self.piece_at(from) else {
            return Vec::new();
        };
        self.pseudo_targets(from)
            .into_iter()
            .filter(|to| {
                let mut next = self.clone();
                next.move_piece(&Move::new(from, *to));
                !next.in_check(piece.color)
            })
            .collect()
    }

    fn pseudo_targets(&self, from: Square) -> Vec<Square> {
        let Some(piece) = self.piece_at(from) else {
            return Vec::new();
        };
        if piece.kind != PieceKind::Pawn {
            return self
                .attacks(from)
                .into_iter()
                .filter(|to| self.piece_at(*to).is_none_or(|p| p.color != piece.color))
                .collect();
        }

        let (dir, start_rank) = match piece.color {
            Color::White => (1, 1),
            Color::Black => (-1, 6),
        };
        let mut targets = Vec::new();
        if let Some(one) = from.offset(0, dir).filter(|sq| self.piece_at(*sq).is_none()) {
            targets.push(one);
            if from.rank == start_rank {
                targets.extend(one.offset(0, dir).filter(|sq| self.piece_at(*sq).is_none()));
            }
        }
        targets.extend(self.attacks(from).into_iter().filter(|to| {
            self.piece_at(*to)
                .is_some_and(|p| p.color != piece.color)
        }));
        targets
    }

    /// Squares the piece on `from` attacks, including squares held by its own side.
    fn attacks(&self, from: Square) -> Vec<Square> {
        let Some(piece) = self.piece_at(from) else {
            return Vec::new();
        };
        match piece.kind {
            PieceKind::Pawn => {
                let dir = match piece.color {
                    Color::White => 1,
                    Color::Black => -1,
                };
                [-1, 1]
                    .into_iter()
                    .filter_map(|df| from.offset(df, dir))
                    .collect()
            }
            PieceKind::Knight => KNIGHT_STEPS
                .iter()
                .filter_map(|(df, dr)| from.offset(*df, *dr))
                .collect(),
            PieceKind::King => KING_STEPS
                .iter()
                .filter_map(|(df, dr)| from.offset(*df, *dr))
                .collect(),
            PieceKind::Rook => self.slide(from, &ROOK_DIRS),
            PieceKind::Bishop => self.slide(from, &BISHOP_DIRS),
            PieceKind::Queen => {
                let mut targets = self.slide(from, &ROOK_DIRS);
                targets.extend(self.slide(from, &BISHOP_DIRS));
                targets
            }
        }
    }

    fn slide(&self, from: Square, dirs: &[(i8, i8)]) -> Vec<Square> {
        let mut targets = Vec::new();
        for (df, dr) in dirs {
            let mut cur = from;
            while let Some(next) = cur.offset(*df, *dr) {
                targets.push(next);
                if self.piece_at(next).is_some() {
                    break;
                }
                cur = next;
            }
        }
        targets
    }
}

/// The rule engine used by the server binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRules;

impl RuleEngine for StandardRules {
    type State = Board;

    fn init_board(&self) -> Board {
        Board::standard()
    }

    fn apply_move(&self, state: &mut Board, mv: &Move) -> bool {
        state.play(mv)
    }

    fn check_outcome(&self, state: &Board) -> MoveOutcome {
        state.outcome()
    }

    fn turn(&self, state: &Board) -> Color {
        state.turn()
    }

    fn serialize_board(&self, state: &Board) -> String {
        state.layout()
    }
}
