//! chess-debug: line client for poking at a running chess-server.
//!
//! Every stdin line is sent as-is; every server line is printed with a `<` prefix.
//!
//! ```text
//! chess-debug 127.0.0.1:6000
//! {"type":"join","room":"r1"}
//! {"type":"move","move":"e2e4"}
//! ```

use chess_rooms::constants::{DEFAULT_HOST, DEFAULT_PORT};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT));

    println!("Connecting to {}...", addr);
    let stream = TcpStream::connect(&addr).await?;
    stream.set_nodelay(true)?;
    println!("Connected!");

    let (read_half, mut write_half) = stream.into_split();

    let printer = tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => println!("< {}", line),
                Ok(None) => {
                    println!("Server closed the connection");
                    break;
                }
                Err(e) => {
                    eprintln!("Read error: {}", e);
                    break;
                }
            }
        }
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if printer.is_finished() {
            break;
        }
        write_half.write_all(line.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
    }

    write_half.shutdown().await?;
    printer.await?;
    Ok(())
}
