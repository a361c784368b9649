//! Named-room lookup over a bounded pool.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::board::{RuleEngine, StandardRules};
use crate::constants::DEFAULT_MAX_ROOMS;
use crate::room::{Room, RoomHandle};
use crate::{Error, Result};

/// Rooms in creation order. Rooms are never evicted; once `capacity` rooms
/// exist, new names are refused.
pub struct RoomRegistry<E: RuleEngine = StandardRules> {
    engine: Arc<E>,
    capacity: usize,
    rooms: Mutex<Vec<RoomHandle<E>>>,
}

impl Default for RoomRegistry<StandardRules> {
    fn default() -> Self {
        Self::new(StandardRules, DEFAULT_MAX_ROOMS)
    }
}

impl<E: RuleEngine> RoomRegistry<E> {
    pub fn new(engine: E, capacity: usize) -> Self {
        Self {
            engine: Arc::new(engine),
            capacity,
            rooms: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.lock().await.is_empty()
    }

    /// Snapshot of all rooms in creation order.
    pub async fn rooms(&self) -> Vec<RoomHandle<E>> {
        self.rooms.lock().await.clone()
    }

    /// Find a room by exact name, creating it if there is room in the pool.
    pub async fn get_or_create(&self, name: &str) -> Result<RoomHandle<E>> {
        let mut rooms = self.rooms.lock().await;

        if let Some(room) = rooms.iter().find(|room| room.name() == name) {
            return Ok(room.clone());
        }

        if rooms.len() >= self.capacity {
            return Err(Error::RegistryFull {
                capacity: self.capacity,
            });
        }

        let room = Arc::new(Room::new(name, self.engine.clone()));
        rooms.push(room.clone());
        tracing::info!(room = %name, total = rooms.len(), "Created new room");
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::Color;

    #[tokio::test]
    async fn test_same_name_same_room() {
        let registry = RoomRegistry::default();
        let a = registry.get_or_create("r1").await.unwrap();
        let b = registry.get_or_create("r1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_names_are_case_sensitive() {
        let registry = RoomRegistry::default();
        let a = registry.get_or_create("Room").await.unwrap();
        let b = registry.get_or_create("room").await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_full_registry() {
        let registry = RoomRegistry::new(StandardRules, 2);
        registry.get_or_create("a").await.unwrap();
        registry.get_or_create("b").await.unwrap();
        assert!(matches!(
            registry.get_or_create("c").await,
            Err(Error::RegistryFull { capacity: 2 })
        ));
        // Existing rooms remain reachable.
        assert!(registry.get_or_create("a").await.is_ok());

        let names: Vec<String> = registry
            .rooms()
            .await
            .iter()
            .map(|room| room.name().to_string())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_new_room_is_fresh() {
        let registry = RoomRegistry::default();
        let room = registry.get_or_create("fresh").await.unwrap();
        let state = room.lock().await;
        assert!(state.slots().is_empty());
        assert_eq!(state.turn(), Color::White);
    }

    #[tokio::test]
    async fn test_concurrent_first_join_creates_one_room() {
        let registry = Arc::new(RoomRegistry::default());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.get_or_create("race").await.unwrap()
            }));
        }
        let mut rooms = Vec::new();
        for handle in handles {
            rooms.push(handle.await.unwrap());
        }
        assert!(rooms.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len().await, 1);
    }
}
