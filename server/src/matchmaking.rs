//! Quick-play queue.
//!
//! Players wait in arrival order. Once enough are queued a batch is cut,
//! the first player in it becomes host of a fresh room and the rest fill it
//! up to its capacity.

use log::debug;
use shared::PlayerProfile;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    waiting: VecDeque<PlayerProfile>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a player. Returns false if they were already waiting.
    pub fn enqueue(&mut self, profile: PlayerProfile) -> bool {
        if self.contains(&profile.id) {
            return false;
        }
        debug!("Player {} joined matchmaking", profile.id);
        self.waiting.push_back(profile);
        true
    }

    pub fn remove(&mut self, player_id: &str) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|p| p.id != player_id);
        before != self.waiting.len()
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.waiting.iter().any(|p| p.id == player_id)
    }

    /// Cuts a batch of at most `max` players once `threshold` are waiting.
    pub fn take_batch(&mut self, threshold: usize, max: usize) -> Option<Vec<PlayerProfile>> {
        if threshold == 0 || self.waiting.len() < threshold {
            return None;
        }
        let take = self.waiting.len().min(max.max(threshold));
        Some(self.waiting.drain(..take).collect())
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str) -> PlayerProfile {
        PlayerProfile {
            id: id.to_string(),
            username: id.to_uppercase(),
            avatar_url: None,
        }
    }

    #[test]
    fn test_enqueue_dedupes() {
        let mut queue = MatchmakingQueue::new();
        assert!(queue.enqueue(profile("a")));
        assert!(!queue.enqueue(profile("a")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_batch_waits_for_threshold() {
        let mut queue = MatchmakingQueue::new();
        for id in ["a", "b", "c"] {
            queue.enqueue(profile(id));
        }
        assert!(queue.take_batch(4, 8).is_none());

        queue.enqueue(profile("d"));
        let batch = queue.take_batch(4, 8).unwrap();
        let ids: Vec<&str> = batch.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_batch_is_capped_at_room_size() {
        let mut queue = MatchmakingQueue::new();
        for i in 0..10 {
            queue.enqueue(profile(&format!("p{}", i)));
        }

        assert_eq!(queue.take_batch(4, 8).unwrap().len(), 8);
        assert_eq!(queue.len(), 2);
        assert!(queue.take_batch(4, 8).is_none());
    }

    #[test]
    fn test_remove_leaves_order() {
        let mut queue = MatchmakingQueue::new();
        for id in ["a", "b", "c"] {
            queue.enqueue(profile(id));
        }
        assert!(queue.remove("b"));
        assert!(!queue.remove("b"));
        assert!(queue.contains("c"));
        assert_eq!(queue.len(), 2);
    }
}
