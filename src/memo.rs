use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

/// Recently dispatched change identities.
///
/// Entries expire after `ttl`, and the oldest entry is evicted once
/// `capacity` is reached, so memory stays bounded regardless of load.
#[derive(Debug)]
pub struct SentEventMemo {
    ttl: Duration,
    capacity: usize,
    seen: HashMap<String, Instant>,
    order: VecDeque<(String, Instant)>,
}

impl SentEventMemo {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record `identity` and return `true` if it was not already remembered.
    pub fn check_and_insert(&mut self, identity: &str, now: Instant) -> bool {
        self.purge(now);
        if self.seen.contains_key(identity) {
            return false;
        }
        while self.seen.len() >= self.capacity {
            if !self.evict_front() {
                break;
            }
        }
        self.seen.insert(identity.to_string(), now);
        self.order.push_back((identity.to_string(), now));
        true
    }

    /// Drop every entry older than the ttl.
    pub fn purge(&mut self, now: Instant) {
        while let Some((_, inserted)) = self.order.front() {
            if now.saturating_duration_since(*inserted) < self.ttl {
                break;
            }
            self.evict_front();
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict_front(&mut self) -> bool {
        match self.order.pop_front() {
            Some((identity, inserted)) => {
                // Only remove if the map still points at this insertion.
                if self.seen.get(&identity) == Some(&inserted) {
                    self.seen.remove(&identity);
                }
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_until_expiry() {
        let mut memo = SentEventMemo::new(Duration::from_secs(60), 100);
        let t0 = Instant::now();
        assert!(memo.check_and_insert("pokemon:e1:0", t0));
        assert!(!memo.check_and_insert("pokemon:e1:0", t0 + Duration::from_secs(30)));
        assert!(memo.check_and_insert("pokemon:e1:0", t0 + Duration::from_secs(61)));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut memo = SentEventMemo::new(Duration::from_secs(600), 2);
        let now = Instant::now();
        assert!(memo.check_and_insert("a", now));
        assert!(memo.check_and_insert("b", now));
        assert!(memo.check_and_insert("c", now));
        assert_eq!(memo.len(), 2);
        assert!(memo.check_and_insert("a", now));
        assert!(!memo.check_and_insert("c", now));
    }

    #[test]
    fn purge_empties_expired() {
        let mut memo = SentEventMemo::new(Duration::from_secs(1), 10);
        let now = Instant::now();
        memo.check_and_insert("a", now);
        memo.check_and_insert("b", now);
        memo.purge(now + Duration::from_secs(2));
        assert!(memo.is_empty());
    }
}
