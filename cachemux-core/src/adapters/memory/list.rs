//! List helpers and blocking-pop notifications
//!
//! Pushes notify a per-key broadcast channel; blocked pops subscribe before
//! checking the list so a push between the check and the wait is not lost.

use super::entry::{normalize_index, normalize_range};
use crate::core::Value;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 16;

/// Which end of the list a pop takes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum End {
    Left,
    Right,
}

impl End {
    pub fn pop(self, list: &mut VecDeque<Value>) -> Option<Value> {
        match self {
            Self::Left => list.pop_front(),
            Self::Right => list.pop_back(),
        }
    }
}

pub(super) fn index(list: &VecDeque<Value>, index: i64) -> Option<Value> {
    normalize_index(list.len(), index).and_then(|i| list.get(i).cloned())
}

pub(super) fn range(list: &VecDeque<Value>, start: i64, end: i64) -> Vec<Value> {
    match normalize_range(list.len(), start, end) {
        Some((start, end)) => list.range(start..=end).cloned().collect(),
        None => Vec::new(),
    }
}

/// Keep `start..=end`; an empty range empties the list
pub(super) fn trim(list: &mut VecDeque<Value>, start: i64, end: i64) {
    match normalize_range(list.len(), start, end) {
        Some((start, end)) => {
            list.truncate(end + 1);
            list.drain(..start);
        }
        None => list.clear(),
    }
}

/// Per-key wake-ups for blocked pops
#[derive(Default)]
pub(super) struct Waiters {
    channels: RwLock<HashMap<String, broadcast::Sender<()>>>,
}

impl Waiters {
    pub fn subscribe(&self, key: &str) -> broadcast::Receiver<()> {
        let mut channels = self.channels.write();
        channels
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn notify(&self, key: &str) {
        if let Some(tx) = self.channels.read().get(key) {
            let _ = tx.send(());
        }
    }

    /// Drop channels nobody is waiting on
    pub fn prune(&self) {
        self.channels
            .write()
            .retain(|_, tx| tx.receiver_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> VecDeque<Value> {
        items.iter().map(|item| item.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_index() {
        let items = list(&["a", "b", "c"]);
        assert_eq!(index(&items, 0), Some(b"a".to_vec()));
        assert_eq!(index(&items, -1), Some(b"c".to_vec()));
        assert_eq!(index(&items, 3), None);
    }

    #[test]
    fn test_range_inclusive() {
        let items = list(&["a", "b", "c", "d"]);
        assert_eq!(range(&items, 1, 2), Vec::from(list(&["b", "c"])));
        assert_eq!(range(&items, 0, -1), Vec::from(list(&["a", "b", "c", "d"])));
        assert!(range(&items, 2, 1).is_empty());
    }

    #[test]
    fn test_trim() {
        let mut items = list(&["a", "b", "c", "d", "e"]);
        trim(&mut items, 1, -2);
        assert_eq!(items, list(&["b", "c", "d"]));

        trim(&mut items, 5, 10);
        assert!(items.is_empty());
    }

    #[test]
    fn test_pop_ends() {
        let mut items = list(&["a", "b"]);
        assert_eq!(End::Right.pop(&mut items), Some(b"b".to_vec()));
        assert_eq!(End::Left.pop(&mut items), Some(b"a".to_vec()));
        assert_eq!(End::Left.pop(&mut items), None);
    }

    #[tokio::test]
    async fn test_waiters_wake_subscribers() {
        let waiters = Waiters::default();
        let mut rx = waiters.subscribe("jobs");
        waiters.notify("jobs");
        assert!(rx.recv().await.is_ok());

        drop(rx);
        waiters.prune();
        assert!(waiters.channels.read().is_empty());
    }
}
