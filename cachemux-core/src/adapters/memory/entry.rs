use super::sorted_set::SortedSetValue;
use crate::core::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

/// Typed payload of one key
#[derive(Debug, Clone)]
pub(super) enum Data {
    Bytes(Value),
    List(VecDeque<Value>),
    Hash(HashMap<String, Value>),
    Set(HashSet<Value>),
    SortedSet(SortedSetValue),
}

impl Data {
    pub(super) fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "string",
            Self::List(_) => "list",
            Self::Hash(_) => "hash",
            Self::Set(_) => "set",
            Self::SortedSet(_) => "zset",
        }
    }
}

/// Stored value with its absolute expiration
#[derive(Debug, Clone)]
pub(super) struct StoredValue {
    pub data: Data,
    pub expires_at: Option<Instant>,
}

impl StoredValue {
    pub fn new(data: Data, expires_at: Option<Instant>) -> Self {
        Self { data, expires_at }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A collection type that can live under a key
pub(super) trait Collection: Default {
    const KIND: &'static str;

    fn from_data(data: &Data) -> Option<&Self>;

    fn from_data_mut(data: &mut Data) -> Option<&mut Self>;

    fn into_data(self) -> Data;

    fn is_empty(&self) -> bool;
}

macro_rules! impl_collection {
    ($ty:ty, $variant:ident, $kind:literal) => {
        impl Collection for $ty {
            const KIND: &'static str = $kind;

            fn from_data(data: &Data) -> Option<&Self> {
                match data {
                    Data::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_data_mut(data: &mut Data) -> Option<&mut Self> {
                match data {
                    Data::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_data(self) -> Data {
                Data::$variant(self)
            }

            fn is_empty(&self) -> bool {
                <$ty>::is_empty(self)
            }
        }
    };
}

impl_collection!(VecDeque<Value>, List, "list");
impl_collection!(HashMap<String, Value>, Hash, "hash");
impl_collection!(HashSet<Value>, Set, "set");
impl_collection!(SortedSetValue, SortedSet, "zset");

/// Map an inclusive `start..=end` range with negative indices counting from
/// the tail onto `0..len`. `None` when the range selects nothing.
pub(super) fn normalize_range(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let start = if start < 0 { len + start } else { start }.max(0);
    let end = if end < 0 { len + end } else { end }.min(len - 1);
    if start > end || start >= len {
        return None;
    }
    Some((start as usize, end as usize))
}

/// Map a single possibly-negative index onto `0..len`
pub(super) fn normalize_index(len: usize, index: i64) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_normalize_range() {
        assert_eq!(normalize_range(5, 0, -1), Some((0, 4)));
        assert_eq!(normalize_range(5, 1, 2), Some((1, 2)));
        assert_eq!(normalize_range(5, -2, -1), Some((3, 4)));
        assert_eq!(normalize_range(5, -100, 100), Some((0, 4)));
        assert_eq!(normalize_range(5, 3, 1), None);
        assert_eq!(normalize_range(5, 5, 10), None);
        assert_eq!(normalize_range(5, 0, -6), None);
        assert_eq!(normalize_range(0, 0, -1), None);
    }

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(3, 0), Some(0));
        assert_eq!(normalize_index(3, -1), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(3, -4), None);
        assert_eq!(normalize_index(0, 0), None);
    }

    #[test]
    fn test_expiration() {
        let now = Instant::now();
        let entry = StoredValue::new(Data::Bytes(b"v".to_vec()), Some(now));
        assert!(entry.is_expired(now));

        let entry = StoredValue::new(
            Data::Bytes(b"v".to_vec()),
            Some(now + Duration::from_secs(10)),
        );
        assert!(!entry.is_expired(now));

        let entry = StoredValue::new(Data::List(VecDeque::new()), None);
        assert!(!entry.is_expired(now));
        assert_eq!(entry.data.kind(), "list");
    }
}
