//! Fan-out and result merging shared by the composites

use crate::core::{CacheClient, Result};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A named child of a composite
#[derive(Clone)]
pub struct ChildCache {
    pub id: String,
    pub cache: Arc<dyn CacheClient>,
}

impl ChildCache {
    pub fn new(id: impl Into<String>, cache: Arc<dyn CacheClient>) -> Self {
        Self {
            id: id.into(),
            cache,
        }
    }
}

impl fmt::Debug for ChildCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildCache").field("id", &self.id).finish()
    }
}

/// Call every child in order and collect each outcome. Later children are
/// called even when earlier ones fail.
pub(crate) async fn fan_out<'a, T, F>(
    children: impl IntoIterator<Item = &'a ChildCache>,
    call: F,
) -> Vec<(&'a str, Result<T>)>
where
    F: Fn(&'a dyn CacheClient) -> BoxFuture<'a, Result<T>>,
{
    let mut outcomes = Vec::new();
    for child in children {
        let outcome = call(child.cache.as_ref()).await;
        outcomes.push((child.id.as_str(), outcome));
    }
    outcomes
}

/// AND-merge of boolean outcomes; a child error counts as `false`
pub(crate) fn all_succeeded(cache: &str, op: &str, outcomes: Vec<(&str, Result<bool>)>) -> bool {
    outcomes.into_iter().fold(true, |all, (child, outcome)| {
        let ok = match outcome {
            Ok(ok) => ok,
            Err(e) => {
                warn!("Cache '{}': {} failed on child '{}': {}", cache, op, child, e);
                false
            }
        };
        all && ok
    })
}

/// Largest count reported by any child; failing children are skipped
pub(crate) fn max_count(cache: &str, op: &str, outcomes: Vec<(&str, Result<usize>)>) -> usize {
    counts(cache, op, outcomes).max().unwrap_or(0)
}

fn counts<'a>(
    cache: &'a str,
    op: &'a str,
    outcomes: Vec<(&'a str, Result<usize>)>,
) -> impl Iterator<Item = usize> + 'a {
    outcomes
        .into_iter()
        .filter_map(move |(child, outcome)| match outcome {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Cache '{}': {} failed on child '{}': {}", cache, op, child, e);
                None
            }
        })
}

/// Log child failures of a best-effort fan-out whose results are discarded
pub(crate) fn log_failures<T>(cache: &str, op: &str, outcomes: Vec<(&str, Result<T>)>) {
    for (child, outcome) in outcomes {
        if let Err(e) = outcome {
            warn!("Cache '{}': {} failed on child '{}': {}", cache, op, child, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CacheError;

    fn failed<T>() -> Result<T> {
        Err(CacheError::Backend("down".to_string()))
    }

    #[test]
    fn test_all_succeeded_is_and() {
        assert!(all_succeeded("c", "set", vec![("a", Ok(true)), ("b", Ok(true))]));
        assert!(!all_succeeded("c", "set", vec![("a", Ok(true)), ("b", Ok(false))]));
        assert!(!all_succeeded("c", "set", vec![("a", failed()), ("b", Ok(true))]));
        assert!(all_succeeded("c", "set", vec![]));
    }

    #[test]
    fn test_max_count_skips_errors() {
        let outcomes = vec![("a", Ok(2)), ("b", failed()), ("c", Ok(5))];
        assert_eq!(max_count("c", "zrem", outcomes), 5);
        assert_eq!(max_count("c", "zrem", vec![]), 0);
    }
}
