//! Sorted set with dual indexing
//!
//! - HashMap for O(1) member-to-score lookups
//! - BTreeSet of `(score, member)` for ordered range queries and ranking

use super::entry::normalize_range;
use crate::core::{Aggregate, ScoredMember, Value};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

/// Wrapper for f64 that provides total ordering
#[derive(Debug, Clone, Copy)]
pub struct OrderedFloat(pub f64);

impl OrderedFloat {
    pub fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        // NaN sorts below everything
        match (self.0.is_nan(), other.0.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.0.total_cmp(&other.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SortedSetValue {
    scores: HashMap<Value, OrderedFloat>,
    sorted: BTreeSet<(OrderedFloat, Value)>,
}

impl SortedSetValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Add or update a member. Returns true if the member is new.
    pub fn add(&mut self, member: Value, score: f64) -> bool {
        let score = OrderedFloat(score);
        match self.scores.insert(member.clone(), score) {
            Some(old) => {
                self.sorted.remove(&(old, member.clone()));
                self.sorted.insert((score, member));
                false
            }
            None => {
                self.sorted.insert((score, member));
                true
            }
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove_entry(member) {
            Some((member, score)) => {
                self.sorted.remove(&(score, member));
                true
            }
            None => false,
        }
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).map(|score| score.get())
    }

    /// Increment the member's score (missing members start at 0)
    pub fn incr_by(&mut self, member: Value, delta: f64) -> f64 {
        let score = self.score(&member).unwrap_or(0.0) + delta;
        self.add(member, score);
        score
    }

    /// Members with ranks in `start..=end`
    pub fn range(&self, start: i64, end: i64, reverse: bool) -> Vec<ScoredMember> {
        let Some((start, end)) = normalize_range(self.len(), start, end) else {
            return Vec::new();
        };
        let take = end - start + 1;
        if reverse {
            self.sorted.iter().rev().skip(start).take(take).map(to_scored).collect()
        } else {
            self.sorted.iter().skip(start).take(take).map(to_scored).collect()
        }
    }

    /// Members with `min <= score <= max`, then `offset`/`count` applied in
    /// result order
    pub fn range_by_score(
        &self,
        min: f64,
        max: f64,
        offset: Option<usize>,
        count: Option<usize>,
        reverse: bool,
    ) -> Vec<ScoredMember> {
        let offset = offset.unwrap_or(0);
        let count = count.unwrap_or(usize::MAX);
        let in_range = self.score_window(min, max);
        if reverse {
            in_range.rev().skip(offset).take(count).map(to_scored).collect()
        } else {
            in_range.skip(offset).take(count).map(to_scored).collect()
        }
    }

    pub fn count(&self, min: f64, max: f64) -> usize {
        self.score_window(min, max).count()
    }

    /// 0-based rank, from the highest score when `reverse`
    pub fn rank(&self, member: &[u8], reverse: bool) -> Option<usize> {
        let score = *self.scores.get(member)?;
        let rank = self
            .sorted
            .range(..(score, member.to_vec()))
            .count();
        Some(if reverse { self.len() - rank - 1 } else { rank })
    }

    /// Remove members with ranks in `start..=end`
    pub fn remove_range_by_rank(&mut self, start: i64, end: i64) -> usize {
        let doomed: Vec<_> = self
            .range(start, end, false)
            .into_iter()
            .map(|scored| scored.member)
            .collect();
        doomed.iter().filter(|member| self.remove(member)).count()
    }

    /// Remove members with `min <= score <= max`
    pub fn remove_range_by_score(&mut self, min: f64, max: f64) -> usize {
        let doomed: Vec<_> = self
            .score_window(min, max)
            .map(|(_, member)| member.clone())
            .collect();
        doomed.iter().filter(|member| self.remove(member)).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, f64)> {
        self.sorted.iter().map(|(score, member)| (member, score.get()))
    }

    /// Union of `sources`, combining the scores of shared members
    pub fn union<'a>(
        sources: impl IntoIterator<Item = &'a SortedSetValue>,
        aggregate: Aggregate,
    ) -> Self {
        let mut combined: HashMap<Value, f64> = HashMap::new();
        for source in sources {
            for (member, score) in source.iter() {
                combined
                    .entry(member.clone())
                    .and_modify(|current| *current = aggregate.combine(*current, score))
                    .or_insert(score);
            }
        }

        let mut result = Self::new();
        for (member, score) in combined {
            result.add(member, score);
        }
        result
    }

    fn score_window(
        &self,
        min: f64,
        max: f64,
    ) -> impl DoubleEndedIterator<Item = &(OrderedFloat, Value)> {
        let lower = (OrderedFloat(min), Vec::new());
        let max = OrderedFloat(max);
        let upper = if lower.0 > max {
            Bound::Excluded(lower.clone())
        } else {
            // first entry scoring above `max`
            self.sorted
                .range((Bound::Included((max, Vec::new())), Bound::Unbounded))
                .find(|(score, _)| *score > max)
                .cloned()
                .map_or(Bound::Unbounded, Bound::Excluded)
        };
        self.sorted.range((Bound::Included(lower), upper))
    }
}

fn to_scored((score, member): &(OrderedFloat, Value)) -> ScoredMember {
    ScoredMember::new(member.clone(), score.get())
}
