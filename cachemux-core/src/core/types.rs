use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Raw cache value. Encoding is left to the caller and to the backend.
pub type Value = Vec<u8>;

/// Default expiration applied when a write does not specify one (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 1;

/// Expiration requested by a write
///
/// `0` on the wire means "never expire" and an absent value means
/// "use the backend default", so both conversions from integers map
/// those two sentinels onto their own variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Timeout {
    /// Use the backend's configured default
    #[default]
    Default,
    /// Never expire
    Never,
    /// Expire after this many seconds; `Seconds(0)` behaves like `Never`
    Seconds(u64),
}

impl Timeout {
    /// Build from a number of seconds, where `0` means never expire
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 { Self::Never } else { Self::Seconds(secs) }
    }

    /// Relative lifetime, `None` meaning the entry never expires
    pub fn to_duration(self, default_secs: u64) -> Option<Duration> {
        match self {
            Self::Default if default_secs == 0 => None,
            Self::Default => Some(Duration::from_secs(default_secs)),
            Self::Never | Self::Seconds(0) => None,
            Self::Seconds(secs) => Some(Duration::from_secs(secs)),
        }
    }

    /// Absolute expiration instant, computed from `now`
    pub fn deadline(self, default_secs: u64, now: Instant) -> Option<Instant> {
        self.to_duration(default_secs).map(|ttl| now + ttl)
    }

    /// Seconds to hand to a network backend, `None` meaning no expiry
    pub fn resolve_secs(self, default_secs: u64) -> Option<u64> {
        self.to_duration(default_secs).map(|ttl| ttl.as_secs())
    }
}

impl From<Option<u64>> for Timeout {
    fn from(secs: Option<u64>) -> Self {
        secs.map_or(Self::Default, Self::from_secs)
    }
}

impl From<u64> for Timeout {
    fn from(secs: u64) -> Self {
        Self::from_secs(secs)
    }
}

/// A member-score pair in a sorted set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMember {
    pub member: Value,
    pub score: f64,
}

impl ScoredMember {
    pub fn new(member: impl Into<Value>, score: f64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

/// Map a rank range counted from the highest score onto the same members
/// counted from the lowest. `-1 - x` is defined for every `i64`.
pub(crate) fn reverse_rank_range(start: i64, end: i64) -> (i64, i64) {
    (-1 - end, -1 - start)
}

/// How scores are combined by `zunionstore`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    #[default]
    Sum,
    Min,
    Max,
}

impl Aggregate {
    pub fn combine(self, left: f64, right: f64) -> f64 {
        match self {
            Self::Sum => left + right,
            Self::Min => left.min(right),
            Self::Max => left.max(right),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}
