//! Append-only per-channel buffers with running display limits.

use crate::core::channels::{Channel, SENTINEL};
use serde::{Deserialize, Serialize};

/// Running `(min, max)` over every value a channel has received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    range: Option<(f64, f64)>,
}

impl AggregateStats {
    /// Widen the range to include `value`; non-finite values are skipped.
    pub fn update(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.range = Some(match self.range {
            None => (value, value),
            Some((min, max)) => (min.min(value), max.max(value)),
        });
    }

    pub fn min(&self) -> Option<f64> {
        self.range.map(|(min, _)| min)
    }

    pub fn max(&self) -> Option<f64> {
        self.range.map(|(_, max)| max)
    }

    pub fn limits(&self) -> Option<(f64, f64)> {
        self.range
    }
}

/// Why a windowed read could not be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// No channel by that name
    UnknownChannel(String),
    /// No complete tick has been drawn yet
    NotReady,
    /// The channel has fewer samples than the window needs
    Misaligned {
        channel: Channel,
        len: usize,
        needed: usize,
    },
    /// Snapshot belongs to an earlier run
    StaleSnapshot,
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::UnknownChannel(name) => write!(f, "unknown channel '{name}'"),
            ReadError::NotReady => write!(f, "drawable window not ready"),
            ReadError::Misaligned {
                channel,
                len,
                needed,
            } => write!(f, "channel {channel} has {len} samples, window needs {needed}"),
            ReadError::StaleSnapshot => write!(f, "snapshot belongs to a previous run"),
        }
    }
}

impl std::error::Error for ReadError {}

/// Ordered, append-only sequences for every [`Channel`].
#[derive(Debug, Clone)]
pub struct ChannelStore {
    series: Vec<Vec<f64>>,
    stats: Vec<AggregateStats>,
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelStore {
    pub fn new() -> Self {
        Self {
            series: vec![Vec::new(); Channel::COUNT],
            stats: vec![AggregateStats::default(); Channel::COUNT],
        }
    }

    /// Append a value, updating limits for tracked channels.
    pub fn push(&mut self, channel: Channel, value: f64) {
        self.series[channel.index()].push(value);
        if channel.tracks_limits() {
            self.stats[channel.index()].update(value);
        }
    }

    /// Append the degenerate-transform marker without touching limits.
    pub fn push_sentinel(&mut self, channel: Channel) {
        self.series[channel.index()].push(SENTINEL);
    }

    pub fn series(&self, channel: Channel) -> &[f64] {
        &self.series[channel.index()]
    }

    pub fn len(&self, channel: Channel) -> usize {
        self.series[channel.index()].len()
    }

    pub fn is_empty(&self, channel: Channel) -> bool {
        self.series[channel.index()].is_empty()
    }

    pub fn last(&self, channel: Channel) -> Option<f64> {
        self.series[channel.index()].last().copied()
    }

    pub fn stats(&self, channel: Channel) -> AggregateStats {
        self.stats[channel.index()]
    }

    /// `[first, last)` of a tick-aligned channel.
    pub fn slice(&self, channel: Channel, first: usize, last: usize) -> Result<&[f64], ReadError> {
        let series = self.series(channel);
        series.get(first..last).ok_or(ReadError::Misaligned {
            channel,
            len: series.len(),
            needed: last,
        })
    }

    /// Value at `index` of a tick-aligned channel.
    pub fn at(&self, channel: Channel, index: usize) -> Result<f64, ReadError> {
        let series = self.series(channel);
        series.get(index).copied().ok_or(ReadError::Misaligned {
            channel,
            len: series.len(),
            needed: index + 1,
        })
    }

    pub fn clear(&mut self) {
        for series in &mut self.series {
            series.clear();
        }
        for stats in &mut self.stats {
            *stats = AggregateStats::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_track_true_extremes() {
        let values = [10.0, -3.0, 7.5, 42.0, 0.0];
        let mut store = ChannelStore::new();
        let mut last_min = f64::INFINITY;
        let mut last_max = f64::NEG_INFINITY;

        for v in values {
            store.push(Channel::Ecg, v);
            let (min, max) = store.stats(Channel::Ecg).limits().unwrap();
            // never shrinks
            assert!(min <= last_min);
            assert!(max >= last_max);
            last_min = min;
            last_max = max;
        }

        assert_eq!(store.stats(Channel::Ecg).min(), Some(-3.0));
        assert_eq!(store.stats(Channel::Ecg).max(), Some(42.0));
    }

    #[test]
    fn test_untracked_channels_have_no_limits() {
        let mut store = ChannelStore::new();
        store.push(Channel::Squared, 4.0);
        assert_eq!(store.stats(Channel::Squared).limits(), None);
        assert_eq!(store.len(Channel::Squared), 1);
    }

    #[test]
    fn test_sentinel_skips_stats() {
        let mut store = ChannelStore::new();
        store.push(Channel::Edr, 300.0);
        store.push_sentinel(Channel::Edr);
        assert_eq!(store.series(Channel::Edr), &[300.0, SENTINEL]);
        assert_eq!(store.stats(Channel::Edr).limits(), Some((300.0, 300.0)));
    }

    #[test]
    fn test_slice_and_at_bounds() {
        let mut store = ChannelStore::new();
        for v in [1.0, 2.0, 3.0] {
            store.push(Channel::Hipass, v);
        }
        assert_eq!(store.slice(Channel::Hipass, 1, 3).unwrap(), &[2.0, 3.0]);
        assert_eq!(store.at(Channel::Hipass, 2), Ok(3.0));
        assert_eq!(
            store.slice(Channel::Hipass, 0, 4),
            Err(ReadError::Misaligned {
                channel: Channel::Hipass,
                len: 3,
                needed: 4
            })
        );
        assert!(store.at(Channel::Hipass, 3).is_err());

        store.clear();
        assert!(store.is_empty(Channel::Hipass));
    }
}
