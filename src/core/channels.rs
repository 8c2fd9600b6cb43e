//! Channel identities and the tag routing table.
//!
//! Every wire tag maps to one [`TagSpec`] entry in [`TAG_TABLE`]: the channel
//! it lands in, the transform applied to the raw integer, and any side effect
//! on session state.

use serde::{Deserialize, Serialize};

/// Out-of-domain value stored instead of failing a degenerate transform.
pub const SENTINEL: f64 = -1.0;

/// Logical channels of the channel store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Time,
    Ecg,
    Edr,
    BpmPrimary,
    BpmSecondary,
    Hipass,
    Squared,
    Integrated,
    Threshold1Time,
    Threshold2Time,
    Threshold1Freq,
    Threshold2Freq,
    BeatTime,
    BeatType,
}

impl Channel {
    pub const COUNT: usize = 14;

    pub const ALL: [Channel; Channel::COUNT] = [
        Channel::Time,
        Channel::Ecg,
        Channel::Edr,
        Channel::BpmPrimary,
        Channel::BpmSecondary,
        Channel::Hipass,
        Channel::Squared,
        Channel::Integrated,
        Channel::Threshold1Time,
        Channel::Threshold2Time,
        Channel::Threshold1Freq,
        Channel::Threshold2Freq,
        Channel::BeatTime,
        Channel::BeatType,
    ];

    /// Stable name used by readers.
    pub fn name(self) -> &'static str {
        match self {
            Channel::Time => "time",
            Channel::Ecg => "ecg",
            Channel::Edr => "edr",
            Channel::BpmPrimary => "bpm_primary",
            Channel::BpmSecondary => "bpm_secondary",
            Channel::Hipass => "hipass",
            Channel::Squared => "squared",
            Channel::Integrated => "integrated",
            Channel::Threshold1Time => "threshold1_time",
            Channel::Threshold2Time => "threshold2_time",
            Channel::Threshold1Freq => "threshold1_freq",
            Channel::Threshold2Freq => "threshold2_freq",
            Channel::BeatTime => "beat_time",
            Channel::BeatType => "beat_type",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Position in per-channel arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// One value per time tick, indexable by TimeAxis position.
    ///
    /// Beat times and classifications are asynchronous event lists instead.
    pub fn is_tick_aligned(self) -> bool {
        !matches!(self, Channel::BeatTime | Channel::BeatType)
    }

    /// Channels whose running min/max drive display scaling.
    pub fn tracks_limits(self) -> bool {
        matches!(
            self,
            Channel::Ecg | Channel::Edr | Channel::BpmPrimary | Channel::BpmSecondary
        )
    }

    /// Channels whose transform can store [`SENTINEL`].
    pub fn may_hold_sentinel(self) -> bool {
        matches!(
            self,
            Channel::Edr | Channel::BpmPrimary | Channel::BpmSecondary
        )
    }

    /// Axis range shown before any data has arrived.
    pub fn default_limits(self) -> (f64, f64) {
        match self {
            Channel::Ecg => (-512.0, 512.0),
            Channel::Edr => (100.0, 800.0),
            Channel::BpmPrimary | Channel::BpmSecondary => (50.0, 100.0),
            _ => (0.0, 1.0),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

/// Wire tags understood by the device protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Tick,
    Ecg,
    Edr,
    HighPass,
    Squared,
    Integrated,
    Beat,
    PulseSecondary,
    PulsePrimary,
    IntegratedThreshold,
    FilteredThreshold,
    SecondaryFilteredThreshold,
    BeatClass,
    PulseRegularity,
    CounterReset,
}

impl Tag {
    pub fn from_symbol(symbol: char) -> Option<Self> {
        let tag = match symbol {
            'S' => Tag::Tick,
            'K' => Tag::Ecg,
            'G' => Tag::Edr,
            'F' => Tag::HighPass,
            'Q' => Tag::Squared,
            'I' => Tag::Integrated,
            'B' => Tag::Beat,
            'P' => Tag::PulseSecondary,
            'O' => Tag::PulsePrimary,
            'T' => Tag::IntegratedThreshold,
            'Y' => Tag::FilteredThreshold,
            'H' => Tag::SecondaryFilteredThreshold,
            'W' => Tag::BeatClass,
            'N' => Tag::PulseRegularity,
            'R' => Tag::CounterReset,
            _ => return None,
        };
        Some(tag)
    }

    pub fn spec(self) -> &'static TagSpec {
        &TAG_TABLE[self as usize]
    }
}

/// Converts a raw wire integer into a stored value; `None` means the input
/// is degenerate and [`SENTINEL`] is stored instead.
pub type Transform = fn(i64) -> Option<f64>;

/// What a tag does beyond appending its transformed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Append only
    Store,
    /// Feed the time reconstructor
    Tick,
    /// Timestamp relative to the current tick
    Beat,
    /// Append only once a beat exists
    BeatClass,
    /// Append and raise `pulse_found`
    PulseFound,
    /// Append, plus half the raw value into a second channel
    HalfThreshold(Channel),
    /// Append, then advance the drawable window
    AdvanceWindow,
    /// Set `pulse_regular`; nothing stored
    PulseRegularity,
    /// Correct the device counter baseline; nothing stored
    CounterReset,
}

/// One routing table row.
#[derive(Debug, Clone, Copy)]
pub struct TagSpec {
    pub tag: Tag,
    pub symbol: char,
    pub target: Option<Channel>,
    pub transform: Transform,
    pub effect: Effect,
}

pub fn identity(value: i64) -> Option<f64> {
    Some(value as f64)
}

/// Raw electrodermal ADC reading to kOhms, in integer (floor) arithmetic.
pub fn skin_resistance(value: i64) -> Option<f64> {
    if value >= 1024 {
        return None;
    }
    let denominator = 1024i64.checked_sub(value)?;
    let numerator = value.checked_mul(220)?;
    Some(numerator.div_euclid(denominator) as f64)
}

/// Inter-beat period in milliseconds to beats per minute.
pub fn pulse_rate(period_ms: i64) -> Option<f64> {
    if period_ms == 0 {
        None
    } else {
        Some(60_000.0 / period_ms as f64)
    }
}

/// Routing table, indexed by `Tag as usize`.
pub static TAG_TABLE: [TagSpec; 15] = [
    TagSpec {
        tag: Tag::Tick,
        symbol: 'S',
        target: Some(Channel::Time),
        transform: identity,
        effect: Effect::Tick,
    },
    TagSpec {
        tag: Tag::Ecg,
        symbol: 'K',
        target: Some(Channel::Ecg),
        transform: identity,
        effect: Effect::Store,
    },
    TagSpec {
        tag: Tag::Edr,
        symbol: 'G',
        target: Some(Channel::Edr),
        transform: skin_resistance,
        effect: Effect::Store,
    },
    TagSpec {
        tag: Tag::HighPass,
        symbol: 'F',
        target: Some(Channel::Hipass),
        transform: identity,
        effect: Effect::Store,
    },
    TagSpec {
        tag: Tag::Squared,
        symbol: 'Q',
        target: Some(Channel::Squared),
        transform: identity,
        effect: Effect::Store,
    },
    TagSpec {
        tag: Tag::Integrated,
        symbol: 'I',
        target: Some(Channel::Integrated),
        transform: identity,
        effect: Effect::Store,
    },
    TagSpec {
        tag: Tag::Beat,
        symbol: 'B',
        target: Some(Channel::BeatTime),
        transform: identity,
        effect: Effect::Beat,
    },
    TagSpec {
        tag: Tag::PulseSecondary,
        symbol: 'P',
        target: Some(Channel::BpmSecondary),
        transform: pulse_rate,
        effect: Effect::PulseFound,
    },
    TagSpec {
        tag: Tag::PulsePrimary,
        symbol: 'O',
        target: Some(Channel::BpmPrimary),
        transform: pulse_rate,
        effect: Effect::PulseFound,
    },
    TagSpec {
        tag: Tag::IntegratedThreshold,
        symbol: 'T',
        target: Some(Channel::Threshold1Time),
        transform: identity,
        effect: Effect::HalfThreshold(Channel::Threshold2Time),
    },
    TagSpec {
        tag: Tag::FilteredThreshold,
        symbol: 'Y',
        target: Some(Channel::Threshold1Freq),
        transform: identity,
        effect: Effect::AdvanceWindow,
    },
    TagSpec {
        tag: Tag::SecondaryFilteredThreshold,
        symbol: 'H',
        target: Some(Channel::Threshold2Freq),
        transform: identity,
        effect: Effect::Store,
    },
    TagSpec {
        tag: Tag::BeatClass,
        symbol: 'W',
        target: Some(Channel::BeatType),
        transform: identity,
        effect: Effect::BeatClass,
    },
    TagSpec {
        tag: Tag::PulseRegularity,
        symbol: 'N',
        target: None,
        transform: identity,
        effect: Effect::PulseRegularity,
    },
    TagSpec {
        tag: Tag::CounterReset,
        symbol: 'R',
        target: None,
        transform: identity,
        effect: Effect::CounterReset,
    },
];
