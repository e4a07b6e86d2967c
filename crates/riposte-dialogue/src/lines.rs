//! Authored dialogue line sets and their delivery variants.
//!
//! A line set is one logical utterance ("guard greets the player") with a
//! number of alternate deliveries. Which variant plays is decided by the
//! set's pick policy at speak time. Negative durations mean "use the
//! scheduler default" so authors only override where a line needs it.

use serde::{Deserialize, Serialize};

/// Default priority assigned to line sets that do not specify one.
pub const DEFAULT_LINE_PRIORITY: i32 = 50;

/// Sentinel for "use the scheduler's configured default duration".
const USE_DEFAULT: f32 = -1.0;

/// How a variant is chosen from a line set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickPolicy {
    /// Uniformly random, avoiding an immediate repeat of the previous
    /// variant when more than one exists.
    #[default]
    RandomNoRepeat,
    /// Walk the variants in order and wrap around at the end.
    SequentialRepeat,
    /// Walk the variants in order once; afterwards the set has no
    /// available variant left.
    SequentialOnce,
    /// Walk the variants in order and keep repeating the last one.
    SequentialClamp,
    /// Play every variant in order as a single chained utterance: when
    /// one variant finishes, the next starts on the same speaking slot
    /// without re-arbitration.
    AllInOrder,
}

/// One alternate delivery of a line set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineVariant {
    /// Subtitle text; also drives the estimated read time when the
    /// variant has no audio asset.
    pub text: String,

    /// Audio trigger fired when the variant starts, if any.
    #[serde(default)]
    pub start_trigger: Option<String>,

    /// Audio trigger fired to stop the variant gracefully, if any.
    /// Variants without one are hard-stopped on preemption.
    #[serde(default)]
    pub stop_trigger: Option<String>,

    /// Lip-sync animation played alongside the audio, if any.
    #[serde(default)]
    pub lipsync_animation: Option<String>,

    /// Standalone audio file path, for variants not routed through the
    /// trigger system.
    #[serde(default)]
    pub audio_file: Option<String>,

    /// Pause in seconds after the line has ended before the speaker
    /// counts as done. Negative means "use the scheduler default".
    #[serde(default = "use_default_duration")]
    pub pause_after: f32,
}

impl LineVariant {
    /// Create a text-only variant with default pause.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start_trigger: None,
            stop_trigger: None,
            lipsync_animation: None,
            audio_file: None,
            pause_after: USE_DEFAULT,
        }
    }

    /// Whether the variant has any audio asset (trigger or file).
    pub const fn has_audio(&self) -> bool {
        self.start_trigger.is_some() || self.audio_file.is_some()
    }

    /// Whether the variant supports a graceful stop.
    pub const fn has_stop_trigger(&self) -> bool {
        self.stop_trigger.is_some()
    }
}

/// A dialogue line with its delivery variants and scheduling metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSet {
    /// Scheduling priority; higher wins. Defaults to
    /// [`DEFAULT_LINE_PRIORITY`].
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// How a variant is chosen at speak time.
    #[serde(default)]
    pub policy: PickPolicy,

    /// How long a request for this line may wait in the speaker queue
    /// before being dropped, in seconds. Negative means "use the
    /// scheduler default"; zero disables queuing for this line.
    #[serde(default = "use_default_duration")]
    pub max_queue_duration: f32,

    /// The alternate deliveries, in authored order.
    #[serde(default)]
    pub variants: Vec<LineVariant>,
}

impl LineSet {
    /// Create a line set from variants with default metadata.
    pub fn new(variants: Vec<LineVariant>) -> Self {
        Self {
            priority: DEFAULT_LINE_PRIORITY,
            policy: PickPolicy::default(),
            max_queue_duration: USE_DEFAULT,
            variants,
        }
    }

    /// Builder-style priority override.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Builder-style pick-policy override.
    #[must_use]
    pub const fn with_policy(mut self, policy: PickPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder-style queue-duration override.
    #[must_use]
    pub const fn with_max_queue_duration(mut self, seconds: f32) -> Self {
        self.max_queue_duration = seconds;
        self
    }
}

impl Default for LineSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

const fn default_priority() -> i32 {
    DEFAULT_LINE_PRIORITY
}

const fn use_default_duration() -> f32 {
    USE_DEFAULT
}
