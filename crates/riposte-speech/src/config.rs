//! Speaker scheduler configuration.

use serde::Deserialize;

/// Tunable parameters of the speaker scheduler.
///
/// All durations are domain-time seconds. Defaults match the shipped
/// engine behavior; authored line sets override the per-line values
/// (`max_queue_duration`, `pause_after`) where they carry non-negative
/// numbers of their own.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Priority assumed for requests whose line set carries none.
    pub default_priority: i32,

    /// How long a queued request waits before being dropped with a
    /// timeout skip, unless the line set overrides it.
    pub default_max_queue_duration: f32,

    /// Window after an actor finishes speaking during which queued
    /// follow-ups are held back and fresh requests join the queue with a
    /// continuation boost instead of starting outright.
    pub grace_period: f32,

    /// Pause after a line ends before the speaker counts as done,
    /// unless the variant overrides it.
    pub default_pause_after: f32,

    /// Reading speed used to estimate the duration of lines that have
    /// no audio asset, in characters per second.
    pub chars_per_second: f32,

    /// When set, a request at the *same* priority as the active line
    /// preempts it, provided it is a different line.
    pub same_priority_cancels: bool,

    /// Seed for the scheduler's variant-picking RNG, for reproducible
    /// runs.
    pub seed: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            default_priority: 50,
            default_max_queue_duration: 2.0,
            grace_period: 0.3,
            default_pause_after: 0.2,
            chars_per_second: 16.0,
            same_priority_cancels: true,
            seed: 0,
        }
    }
}

/// Priority boost applied to requests queued during the grace window,
/// so natural continuations win ties over fresh interruptions.
pub const GRACE_PRIORITY_BOOST: i32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = SpeechConfig::default();
        assert_eq!(config.default_priority, 50);
        assert!(config.grace_period > 0.0);
        assert!(config.chars_per_second > 0.0);
        assert!(config.same_priority_cancels);
    }

    #[test]
    fn partial_yaml_overrides() {
        let parsed: Result<SpeechConfig, _> =
            serde_yml::from_str("grace_period: 0.5\nsame_priority_cancels: false\n");
        let config = parsed.ok().unwrap_or_default();
        assert!((config.grace_period - 0.5).abs() < f32::EPSILON);
        assert!(!config.same_priority_cancels);
        assert_eq!(config.default_priority, 50);
    }
}
