//! Active and queued speaking-slot bookkeeping.

use riposte_dialogue::LineVariant;
use riposte_types::{ActorId, LineId};

/// The unresolved completion conditions of an active line.
///
/// A line's slot is released only when every set condition has cleared:
/// audio acknowledgments arrive over the completion queue, lip-sync is
/// polled, and the timer expires against domain time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct PendingConditions {
    /// Waiting for the start trigger (or standalone file) to finish.
    pub start_ack: bool,
    /// Waiting for a fired stop trigger to be acknowledged.
    pub stop_ack: bool,
    /// Waiting for the estimated-duration or post-line-pause timer.
    pub timer: bool,
    /// Waiting for the lip-sync animation to end.
    pub lipsync: bool,
}

impl PendingConditions {
    /// Whether every condition has resolved.
    pub const fn is_empty(self) -> bool {
        !self.start_ack && !self.stop_ack && !self.timer && !self.lipsync
    }

    /// A set waiting only on a stop acknowledgment, as used while a
    /// preempted line winds down gracefully.
    pub const fn stop_only() -> Self {
        Self {
            start_ack: false,
            stop_ack: true,
            timer: false,
            lipsync: false,
        }
    }
}

/// The line currently holding an actor's speaking slot.
///
/// At most one exists per actor at any time.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakEntry {
    /// The speaking actor.
    pub actor: ActorId,
    /// The line set being spoken.
    pub line: LineId,
    /// Resolved scheduling priority of this line.
    pub priority: i32,
    /// Index of the variant playing, for follow-up chaining.
    pub variant_index: usize,
    /// Snapshot of the playing variant. Copied at start so mid-flight
    /// database edits cannot affect a line already on air.
    pub variant: LineVariant,
    /// Domain time at which the timer condition resolves. Only
    /// meaningful while `pending.timer` is set.
    pub finish_at: f64,
    /// The completion conditions still outstanding.
    pub pending: PendingConditions,
    /// Whether the line was canceled and is only winding down.
    pub canceled: bool,
}

/// A request waiting for an actor's slot to free up.
///
/// At most one exists per (actor, line) pair; re-queuing the same line
/// refreshes the deadline instead of duplicating the request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedLine {
    /// The actor the line is queued for.
    pub actor: ActorId,
    /// The requested line set.
    pub line: LineId,
    /// Scheduling priority, including any grace-window boost.
    pub priority: i32,
    /// Domain time after which the request is dropped with a timeout.
    pub expires_at: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_conditions_empty_check() {
        assert!(PendingConditions::default().is_empty());
        assert!(!PendingConditions::stop_only().is_empty());

        let timer_only = PendingConditions {
            timer: true,
            ..PendingConditions::default()
        };
        assert!(!timer_only.is_empty());
    }
}
