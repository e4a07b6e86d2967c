//! Line events and the speech listener interface.
//!
//! Listeners observe every line's lifecycle (started, queued, skipped
//! with a reason, finished, canceled) and may veto a line just before it
//! starts -- the hook a response program uses to re-check its originating
//! conditions after waiting in the queue.

use riposte_types::{ActorId, LineId, ListenerId};

/// Why a speak request was skipped instead of started or queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The line set is unknown or has no pickable variant left.
    NoValidVariation,
    /// A listener vetoed the line.
    ExternalCode,
    /// A higher-priority line holds the slot and queuing is disabled
    /// for this line.
    Priority,
    /// The request expired in the queue before the slot freed up.
    Timeout,
}

/// Outcome of a speak request, reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// The line started playing on the actor's slot.
    Started,
    /// The request was queued behind the current line.
    Queued,
    /// The request was dropped; the reason says why.
    Skipped(SkipReason),
}

/// What happened to a line, delivered to [`SpeechListener`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEventKind {
    /// The line started playing; carries the chosen variant index.
    Started {
        /// Index of the variant that plays.
        variant: usize,
    },
    /// The request joined the actor's queue.
    Queued,
    /// The request was dropped.
    Skipped(SkipReason),
    /// The line ran to completion.
    Finished,
    /// The line was canceled while active or queued.
    Canceled,
}

/// A line lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEvent {
    /// The speaking actor.
    pub actor: ActorId,
    /// The line set concerned.
    pub line: LineId,
    /// What happened.
    pub kind: LineEventKind,
}

/// Observer of line lifecycle events, with an optional start veto.
pub trait SpeechListener {
    /// Called just before a line starts. Returning `false` vetoes the
    /// start; the request is skipped with [`SkipReason::ExternalCode`].
    fn line_about_to_start(&self, _actor: ActorId, _line: &LineId) -> bool {
        true
    }

    /// Called for every line lifecycle event.
    fn on_line_event(&self, event: &LineEvent);
}

impl<F> SpeechListener for F
where
    F: Fn(&LineEvent),
{
    fn on_line_event(&self, event: &LineEvent) {
        self(event);
    }
}

/// Registered listeners with removal tokens.
#[derive(Default)]
pub(crate) struct ListenerSet {
    entries: Vec<(ListenerId, Box<dyn SpeechListener>)>,
    next_id: u64,
}

impl ListenerSet {
    /// Register a listener, returning its removal token.
    pub(crate) fn add(&mut self, listener: Box<dyn SpeechListener>) -> ListenerId {
        let id = ListenerId::new(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.push((id, listener));
        id
    }

    /// Remove a listener by token. Returns whether it was registered.
    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// Deliver an event to every listener.
    pub(crate) fn emit(&self, event: &LineEvent) {
        for (_, listener) in &self.entries {
            listener.on_line_event(event);
        }
    }

    /// Ask every listener whether the line may start.
    pub(crate) fn allows_start(&self, actor: ActorId, line: &LineId) -> bool {
        self.entries
            .iter()
            .all(|(_, listener)| listener.line_about_to_start(actor, line))
    }
}

impl core::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("count", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    struct Veto;

    impl SpeechListener for Veto {
        fn line_about_to_start(&self, _actor: ActorId, _line: &LineId) -> bool {
            false
        }

        fn on_line_event(&self, _event: &LineEvent) {}
    }

    #[test]
    fn closure_listener_receives_events() {
        let seen: Rc<RefCell<Vec<LineEvent>>> = Rc::default();
        let sink = Rc::clone(&seen);

        let mut set = ListenerSet::default();
        set.add(Box::new(move |event: &LineEvent| {
            sink.borrow_mut().push(event.clone());
        }));

        let event = LineEvent {
            actor: ActorId::new(1),
            line: LineId::from("hello"),
            kind: LineEventKind::Queued,
        };
        set.emit(&event);
        assert_eq!(seen.borrow().as_slice(), &[event]);
    }

    #[test]
    fn removal_by_token() {
        let mut set = ListenerSet::default();
        let id = set.add(Box::new(|_: &LineEvent| {}));
        assert!(set.remove(id));
        assert!(!set.remove(id));
    }

    #[test]
    fn any_veto_blocks_start() {
        let mut set = ListenerSet::default();
        let actor = ActorId::new(1);
        let line = LineId::from("hello");
        assert!(set.allows_start(actor, &line));

        set.add(Box::new(Veto));
        assert!(!set.allows_start(actor, &line));
    }
}
