//! Inbound queue for asynchronous playback completions.
//!
//! Audio and lip-sync backends finish on their own threads and at their
//! own pace. Completion callbacks never touch scheduler state directly;
//! they post a [`CompletionEvent`] through a [`CompletionSender`], and the
//! scheduler drains the queue once per tick at a safe boundary.

use std::sync::mpsc;

use tracing::trace;

use riposte_types::ActorId;

/// An asynchronous playback completion, keyed by the speaking actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionEvent {
    /// The start trigger of the actor's active line finished playing.
    AudioStartFinished {
        /// The speaking actor.
        actor: ActorId,
    },
    /// The stop trigger fired for the actor's line was acknowledged.
    AudioStopFinished {
        /// The speaking actor.
        actor: ActorId,
    },
    /// The lip-sync animation for the actor's line ended.
    LipSyncFinished {
        /// The speaking actor.
        actor: ActorId,
    },
}

impl CompletionEvent {
    /// The actor this completion concerns.
    pub const fn actor(&self) -> ActorId {
        match self {
            Self::AudioStartFinished { actor }
            | Self::AudioStopFinished { actor }
            | Self::LipSyncFinished { actor } => *actor,
        }
    }
}

/// Thread-safe handle for posting completions into the scheduler.
///
/// Cheap to clone; hand one to every backend that reports completions.
#[derive(Debug, Clone)]
pub struct CompletionSender {
    tx: mpsc::Sender<CompletionEvent>,
}

impl CompletionSender {
    /// Post a completion. Silently ignored when the scheduler is gone;
    /// a late callback after teardown is not an error.
    pub fn send(&self, event: CompletionEvent) {
        trace!(?event, "Completion posted");
        let _ = self.tx.send(event);
    }
}

/// The scheduler-side receiving end of the completion queue.
#[derive(Debug)]
pub(crate) struct CompletionQueue {
    tx: mpsc::Sender<CompletionEvent>,
    rx: mpsc::Receiver<CompletionEvent>,
}

impl CompletionQueue {
    /// Create a new queue.
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    /// A new sender handle for backends.
    pub(crate) fn sender(&self) -> CompletionSender {
        CompletionSender {
            tx: self.tx.clone(),
        }
    }

    /// Drain everything that arrived since the last tick.
    pub(crate) fn drain(&self) -> Vec<CompletionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_posted_events_in_order() {
        let queue = CompletionQueue::new();
        let sender = queue.sender();
        let actor = ActorId::new(3);

        sender.send(CompletionEvent::AudioStartFinished { actor });
        sender.send(CompletionEvent::LipSyncFinished { actor });

        let drained = queue.drain();
        assert_eq!(
            drained,
            vec![
                CompletionEvent::AudioStartFinished { actor },
                CompletionEvent::LipSyncFinished { actor },
            ]
        );
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn sender_works_from_another_thread() {
        let queue = CompletionQueue::new();
        let sender = queue.sender();
        let actor = ActorId::new(9);

        let handle = std::thread::spawn(move || {
            sender.send(CompletionEvent::AudioStopFinished { actor });
        });
        assert!(handle.join().is_ok());

        assert_eq!(
            queue.drain(),
            vec![CompletionEvent::AudioStopFinished { actor }]
        );
    }

    #[test]
    fn event_actor_accessor() {
        let actor = ActorId::new(5);
        assert_eq!(CompletionEvent::LipSyncFinished { actor }.actor(), actor);
    }
}
