//! Playback driver traits and null implementations.
//!
//! The scheduler drives audio and lip-sync through these traits; the
//! embedding engine wires real backends at startup. A method returning
//! `false` means the request did not start, and the scheduler falls back
//! (estimated read time instead of a start ack, hard stop instead of a
//! graceful one).
//!
//! Backends that complete asynchronously report through the
//! [`CompletionSender`] they were given at wiring time; see
//! [`crate::completions`].
//!
//! [`CompletionSender`]: crate::completions::CompletionSender

use riposte_types::ActorId;

/// Audio playback backend.
pub trait AudioDriver {
    /// Fire the start trigger of a line variant. Returns whether the
    /// trigger started; a started trigger must later post
    /// [`AudioStartFinished`].
    ///
    /// [`AudioStartFinished`]: crate::completions::CompletionEvent::AudioStartFinished
    fn execute_start_trigger(&mut self, actor: ActorId, trigger: &str) -> bool;

    /// Fire the stop trigger of a line variant for a graceful stop.
    /// Returns whether the trigger started; a started trigger must later
    /// post [`AudioStopFinished`].
    ///
    /// [`AudioStopFinished`]: crate::completions::CompletionEvent::AudioStopFinished
    fn execute_stop_trigger(&mut self, actor: ActorId, trigger: &str) -> bool;

    /// Play a standalone audio file. Returns whether playback started; a
    /// started playback must later post [`AudioStartFinished`].
    ///
    /// [`AudioStartFinished`]: crate::completions::CompletionEvent::AudioStartFinished
    fn play_file(&mut self, actor: ActorId, path: &str) -> bool;

    /// Hard-stop everything this actor is playing. Fire and forget.
    fn stop_all(&mut self, actor: ActorId);
}

/// Lip-sync animation backend.
pub trait LipSyncDriver {
    /// Start the lip-sync animation for a line. Returns whether it
    /// started.
    fn begin(&mut self, actor: ActorId, animation: &str) -> bool;

    /// Hard-stop the actor's lip-sync animation.
    fn stop(&mut self, actor: ActorId);

    /// Whether the actor's lip-sync animation has ended. Polled once per
    /// tick while a line waits on lip-sync; backends may instead post
    /// [`LipSyncFinished`].
    ///
    /// [`LipSyncFinished`]: crate::completions::CompletionEvent::LipSyncFinished
    fn is_finished(&self, actor: ActorId) -> bool;
}

/// Audio driver that plays nothing. Lines fall back to estimated read
/// times.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudioDriver;

impl AudioDriver for NullAudioDriver {
    fn execute_start_trigger(&mut self, _actor: ActorId, _trigger: &str) -> bool {
        false
    }

    fn execute_stop_trigger(&mut self, _actor: ActorId, _trigger: &str) -> bool {
        false
    }

    fn play_file(&mut self, _actor: ActorId, _path: &str) -> bool {
        false
    }

    fn stop_all(&mut self, _actor: ActorId) {}
}

/// Lip-sync driver that animates nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLipSyncDriver;

impl LipSyncDriver for NullLipSyncDriver {
    fn begin(&mut self, _actor: ActorId, _animation: &str) -> bool {
        false
    }

    fn stop(&mut self, _actor: ActorId) {}

    fn is_finished(&self, _actor: ActorId) -> bool {
        true
    }
}
