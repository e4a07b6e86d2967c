//! Speaker scheduling for the Riposte engine.
//!
//! Gives every actor exactly one speaking slot and arbitrates competing
//! spoken lines over it: priority preemption (graceful where the line
//! has a stop trigger), deadline-bounded queuing, a post-line grace
//! window that favors natural continuations, and variant chaining for
//! multi-part utterances.
//!
//! # Modules
//!
//! - [`scheduler`] -- The [`SpeakerScheduler`] itself
//! - [`config`] -- Tunable scheduler parameters
//! - [`entry`] -- Active-slot and queue bookkeeping types
//! - [`listeners`] -- Line lifecycle events and the veto hook
//! - [`completions`] -- Inbound queue for asynchronous playback acks
//! - [`drivers`] -- Audio and lip-sync backend traits
//!
//! The scheduler is tick-driven and single-threaded. Call
//! [`SpeakerScheduler::update`] once per tick with the current domain
//! time; playback backends running elsewhere post completions through a
//! [`CompletionSender`].

pub mod completions;
pub mod config;
pub mod drivers;
pub mod entry;
pub mod listeners;
pub mod scheduler;

pub use completions::{CompletionEvent, CompletionSender};
pub use config::{GRACE_PRIORITY_BOOST, SpeechConfig};
pub use drivers::{AudioDriver, LipSyncDriver, NullAudioDriver, NullLipSyncDriver};
pub use entry::{PendingConditions, QueuedLine, SpeakEntry};
pub use listeners::{LineEvent, LineEventKind, SkipReason, SpeakOutcome, SpeechListener};
pub use scheduler::{LineActivity, SpeakerScheduler};
