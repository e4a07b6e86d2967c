//! The speaker scheduler: one active spoken line per actor.
//!
//! Each actor owns exactly one speaking slot. Requests for a busy slot
//! are arbitrated by priority: strictly higher priority preempts, equal
//! priority preempts under the same-priority-cancels policy, anything
//! else waits in a deadline-bounded queue or is skipped. Preemption is
//! graceful where the playing variant has a stop trigger (the slot is
//! held until the stop is acknowledged) and immediate otherwise.
//!
//! After an actor finishes a line, a short grace window holds its queue
//! back; requests arriving inside the window join the queue with a small
//! priority boost so natural continuations win ties against fresh
//! interruptions.
//!
//! The scheduler is tick-driven and single-threaded; asynchronous
//! playback completions arrive through [`CompletionSender`] and are
//! applied only during [`SpeakerScheduler::update`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{debug, info, warn};

use riposte_dialogue::{LineProvider, LineSet, LineVariant, PickPolicy, PickState};
use riposte_types::{ActorId, LineId, ListenerId};

use crate::completions::{CompletionEvent, CompletionQueue, CompletionSender};
use crate::config::{GRACE_PRIORITY_BOOST, SpeechConfig};
use crate::drivers::{AudioDriver, LipSyncDriver, NullAudioDriver, NullLipSyncDriver};
use crate::entry::{PendingConditions, QueuedLine, SpeakEntry};
use crate::listeners::{LineEvent, LineEventKind, ListenerSet, SkipReason, SpeakOutcome, SpeechListener};

/// Where a line currently stands with respect to an actor's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineActivity {
    /// The line holds the actor's active slot (possibly winding down).
    Active,
    /// The line waits in the actor's queue.
    Queued,
    /// The line is neither active nor queued for the actor.
    Inactive,
}

/// Per-actor exclusive speaking-slot scheduler.
pub struct SpeakerScheduler {
    config: SpeechConfig,
    lines: Arc<dyn LineProvider>,
    audio: Box<dyn AudioDriver>,
    lipsync: Box<dyn LipSyncDriver>,
    /// Active entries; at most one per actor.
    active: BTreeMap<ActorId, SpeakEntry>,
    /// Waiting requests; at most one per (actor, line).
    queued: Vec<QueuedLine>,
    /// When each actor last finished speaking, for the grace window.
    recently_finished: BTreeMap<ActorId, f64>,
    /// Variant-pick bookkeeping per line set.
    pick_states: BTreeMap<LineId, PickState>,
    listeners: ListenerSet,
    completions: CompletionQueue,
    rng: SmallRng,
}

impl SpeakerScheduler {
    /// Create a scheduler over the given line provider with null
    /// playback drivers. Lines will complete on estimated read time.
    pub fn new(config: SpeechConfig, lines: Arc<dyn LineProvider>) -> Self {
        let rng = SmallRng::seed_from_u64(config.seed);
        Self {
            config,
            lines,
            audio: Box::new(NullAudioDriver),
            lipsync: Box::new(NullLipSyncDriver),
            active: BTreeMap::new(),
            queued: Vec::new(),
            recently_finished: BTreeMap::new(),
            pick_states: BTreeMap::new(),
            listeners: ListenerSet::default(),
            completions: CompletionQueue::new(),
            rng,
        }
    }

    /// Replace the audio driver.
    pub fn set_audio_driver(&mut self, driver: Box<dyn AudioDriver>) {
        self.audio = driver;
    }

    /// Replace the lip-sync driver.
    pub fn set_lipsync_driver(&mut self, driver: Box<dyn LipSyncDriver>) {
        self.lipsync = driver;
    }

    /// A sender handle for backends that report asynchronous
    /// completions.
    pub fn completion_sender(&self) -> CompletionSender {
        self.completions.sender()
    }

    /// Register a speech listener. Returns the token for removal.
    pub fn add_listener(&mut self, listener: Box<dyn SpeechListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Remove a previously registered listener.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// The line holding an actor's slot, if any.
    pub fn active_line(&self, actor: ActorId) -> Option<&LineId> {
        self.active.get(&actor).map(|entry| &entry.line)
    }

    /// The full active entry for an actor, if any.
    pub fn active_entry(&self, actor: ActorId) -> Option<&SpeakEntry> {
        self.active.get(&actor)
    }

    /// All waiting requests, in queue order.
    pub fn queued_requests(&self) -> &[QueuedLine] {
        &self.queued
    }

    /// Where the given line stands for the given actor.
    pub fn line_activity(&self, actor: ActorId, line: &LineId) -> LineActivity {
        if self
            .active
            .get(&actor)
            .is_some_and(|entry| entry.line == *line)
        {
            return LineActivity::Active;
        }
        if self
            .queued
            .iter()
            .any(|request| request.actor == actor && request.line == *line)
        {
            return LineActivity::Queued;
        }
        LineActivity::Inactive
    }

    // -----------------------------------------------------------------------
    // StartSpeaking
    // -----------------------------------------------------------------------

    /// Request that `actor` speaks `line` now.
    ///
    /// Runs the full arbitration pipeline: variant availability, listener
    /// veto, grace-window continuation queuing, priority preemption or
    /// queuing against an occupied slot, and finally variant pick and
    /// playback start. Every outcome is reported to listeners as well as
    /// returned.
    pub fn start_speaking(&mut self, actor: ActorId, line: &LineId, now: f64) -> SpeakOutcome {
        let lines = Arc::clone(&self.lines);
        let Some(set) = lines.line_set(line) else {
            warn!(%actor, %line, "Speak request for unknown line set");
            return self.skip(actor, line, SkipReason::NoValidVariation);
        };

        if !self.has_available_variant(set, line) {
            debug!(%actor, %line, "Speak request skipped: no valid variation");
            return self.skip(actor, line, SkipReason::NoValidVariation);
        }

        if !self.listeners.allows_start(actor, line) {
            debug!(%actor, %line, "Speak request vetoed by listener");
            return self.skip(actor, line, SkipReason::ExternalCode);
        }

        let priority = self.effective_priority(set);

        // Grace window: an actor that just finished speaking and already
        // has waiting requests collects further requests in the queue,
        // boosted so continuations win ties over fresh interruptions.
        if let Some(&finished_at) = self.recently_finished.get(&actor) {
            let window_end = finished_at + f64::from(self.config.grace_period);
            if now < window_end && self.has_queued(actor) {
                let deadline = now + f64::from(self.effective_queue_duration(set));
                let boosted = priority.saturating_add(GRACE_PRIORITY_BOOST);
                self.enqueue(actor, line, boosted, deadline);
                return SpeakOutcome::Queued;
            }
        }

        let occupied = self.active.get(&actor).map(|entry| {
            (
                entry.canceled,
                entry.priority,
                entry.line.clone(),
                entry.variant.stop_trigger.clone(),
                entry.pending.lipsync,
            )
        });

        let Some((was_canceled, active_priority, active_line, stop_trigger, had_lipsync)) =
            occupied
        else {
            return self.begin_line(actor, line, set, priority, now);
        };

        let preempts = was_canceled
            || priority > active_priority
            || (priority >= active_priority
                && self.config.same_priority_cancels
                && active_line != *line);

        if !preempts {
            let duration = self.effective_queue_duration(set);
            if duration > 0.0 {
                self.enqueue(actor, line, priority, now + f64::from(duration));
                return SpeakOutcome::Queued;
            }
            debug!(%actor, %line, priority, active_priority, "Speak request skipped: priority");
            return self.skip(actor, line, SkipReason::Priority);
        }

        if was_canceled {
            // The slot is already winding down; wait for it.
            let deadline = self.preemption_deadline(set, now);
            self.enqueue(actor, line, priority, deadline);
            return SpeakOutcome::Queued;
        }

        if let Some(trigger) = stop_trigger {
            if self.audio.execute_stop_trigger(actor, &trigger) {
                // Graceful preemption: hold the slot until the stop is
                // acknowledged, and queue the new request behind it.
                if had_lipsync {
                    self.lipsync.stop(actor);
                }
                if let Some(entry) = self.active.get_mut(&actor) {
                    entry.canceled = true;
                    entry.pending = PendingConditions::stop_only();
                }
                info!(%actor, old_line = %active_line, new_line = %line, "Graceful preemption");
                let deadline = self.preemption_deadline(set, now);
                self.enqueue(actor, line, priority, deadline);
                return SpeakOutcome::Queued;
            }
            warn!(%actor, line = %active_line, "Stop trigger failed to start, hard-stopping");
        }

        self.hard_stop(actor);
        self.begin_line(actor, line, set, priority, now)
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Advance the scheduler by one tick of domain time.
    ///
    /// Drains asynchronous completions, polls lip-sync and timers,
    /// releases finished slots (chaining all-in-order follow-ups in
    /// place), expires stale queue entries, and drains queues for actors
    /// whose grace window has elapsed.
    pub fn update(&mut self, now: f64) {
        self.apply_completions(now);
        self.poll_conditions(now);
        self.release_finished(now);
        self.expire_queued(now);
        self.drain_queues(now);

        let grace = f64::from(self.config.grace_period);
        self.recently_finished
            .retain(|_, finished_at| now < *finished_at + grace);
    }

    fn apply_completions(&mut self, now: f64) {
        for event in self.completions.drain() {
            let Some(entry) = self.active.get_mut(&event.actor()) else {
                debug!(?event, "Completion for actor without active line, dropped");
                continue;
            };
            match event {
                CompletionEvent::AudioStartFinished { .. } => {
                    if entry.pending.start_ack {
                        entry.pending.start_ack = false;
                        // The audio told us the real end; what remains is
                        // the authored post-line pause.
                        let pause = if entry.variant.pause_after >= 0.0 {
                            entry.variant.pause_after
                        } else {
                            self.config.default_pause_after
                        };
                        entry.pending.timer = true;
                        entry.finish_at = now + f64::from(pause);
                    }
                }
                CompletionEvent::AudioStopFinished { .. } => {
                    entry.pending.stop_ack = false;
                }
                CompletionEvent::LipSyncFinished { .. } => {
                    entry.pending.lipsync = false;
                }
            }
        }
    }

    fn poll_conditions(&mut self, now: f64) {
        for (actor, entry) in &mut self.active {
            if entry.pending.lipsync && self.lipsync.is_finished(*actor) {
                entry.pending.lipsync = false;
            }
            if entry.pending.timer && now >= entry.finish_at {
                entry.pending.timer = false;
            }
        }
    }

    fn release_finished(&mut self, now: f64) {
        let done: Vec<ActorId> = self
            .active
            .iter()
            .filter(|(_, entry)| entry.pending.is_empty())
            .map(|(actor, _)| *actor)
            .collect();

        for actor in done {
            let Some(entry) = self.active.remove(&actor) else {
                continue;
            };

            if entry.canceled {
                info!(%actor, line = %entry.line, "Line canceled");
                self.report(actor, &entry.line, LineEventKind::Canceled);
                continue;
            }

            info!(%actor, line = %entry.line, "Line finished");
            self.report(actor, &entry.line, LineEventKind::Finished);

            // All-in-order chaining: the next variant restarts on the
            // same slot immediately, without re-arbitration.
            let lines = Arc::clone(&self.lines);
            if let Some(set) = lines.line_set(&entry.line) {
                if let Some(next) = riposte_dialogue::successor(set, entry.variant_index) {
                    if let Some(variant) = set.variants.get(next).cloned() {
                        self.restart_with_variant(entry, next, variant, now);
                        continue;
                    }
                }
            }

            self.recently_finished.insert(actor, now);
        }
    }

    fn expire_queued(&mut self, now: f64) {
        let mut expired = Vec::new();
        self.queued.retain(|request| {
            if now >= request.expires_at {
                expired.push(request.clone());
                false
            } else {
                true
            }
        });
        for request in expired {
            debug!(actor = %request.actor, line = %request.line, "Queued line timed out");
            self.report(
                request.actor,
                &request.line,
                LineEventKind::Skipped(SkipReason::Timeout),
            );
        }
    }

    fn drain_queues(&mut self, now: f64) {
        let grace = f64::from(self.config.grace_period);
        let candidates: BTreeSet<ActorId> = self
            .queued
            .iter()
            .map(|request| request.actor)
            .filter(|actor| !self.active.contains_key(actor))
            .filter(|actor| {
                self.recently_finished
                    .get(actor)
                    .is_none_or(|finished_at| now >= *finished_at + grace)
            })
            .collect();

        for actor in candidates {
            while let Some(position) = self.best_queued_index(actor) {
                let Some(request) = self.take_queued(position) else {
                    break;
                };
                match self.start_speaking(actor, &request.line, now) {
                    SpeakOutcome::Started | SpeakOutcome::Queued => break,
                    // Reported already; try the next waiting request.
                    SpeakOutcome::Skipped(_) => {}
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Cancel matching active and (optionally) queued lines.
    ///
    /// Unset filters are wildcards; a negative `max_priority` means no
    /// priority ceiling. Graceful where the playing variant has a stop
    /// trigger, immediate otherwise; idempotent for entries already
    /// winding down. Returns whether anything matched.
    pub fn cancel_speaking(
        &mut self,
        actor: Option<ActorId>,
        max_priority: i32,
        line: Option<&LineId>,
        cancel_queued: bool,
    ) -> bool {
        let mut matched = false;

        let targets: Vec<ActorId> = self
            .active
            .iter()
            .filter(|(entry_actor, entry)| {
                actor.is_none_or(|filter| **entry_actor == filter)
                    && line.is_none_or(|filter| entry.line == *filter)
                    && (max_priority < 0 || entry.priority <= max_priority)
            })
            .map(|(entry_actor, _)| *entry_actor)
            .collect();

        for target in targets {
            matched = true;
            let Some((was_canceled, stop_trigger, had_lipsync)) = self
                .active
                .get(&target)
                .map(|entry| {
                    (
                        entry.canceled,
                        entry.variant.stop_trigger.clone(),
                        entry.pending.lipsync,
                    )
                })
            else {
                continue;
            };

            // Already winding down; canceling again changes nothing.
            if was_canceled {
                continue;
            }

            if let Some(trigger) = stop_trigger {
                if self.audio.execute_stop_trigger(target, &trigger) {
                    if had_lipsync {
                        self.lipsync.stop(target);
                    }
                    if let Some(entry) = self.active.get_mut(&target) {
                        entry.canceled = true;
                        entry.pending = PendingConditions::stop_only();
                    }
                    continue;
                }
                warn!(%target, "Stop trigger failed to start, hard-stopping");
            }
            self.hard_stop(target);
        }

        if cancel_queued {
            let mut removed = Vec::new();
            self.queued.retain(|request| {
                let hit = actor.is_none_or(|filter| request.actor == filter)
                    && line.is_none_or(|filter| request.line == *filter)
                    && (max_priority < 0 || request.priority <= max_priority);
                if hit {
                    removed.push(request.clone());
                }
                !hit
            });
            for request in removed {
                matched = true;
                self.report(request.actor, &request.line, LineEventKind::Canceled);
            }
        }

        matched
    }

    /// Forget an actor that left the world: hard-cancel its active line,
    /// drop its queued requests, purge its grace bookkeeping.
    pub fn on_actor_removed(&mut self, actor: ActorId) {
        self.hard_stop(actor);
        let mut removed = Vec::new();
        self.queued.retain(|request| {
            if request.actor == actor {
                removed.push(request.clone());
                false
            } else {
                true
            }
        });
        for request in removed {
            self.report(actor, &request.line, LineEventKind::Canceled);
        }
        self.recently_finished.remove(&actor);
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn skip(&mut self, actor: ActorId, line: &LineId, reason: SkipReason) -> SpeakOutcome {
        self.report(actor, line, LineEventKind::Skipped(reason));
        SpeakOutcome::Skipped(reason)
    }

    fn report(&self, actor: ActorId, line: &LineId, kind: LineEventKind) {
        self.listeners.emit(&LineEvent {
            actor,
            line: line.clone(),
            kind,
        });
    }

    fn has_queued(&self, actor: ActorId) -> bool {
        self.queued.iter().any(|request| request.actor == actor)
    }

    fn effective_priority(&self, set: &LineSet) -> i32 {
        if set.priority >= 0 {
            set.priority
        } else {
            self.config.default_priority
        }
    }

    fn effective_queue_duration(&self, set: &LineSet) -> f32 {
        if set.max_queue_duration >= 0.0 {
            set.max_queue_duration
        } else {
            self.config.default_max_queue_duration
        }
    }

    /// Queue deadline for a request that won preemption and waits only
    /// for the losing line to wind down. A request with no queue budget
    /// of its own still gets the scheduler default, so the winner is
    /// never dropped before the slot it earned frees up.
    fn preemption_deadline(&self, set: &LineSet, now: f64) -> f64 {
        let duration = self.effective_queue_duration(set);
        if duration > 0.0 {
            now + f64::from(duration)
        } else {
            now + f64::from(self.config.default_max_queue_duration)
        }
    }

    fn has_available_variant(&self, set: &LineSet, line: &LineId) -> bool {
        if set.variants.is_empty() {
            return false;
        }
        if set.policy == PickPolicy::SequentialOnce {
            let next = self
                .pick_states
                .get(line)
                .map_or(0, |state| state.next_index);
            return next < set.variants.len();
        }
        true
    }

    fn enqueue(&mut self, actor: ActorId, line: &LineId, priority: i32, expires_at: f64) {
        if let Some(existing) = self
            .queued
            .iter_mut()
            .find(|request| request.actor == actor && request.line == *line)
        {
            // Refresh instead of duplicating.
            existing.expires_at = expires_at;
            existing.priority = existing.priority.max(priority);
        } else {
            self.queued.push(QueuedLine {
                actor,
                line: line.clone(),
                priority,
                expires_at,
            });
        }
        debug!(%actor, %line, priority, "Line queued");
        self.report(actor, line, LineEventKind::Queued);
    }

    fn best_queued_index(&self, actor: ActorId) -> Option<usize> {
        self.queued
            .iter()
            .enumerate()
            .filter(|(_, request)| request.actor == actor)
            .min_by(|(_, a), (_, b)| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.expires_at.total_cmp(&b.expires_at))
            })
            .map(|(position, _)| position)
    }

    fn take_queued(&mut self, position: usize) -> Option<QueuedLine> {
        (position < self.queued.len()).then(|| self.queued.remove(position))
    }

    /// Release an actor's slot immediately, tearing down playback.
    fn hard_stop(&mut self, actor: ActorId) {
        let Some(entry) = self.active.remove(&actor) else {
            return;
        };
        if entry.variant.has_audio() {
            self.audio.stop_all(actor);
        }
        if entry.pending.lipsync {
            self.lipsync.stop(actor);
        }
        debug!(%actor, line = %entry.line, "Hard stop");
        self.report(actor, &entry.line, LineEventKind::Canceled);
    }

    /// Pick a variant and start playback on a free slot.
    fn begin_line(
        &mut self,
        actor: ActorId,
        line: &LineId,
        set: &LineSet,
        priority: i32,
        now: f64,
    ) -> SpeakOutcome {
        let state = self.pick_states.entry(line.clone()).or_default();
        let Some(index) = riposte_dialogue::pick_variant(set, state, &mut self.rng) else {
            debug!(%actor, %line, "No variant available at pick time");
            return self.skip(actor, line, SkipReason::NoValidVariation);
        };
        let Some(variant) = set.variants.get(index).cloned() else {
            return self.skip(actor, line, SkipReason::NoValidVariation);
        };

        let (pending, finish_at) = self.arm_playback(actor, &variant, now);
        self.active.insert(
            actor,
            SpeakEntry {
                actor,
                line: line.clone(),
                priority,
                variant_index: index,
                variant,
                finish_at,
                pending,
                canceled: false,
            },
        );
        info!(%actor, %line, variant = index, priority, "Line started");
        self.report(actor, line, LineEventKind::Started { variant: index });
        SpeakOutcome::Started
    }

    /// Restart a released entry on its follow-up variant, in place.
    fn restart_with_variant(
        &mut self,
        mut entry: SpeakEntry,
        index: usize,
        variant: LineVariant,
        now: f64,
    ) {
        let actor = entry.actor;
        let (pending, finish_at) = self.arm_playback(actor, &variant, now);
        entry.variant_index = index;
        entry.variant = variant;
        entry.pending = pending;
        entry.finish_at = finish_at;
        let line = entry.line.clone();
        self.active.insert(actor, entry);
        info!(%actor, %line, variant = index, "Follow-up variant started");
        self.report(actor, &line, LineEventKind::Started { variant: index });
    }

    /// Start playback assets for a variant and derive the pending
    /// conditions and timer deadline.
    fn arm_playback(
        &mut self,
        actor: ActorId,
        variant: &LineVariant,
        now: f64,
    ) -> (PendingConditions, f64) {
        let mut pending = PendingConditions::default();
        let mut finish_at = now;

        if let Some(trigger) = &variant.start_trigger {
            if self.audio.execute_start_trigger(actor, trigger) {
                pending.start_ack = true;
            } else {
                warn!(%actor, trigger, "Start trigger failed to start");
            }
        }
        if !pending.start_ack {
            if let Some(path) = &variant.audio_file {
                if self.audio.play_file(actor, path) {
                    pending.start_ack = true;
                } else {
                    warn!(%actor, path, "Standalone audio failed to start");
                }
            }
        }
        if let Some(animation) = &variant.lipsync_animation {
            if self.lipsync.begin(actor, animation) {
                pending.lipsync = true;
            }
        }

        // Without a started audio asset the line completes on estimated
        // read time plus the post-line pause.
        if !pending.start_ack {
            pending.timer = true;
            finish_at = now + self.estimated_duration(variant);
        }

        (pending, finish_at)
    }

    fn estimated_duration(&self, variant: &LineVariant) -> f64 {
        let chars = u32::try_from(variant.text.chars().count()).unwrap_or(u32::MAX);
        let speed = f64::from(self.config.chars_per_second.max(1.0));
        let pause = if variant.pause_after >= 0.0 {
            variant.pause_after
        } else {
            self.config.default_pause_after
        };
        f64::from(chars) / speed + f64::from(pause)
    }
}

impl core::fmt::Debug for SpeakerScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpeakerScheduler")
            .field("active", &self.active)
            .field("queued", &self.queued)
            .field("recently_finished", &self.recently_finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use riposte_dialogue::LineDatabase;

    // -----------------------------------------------------------------------
    // Fixtures
    // -----------------------------------------------------------------------

    fn provider(entries: Vec<(&str, LineSet)>) -> Arc<dyn LineProvider> {
        let mut database = LineDatabase::default();
        for (name, set) in entries {
            database.insert(LineId::from(name), set);
        }
        Arc::new(database)
    }

    fn text_set(text: &str, priority: i32) -> LineSet {
        LineSet::new(vec![LineVariant::text_only(text)]).with_priority(priority)
    }

    fn triggered_set(priority: i32) -> LineSet {
        let mut variant = LineVariant::text_only("triggered line");
        variant.start_trigger = Some("start_line".into());
        variant.stop_trigger = Some("stop_line".into());
        LineSet::new(vec![variant]).with_priority(priority)
    }

    /// Audio driver that records every call and acknowledges triggers
    /// according to `accept`.
    struct RecordingAudio {
        log: Rc<RefCell<Vec<String>>>,
        accept: bool,
    }

    impl AudioDriver for RecordingAudio {
        fn execute_start_trigger(&mut self, actor: ActorId, trigger: &str) -> bool {
            self.log.borrow_mut().push(format!("start:{actor}:{trigger}"));
            self.accept
        }

        fn execute_stop_trigger(&mut self, actor: ActorId, trigger: &str) -> bool {
            self.log.borrow_mut().push(format!("stop:{actor}:{trigger}"));
            self.accept
        }

        fn play_file(&mut self, actor: ActorId, path: &str) -> bool {
            self.log.borrow_mut().push(format!("play:{actor}:{path}"));
            self.accept
        }

        fn stop_all(&mut self, actor: ActorId) {
            self.log.borrow_mut().push(format!("stop_all:{actor}"));
        }
    }

    fn events_sink(
        scheduler: &mut SpeakerScheduler,
    ) -> Rc<RefCell<Vec<(ActorId, LineId, LineEventKind)>>> {
        let seen: Rc<RefCell<Vec<(ActorId, LineId, LineEventKind)>>> = Rc::default();
        let sink = Rc::clone(&seen);
        scheduler.add_listener(Box::new(move |event: &LineEvent| {
            sink.borrow_mut()
                .push((event.actor, event.line.clone(), event.kind));
        }));
        seen
    }

    const ACTOR: ActorId = ActorId::new(1);

    // -----------------------------------------------------------------------
    // Starting and finishing
    // -----------------------------------------------------------------------

    #[test]
    fn text_only_line_finishes_on_read_time() {
        let lines = provider(vec![("greet", text_set("Hi", 50))]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        let events = events_sink(&mut scheduler);
        let line = LineId::from("greet");

        assert_eq!(scheduler.start_speaking(ACTOR, &line, 0.0), SpeakOutcome::Started);
        assert_eq!(scheduler.line_activity(ACTOR, &line), LineActivity::Active);

        // "Hi" at 16 chars/s plus the 0.2s default pause: 0.325s total.
        scheduler.update(0.2);
        assert_eq!(scheduler.active_line(ACTOR), Some(&line));

        scheduler.update(0.4);
        assert_eq!(scheduler.active_line(ACTOR), None);
        assert!(
            events
                .borrow()
                .iter()
                .any(|(_, _, kind)| *kind == LineEventKind::Finished)
        );
    }

    #[test]
    fn unknown_line_is_skipped() {
        let lines = provider(vec![]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("missing"), 0.0),
            SpeakOutcome::Skipped(SkipReason::NoValidVariation)
        );
    }

    #[test]
    fn listener_veto_skips_with_external_code() {
        struct Veto;
        impl SpeechListener for Veto {
            fn line_about_to_start(&self, _actor: ActorId, _line: &LineId) -> bool {
                false
            }
            fn on_line_event(&self, _event: &LineEvent) {}
        }

        let lines = provider(vec![("greet", text_set("Hi", 50))]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        let id = scheduler.add_listener(Box::new(Veto));
        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("greet"), 0.0),
            SpeakOutcome::Skipped(SkipReason::ExternalCode)
        );

        assert!(scheduler.remove_listener(id));
        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("greet"), 0.0),
            SpeakOutcome::Started
        );
    }

    #[test]
    fn audio_line_waits_for_completion_then_pause() {
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        let lines = provider(vec![("alert", triggered_set(50))]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        scheduler.set_audio_driver(Box::new(RecordingAudio {
            log: Rc::clone(&log),
            accept: true,
        }));
        let sender = scheduler.completion_sender();
        let line = LineId::from("alert");

        assert_eq!(scheduler.start_speaking(ACTOR, &line, 0.0), SpeakOutcome::Started);
        assert_eq!(
            log.borrow().as_slice(),
            &[format!("start:{ACTOR}:start_line")]
        );

        // No timer while waiting on the audio ack.
        scheduler.update(10.0);
        assert_eq!(scheduler.active_line(ACTOR), Some(&line));

        sender.send(CompletionEvent::AudioStartFinished { actor: ACTOR });
        scheduler.update(10.0);
        // The post-line pause still runs.
        assert_eq!(scheduler.active_line(ACTOR), Some(&line));

        scheduler.update(10.3);
        assert_eq!(scheduler.active_line(ACTOR), None);
    }

    // -----------------------------------------------------------------------
    // Priority arbitration
    // -----------------------------------------------------------------------

    #[test]
    fn higher_priority_hard_stops_line_without_stop_trigger() {
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        let lines = provider(vec![
            ("chatter", text_set("a rather long piece of idle chatter", 50)),
            ("alarm", text_set("Intruder!", 80)),
        ]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        scheduler.set_audio_driver(Box::new(RecordingAudio {
            log: Rc::clone(&log),
            accept: true,
        }));

        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("chatter"), 0.0),
            SpeakOutcome::Started
        );
        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("alarm"), 0.1),
            SpeakOutcome::Started
        );
        assert_eq!(scheduler.active_line(ACTOR), Some(&LineId::from("alarm")));
    }

    #[test]
    fn higher_priority_preempts_gracefully_via_stop_trigger() {
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        let lines = provider(vec![
            ("chatter", triggered_set(50)),
            ("alarm", text_set("Intruder!", 80)),
        ]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        scheduler.set_audio_driver(Box::new(RecordingAudio {
            log: Rc::clone(&log),
            accept: true,
        }));
        let sender = scheduler.completion_sender();
        let alarm = LineId::from("alarm");

        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("chatter"), 0.0),
            SpeakOutcome::Started
        );
        // Graceful preemption: stop trigger fires and the new line queues.
        assert_eq!(
            scheduler.start_speaking(ACTOR, &alarm, 0.1),
            SpeakOutcome::Queued
        );
        assert!(
            log.borrow()
                .iter()
                .any(|call| call == &format!("stop:{ACTOR}:stop_line"))
        );
        assert_eq!(scheduler.active_line(ACTOR), Some(&LineId::from("chatter")));

        // The slot stays held until the stop is acknowledged.
        scheduler.update(0.2);
        assert_eq!(scheduler.active_line(ACTOR), Some(&LineId::from("chatter")));

        sender.send(CompletionEvent::AudioStopFinished { actor: ACTOR });
        scheduler.update(0.3);
        assert_eq!(scheduler.active_line(ACTOR), Some(&alarm));
    }

    #[test]
    fn failed_stop_trigger_falls_back_to_hard_stop_on_preemption() {
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        let lines = provider(vec![
            ("chatter", triggered_set(50)),
            ("alarm", text_set("Intruder!", 80)),
        ]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        scheduler.set_audio_driver(Box::new(RecordingAudio {
            log: Rc::clone(&log),
            accept: false,
        }));
        let alarm = LineId::from("alarm");

        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("chatter"), 0.0),
            SpeakOutcome::Started
        );
        // The stop trigger is refused, so the new line takes the slot
        // immediately instead of queuing behind a wind-down.
        assert_eq!(scheduler.start_speaking(ACTOR, &alarm, 0.1), SpeakOutcome::Started);
        assert!(
            log.borrow()
                .iter()
                .any(|call| call == &format!("stop:{ACTOR}:stop_line"))
        );
        assert!(
            log.borrow()
                .iter()
                .any(|call| call == &format!("stop_all:{ACTOR}"))
        );
        assert_eq!(scheduler.active_line(ACTOR), Some(&alarm));
        let entry = scheduler.active_entry(ACTOR);
        assert_eq!(entry.map(|entry| entry.pending.stop_ack), Some(false));
    }

    #[test]
    fn same_priority_different_line_preempts_under_policy() {
        let lines = provider(vec![
            ("one", text_set("first line text", 50)),
            ("two", text_set("second line text", 50)),
        ]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);

        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("one"), 0.0),
            SpeakOutcome::Started
        );
        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("two"), 0.1),
            SpeakOutcome::Started
        );
        assert_eq!(scheduler.active_line(ACTOR), Some(&LineId::from("two")));
    }

    #[test]
    fn lower_priority_queues_and_times_out() {
        let lines = provider(vec![
            ("alarm", text_set("a long alarm line that keeps playing", 80)),
            ("chatter", text_set("Hm.", 30)),
        ]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        let events = events_sink(&mut scheduler);
        let chatter = LineId::from("chatter");

        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("alarm"), 0.0),
            SpeakOutcome::Started
        );
        assert_eq!(
            scheduler.start_speaking(ACTOR, &chatter, 0.0),
            SpeakOutcome::Queued
        );
        assert_eq!(scheduler.line_activity(ACTOR, &chatter), LineActivity::Queued);

        // Default queue duration is 2s; the request expires while the
        // alarm still plays.
        scheduler.update(1.0);
        assert_eq!(scheduler.line_activity(ACTOR, &chatter), LineActivity::Queued);
        scheduler.update(2.1);
        assert_eq!(scheduler.line_activity(ACTOR, &chatter), LineActivity::Inactive);
        assert!(events.borrow().iter().any(|(_, line, kind)| {
            *line == chatter && *kind == LineEventKind::Skipped(SkipReason::Timeout)
        }));
    }

    #[test]
    fn zero_queue_duration_skips_on_priority() {
        let lines = provider(vec![
            ("alarm", text_set("a long alarm line that keeps playing", 80)),
            (
                "chatter",
                text_set("Hm.", 30).with_max_queue_duration(0.0),
            ),
        ]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);

        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("alarm"), 0.0),
            SpeakOutcome::Started
        );
        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("chatter"), 0.0),
            SpeakOutcome::Skipped(SkipReason::Priority)
        );
    }

    #[test]
    fn preemption_winner_with_no_queue_budget_waits_for_winddown() {
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        let lines = provider(vec![
            ("chatter", triggered_set(50)),
            (
                "alarm",
                text_set("Intruder!", 80).with_max_queue_duration(0.0),
            ),
        ]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        scheduler.set_audio_driver(Box::new(RecordingAudio {
            log: Rc::clone(&log),
            accept: true,
        }));
        let sender = scheduler.completion_sender();
        let alarm = LineId::from("alarm");

        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("chatter"), 0.0),
            SpeakOutcome::Started
        );
        assert_eq!(scheduler.start_speaking(ACTOR, &alarm, 0.1), SpeakOutcome::Queued);

        // The winner outlives the wind-down even though its own queue
        // budget is zero.
        scheduler.update(0.5);
        assert_eq!(scheduler.line_activity(ACTOR, &alarm), LineActivity::Queued);

        sender.send(CompletionEvent::AudioStopFinished { actor: ACTOR });
        scheduler.update(0.6);
        assert_eq!(scheduler.active_line(ACTOR), Some(&alarm));
    }

    #[test]
    fn requeue_refreshes_deadline_instead_of_duplicating() {
        let lines = provider(vec![
            ("alarm", text_set("a long alarm line that keeps playing", 80)),
            ("chatter", text_set("Hm.", 30)),
        ]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        let chatter = LineId::from("chatter");

        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("alarm"), 0.0),
            SpeakOutcome::Started
        );
        assert_eq!(scheduler.start_speaking(ACTOR, &chatter, 0.0), SpeakOutcome::Queued);
        assert_eq!(scheduler.start_speaking(ACTOR, &chatter, 0.5), SpeakOutcome::Queued);

        let queued = scheduler.queued_requests();
        assert_eq!(queued.len(), 1);
        // The default 2s budget now counts from the second request.
        assert!(
            queued
                .first()
                .is_some_and(|request| (request.expires_at - 2.5).abs() < 1e-9)
        );

        // Still alive past the first deadline, gone past the second.
        scheduler.update(2.1);
        assert_eq!(scheduler.line_activity(ACTOR, &chatter), LineActivity::Queued);
        scheduler.update(2.6);
        assert_eq!(scheduler.line_activity(ACTOR, &chatter), LineActivity::Inactive);
    }

    #[test]
    fn grace_requeue_keeps_the_boosted_priority() {
        let lines = provider(vec![
            ("short", text_set("Hi", 80)),
            ("followup", text_set("queued while speaking", 50)),
        ]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        let followup = LineId::from("followup");

        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("short"), 0.0),
            SpeakOutcome::Started
        );
        assert_eq!(
            scheduler.start_speaking(ACTOR, &followup, 0.1),
            SpeakOutcome::Queued
        );

        // The line finishes at 0.325 and opens the grace window.
        scheduler.update(0.4);
        assert_eq!(scheduler.active_line(ACTOR), None);

        // Re-requesting inside the window refreshes the single entry
        // and keeps the higher (boosted) priority.
        assert_eq!(
            scheduler.start_speaking(ACTOR, &followup, 0.5),
            SpeakOutcome::Queued
        );
        let queued = scheduler.queued_requests();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued.first().map(|request| request.priority), Some(51));

        scheduler.update(0.8);
        assert_eq!(scheduler.active_line(ACTOR), Some(&followup));
    }

    #[test]
    fn queued_line_starts_when_slot_frees() {
        let lines = provider(vec![
            ("short", text_set("Hi", 80)),
            ("next", text_set("And now this", 30)),
        ]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        let next = LineId::from("next");

        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("short"), 0.0),
            SpeakOutcome::Started
        );
        assert_eq!(scheduler.start_speaking(ACTOR, &next, 0.0), SpeakOutcome::Queued);

        // "Hi" finishes at 0.325; the grace window (0.3s) holds the
        // queue back until 0.7.
        scheduler.update(0.4);
        assert_eq!(scheduler.active_line(ACTOR), None);
        scheduler.update(0.5);
        assert_eq!(scheduler.active_line(ACTOR), None);

        scheduler.update(0.8);
        assert_eq!(scheduler.active_line(ACTOR), Some(&next));
    }

    // -----------------------------------------------------------------------
    // Grace window
    // -----------------------------------------------------------------------

    #[test]
    fn grace_window_boost_wins_tie_against_earlier_request() {
        let lines = provider(vec![
            ("short", text_set("Hi", 80)),
            ("earlier", text_set("queued before the finish", 50)),
            ("followup", text_set("queued in the grace window", 50)),
        ]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        let followup = LineId::from("followup");

        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("short"), 0.0),
            SpeakOutcome::Started
        );
        assert_eq!(
            scheduler.start_speaking(ACTOR, &LineId::from("earlier"), 0.1),
            SpeakOutcome::Queued
        );

        // The line finishes at 0.325 and is released here.
        scheduler.update(0.4);
        assert_eq!(scheduler.active_line(ACTOR), None);

        // Inside the grace window the request queues with the boost
        // instead of starting.
        assert_eq!(
            scheduler.start_speaking(ACTOR, &followup, 0.5),
            SpeakOutcome::Queued
        );
        assert_eq!(scheduler.active_line(ACTOR), None);

        // Once the window closes, the boosted follow-up beats the
        // earlier same-priority request.
        scheduler.update(0.8);
        assert_eq!(scheduler.active_line(ACTOR), Some(&followup));
    }

    // -----------------------------------------------------------------------
    // Pick policies on the slot
    // -----------------------------------------------------------------------

    #[test]
    fn sequential_once_exhausts() {
        let set = LineSet::new(vec![
            LineVariant::text_only("Hi"),
            LineVariant::text_only("Ho"),
        ])
        .with_policy(PickPolicy::SequentialOnce);
        let lines = provider(vec![("greet", set)]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        let line = LineId::from("greet");

        assert_eq!(scheduler.start_speaking(ACTOR, &line, 0.0), SpeakOutcome::Started);
        scheduler.update(1.0);
        scheduler.update(2.0);
        assert_eq!(scheduler.start_speaking(ACTOR, &line, 2.0), SpeakOutcome::Started);
        scheduler.update(3.0);
        scheduler.update(4.0);
        assert_eq!(
            scheduler.start_speaking(ACTOR, &line, 4.0),
            SpeakOutcome::Skipped(SkipReason::NoValidVariation)
        );
    }

    #[test]
    fn all_in_order_chains_variants_on_one_slot() {
        let set = LineSet::new(vec![
            LineVariant::text_only("Hi"),
            LineVariant::text_only("Ho"),
        ])
        .with_policy(PickPolicy::AllInOrder);
        let lines = provider(vec![("speech", set)]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        let events = events_sink(&mut scheduler);
        let line = LineId::from("speech");

        assert_eq!(scheduler.start_speaking(ACTOR, &line, 0.0), SpeakOutcome::Started);

        // First variant finishes at 0.325; the second restarts in place.
        scheduler.update(0.4);
        assert_eq!(scheduler.active_line(ACTOR), Some(&line));
        assert!(events.borrow().iter().any(|(_, _, kind)| {
            *kind == LineEventKind::Started { variant: 1 }
        }));

        scheduler.update(0.8);
        assert_eq!(scheduler.active_line(ACTOR), None);
        let finishes = events
            .borrow()
            .iter()
            .filter(|(_, _, kind)| *kind == LineEventKind::Finished)
            .count();
        assert_eq!(finishes, 2);
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    #[test]
    fn cancel_by_actor_hard_stops_and_clears_queue() {
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        let lines = provider(vec![
            ("alarm", text_set("a long alarm line that keeps playing", 80)),
            ("chatter", text_set("Hm.", 30)),
        ]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        scheduler.set_audio_driver(Box::new(RecordingAudio {
            log: Rc::clone(&log),
            accept: true,
        }));

        scheduler.start_speaking(ACTOR, &LineId::from("alarm"), 0.0);
        scheduler.start_speaking(ACTOR, &LineId::from("chatter"), 0.0);

        assert!(scheduler.cancel_speaking(Some(ACTOR), -1, None, true));
        assert_eq!(scheduler.active_line(ACTOR), None);
        assert!(scheduler.queued_requests().is_empty());

        // Nothing left to cancel.
        assert!(!scheduler.cancel_speaking(Some(ACTOR), -1, None, true));
    }

    #[test]
    fn cancel_respects_priority_ceiling() {
        let lines = provider(vec![(
            "alarm",
            text_set("a long alarm line that keeps playing", 80),
        )]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        scheduler.start_speaking(ACTOR, &LineId::from("alarm"), 0.0);

        assert!(!scheduler.cancel_speaking(None, 50, None, false));
        assert_eq!(scheduler.active_line(ACTOR), Some(&LineId::from("alarm")));

        assert!(scheduler.cancel_speaking(None, 80, None, false));
        assert_eq!(scheduler.active_line(ACTOR), None);
    }

    #[test]
    fn cancel_with_stop_trigger_winds_down_gracefully() {
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        let lines = provider(vec![("chatter", triggered_set(50))]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        scheduler.set_audio_driver(Box::new(RecordingAudio {
            log: Rc::clone(&log),
            accept: true,
        }));
        let sender = scheduler.completion_sender();
        let line = LineId::from("chatter");

        scheduler.start_speaking(ACTOR, &line, 0.0);
        assert!(scheduler.cancel_speaking(Some(ACTOR), -1, Some(&line), false));

        // Winding down: the slot is still held.
        assert_eq!(scheduler.active_line(ACTOR), Some(&line));
        // Canceling again matches but does not re-fire the trigger.
        assert!(scheduler.cancel_speaking(Some(ACTOR), -1, Some(&line), false));
        let stops = log
            .borrow()
            .iter()
            .filter(|call| call.starts_with("stop:"))
            .count();
        assert_eq!(stops, 1);

        sender.send(CompletionEvent::AudioStopFinished { actor: ACTOR });
        scheduler.update(0.5);
        assert_eq!(scheduler.active_line(ACTOR), None);
    }

    #[test]
    fn cancel_with_failed_stop_trigger_hard_stops_immediately() {
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        let lines = provider(vec![("chatter", triggered_set(50))]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);
        scheduler.set_audio_driver(Box::new(RecordingAudio {
            log: Rc::clone(&log),
            accept: false,
        }));
        let line = LineId::from("chatter");

        assert_eq!(scheduler.start_speaking(ACTOR, &line, 0.0), SpeakOutcome::Started);
        // The refused stop trigger frees the slot at once rather than
        // leaving the line winding down.
        assert!(scheduler.cancel_speaking(Some(ACTOR), -1, Some(&line), false));
        assert_eq!(scheduler.active_line(ACTOR), None);
        assert!(
            log.borrow()
                .iter()
                .any(|call| call == &format!("stop:{ACTOR}:stop_line"))
        );
        assert!(
            log.borrow()
                .iter()
                .any(|call| call == &format!("stop_all:{ACTOR}"))
        );
    }

    #[test]
    fn actor_removal_clears_all_state() {
        let lines = provider(vec![
            ("alarm", text_set("a long alarm line that keeps playing", 80)),
            ("chatter", text_set("Hm.", 30)),
        ]);
        let mut scheduler = SpeakerScheduler::new(SpeechConfig::default(), lines);

        scheduler.start_speaking(ACTOR, &LineId::from("alarm"), 0.0);
        scheduler.start_speaking(ACTOR, &LineId::from("chatter"), 0.0);
        scheduler.on_actor_removed(ACTOR);

        assert_eq!(scheduler.active_line(ACTOR), None);
        assert!(scheduler.queued_requests().is_empty());
    }
}
