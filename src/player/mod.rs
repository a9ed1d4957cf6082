//! Batch player: the display-side timed state machine.
//!
//! The player is fed store snapshots (from the polling synchronizer) and
//! timer expiries (from whatever owns the clock). It never sleeps itself;
//! every call returns a [`TimerCommand`] telling the owner which single
//! frame timer should be pending afterwards.
//!
//! ```text
//!   Idle ──new batchId──▶ PlayingFrame(0) ──timer──▶ PlayingFrame(1) ──timer──▶ …
//!    ▲                        │    ▲                                           │
//!    │ batch gone             │    └──────────── wrap (loop, maybe shuffle) ◀──┤
//!    └────────────────────────┘                                                │
//!                                       AwaitingSupersession ◀── end, no loop ─┘
//! ```

pub mod render;

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::state::types::{AvatarView, BatchDescriptor, VisualState};

pub use render::{Frame, FrameRenderer, ImageResolver, LogRenderer};

/// Where the player is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No batch; single-expression display.
    Idle,
    /// Showing the frame at this position of the current run order.
    PlayingFrame(usize),
    /// A non-looping batch ran out; its last frame stays up.
    AwaitingSupersession,
}

/// What the owner of the clock must do with the frame timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    /// Leave the pending timer (if any) as it is.
    Keep,
    /// Replace any pending timer with one firing after this long.
    Arm(Duration),
    /// Drop any pending timer.
    Cancel,
}

/// What a call to the player did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Unchanged,
    /// Single-expression state was (re)drawn.
    ShowedExpression,
    Started { batch_id: String },
    Stopped,
    Advanced(usize),
    Wrapped,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub event: PlayerEvent,
    pub timer: TimerCommand,
}

impl Transition {
    fn new(event: PlayerEvent, timer: TimerCommand) -> Self {
        Self { event, timer }
    }

    fn unchanged() -> Self {
        Self::new(PlayerEvent::Unchanged, TimerCommand::Keep)
    }
}

/// One local playthrough of a batch.
#[derive(Debug)]
struct Run {
    batch: Arc<BatchDescriptor>,
    /// Indices into `batch.actions`, reshuffled on wrap for random batches.
    order: Vec<usize>,
    position: usize,
}

enum Step {
    Next,
    Wrapped,
    Finished,
}

/// Walks a batch's frames and tracks which batch it is playing.
#[derive(Debug)]
pub struct BatchPlayer {
    resolver: ImageResolver,
    rng: StdRng,
    run: Option<Run>,
    state: PlayerState,
    last_single: Option<(String, VisualState)>,
}

impl BatchPlayer {
    pub fn new(resolver: ImageResolver) -> Self {
        Self::with_rng(resolver, StdRng::from_entropy())
    }

    /// Deterministic shuffles, for reproducible playback.
    pub fn with_seed(resolver: ImageResolver, seed: u64) -> Self {
        Self::with_rng(resolver, StdRng::seed_from_u64(seed))
    }

    fn with_rng(resolver: ImageResolver, rng: StdRng) -> Self {
        Self {
            resolver,
            rng,
            run: None,
            state: PlayerState::Idle,
            last_single: None,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn batch_id(&self) -> Option<&str> {
        self.run.as_ref().map(|r| r.batch.batch_id.as_str())
    }

    /// Feed a store snapshot.
    ///
    /// A new `batchId` restarts playback, a vanished batch stops it, and the
    /// same `batchId` is a no-op so polling never resets a running timer.
    pub fn observe(&mut self, view: &AvatarView, renderer: &mut dyn FrameRenderer) -> Transition {
        match &view.batch {
            Some(batch) => {
                if self.batch_id() == Some(batch.batch_id.as_str()) {
                    return Transition::unchanged();
                }
                self.start(Arc::clone(batch), renderer)
            }
            None => {
                let stopped = self.run.take().is_some();
                let key = (view.expression_name.clone(), view.visual);
                if !stopped && self.last_single.as_ref() == Some(&key) {
                    return Transition::unchanged();
                }
                self.state = PlayerState::Idle;
                self.show_single(view, renderer);
                self.last_single = Some(key);
                if stopped {
                    tracing::debug!("Batch cleared, back to single expression");
                    Transition::new(PlayerEvent::Stopped, TimerCommand::Cancel)
                } else {
                    Transition::new(PlayerEvent::ShowedExpression, TimerCommand::Keep)
                }
            }
        }
    }

    /// The pending frame timer fired.
    pub fn on_timer_expired(&mut self, renderer: &mut dyn FrameRenderer) -> Transition {
        if !matches!(self.state, PlayerState::PlayingFrame(_)) {
            return Transition::unchanged();
        }
        let event = match self.step() {
            Step::Next => PlayerEvent::Advanced(self.position()),
            Step::Wrapped => PlayerEvent::Wrapped,
            Step::Finished => {
                self.state = PlayerState::AwaitingSupersession;
                tracing::debug!(batch_id = ?self.batch_id(), "Batch finished");
                return Transition::new(PlayerEvent::Finished, TimerCommand::Cancel);
            }
        };
        let (timer, wrapped_while_skipping) = self.play_current(renderer);
        let event = match (event, self.state) {
            (_, PlayerState::AwaitingSupersession) => PlayerEvent::Finished,
            (_, PlayerState::PlayingFrame(_)) if wrapped_while_skipping => PlayerEvent::Wrapped,
            (PlayerEvent::Advanced(_), PlayerState::PlayingFrame(i)) => PlayerEvent::Advanced(i),
            (event, _) => event,
        };
        Transition::new(event, timer)
    }

    fn start(&mut self, batch: Arc<BatchDescriptor>, renderer: &mut dyn FrameRenderer) -> Transition {
        tracing::debug!(batch_id = %batch.batch_id, frames = batch.actions.len(), "Starting batch");
        let batch_id = batch.batch_id.clone();
        self.run = Some(Run {
            order: (0..batch.actions.len()).collect(),
            batch,
            position: 0,
        });
        self.last_single = None;
        let (timer, _) = self.play_current(renderer);
        Transition::new(PlayerEvent::Started { batch_id }, timer)
    }

    fn position(&self) -> usize {
        self.run.as_ref().map(|r| r.position).unwrap_or(0)
    }

    /// Move to the next position, wrapping (and reshuffling) when looping.
    fn step(&mut self) -> Step {
        let Some(run) = self.run.as_mut() else {
            return Step::Finished;
        };
        if run.position + 1 < run.order.len() {
            run.position += 1;
            return Step::Next;
        }
        if !run.batch.looping {
            return Step::Finished;
        }
        if run.batch.random {
            run.order.shuffle(&mut self.rng);
        }
        run.position = 0;
        tracing::debug!(batch_id = %run.batch.batch_id, order = ?run.order, "Batch wrapped");
        Step::Wrapped
    }

    /// Render the frame at the current position, skipping unresolvable ones
    /// as if their duration were zero. The flag is set when skipping wrapped
    /// past the end of the batch.
    fn play_current(&mut self, renderer: &mut dyn FrameRenderer) -> (TimerCommand, bool) {
        let mut skipped = 0;
        let mut wrapped = false;
        loop {
            let Some(run) = self.run.as_ref() else {
                self.state = PlayerState::Idle;
                return (TimerCommand::Cancel, wrapped);
            };
            if run.order.is_empty() || skipped >= run.order.len() {
                tracing::warn!(batch_id = %run.batch.batch_id, "No frame of the batch can be displayed");
                self.state = PlayerState::AwaitingSupersession;
                return (TimerCommand::Cancel, wrapped);
            }

            let position = run.position;
            let action = &run.batch.actions[run.order[position]];
            match self.resolver.resolve(&action.expression_name) {
                Some(image_ref) => {
                    renderer.render(&Frame {
                        expression_name: action.expression_name.clone(),
                        image_ref,
                        visual: action.visual,
                    });
                    let duration = Duration::from_millis(action.duration_ms);
                    self.state = PlayerState::PlayingFrame(position);
                    return (TimerCommand::Arm(duration), wrapped);
                }
                None => {
                    tracing::warn!(
                        expression = %action.expression_name,
                        position,
                        "Skipping frame with unresolvable expression"
                    );
                    skipped += 1;
                    match self.step() {
                        Step::Next => {}
                        Step::Wrapped => wrapped = true,
                        Step::Finished => {
                            self.state = PlayerState::AwaitingSupersession;
                            return (TimerCommand::Cancel, wrapped);
                        }
                    }
                }
            }
        }
    }

    fn show_single(&self, view: &AvatarView, renderer: &mut dyn FrameRenderer) {
        let image_ref = view
            .catalog_entry
            .as_ref()
            .map(|e| e.image_ref.clone())
            .or_else(|| self.resolver.resolve(&view.expression_name));
        match image_ref {
            Some(image_ref) => renderer.render(&Frame {
                expression_name: view.expression_name.clone(),
                image_ref,
                visual: view.visual,
            }),
            None => tracing::warn!(expression = %view.expression_name, "Cannot resolve expression image"),
        }
    }
}
