//! Polling synchronizer and the display-side player driver.
//!
//! Two independent timing domains:
//!
//! - the poller reads the store every `interval` and forwards each snapshot
//!   to the driver unconditionally; a failed or slow read is logged and the
//!   next tick proceeds as scheduled.
//! - the driver owns the [`BatchPlayer`] and the one pending frame timer.
//!   Re-arming replaces the deadline, so a superseded timer never fires.

pub mod source;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::errors::AvatarError;
use crate::player::{BatchPlayer, FrameRenderer, TimerCommand};
use crate::state::types::AvatarView;

pub use source::{HttpViewSource, ViewSource};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshots buffered between poller and driver.
const VIEW_CHANNEL_CAPACITY: usize = 8;

// ---------------------------------------------------------------------------
// PollingSynchronizer
// ---------------------------------------------------------------------------

/// Repeatedly reads a [`ViewSource`] at a fixed interval.
pub struct PollingSynchronizer<S> {
    source: Arc<S>,
    interval: Duration,
    fetch_timeout: Duration,
}

impl<S: ViewSource + 'static> PollingSynchronizer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            interval: DEFAULT_POLL_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Builder: set the poll interval. Zero is bumped to 1ms.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Builder: set the per-read timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One bounded read of the source.
    pub async fn poll_once(&self) -> Result<AvatarView, AvatarError> {
        match tokio::time::timeout(self.fetch_timeout, self.source.fetch_view()).await {
            Ok(result) => result,
            Err(_) => Err(AvatarError::TransportUnavailable(format!(
                "state read timed out after {:?}",
                self.fetch_timeout
            ))),
        }
    }

    /// Poll until shutdown or until the receiving side goes away.
    pub async fn run(self, views: mpsc::Sender<AvatarView>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(interval = ?self.interval, "Polling synchronizer started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            match self.poll_once().await {
                Ok(view) => {
                    if views.send(view).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Avatar state poll failed"),
            }
        }
        tracing::debug!("Polling synchronizer stopped");
    }
}

// ---------------------------------------------------------------------------
// PlayerDriver
// ---------------------------------------------------------------------------

/// Runs a [`BatchPlayer`] against incoming snapshots and its frame timer.
pub struct PlayerDriver<R> {
    player: BatchPlayer,
    renderer: R,
}

impl<R: FrameRenderer> PlayerDriver<R> {
    pub fn new(player: BatchPlayer, renderer: R) -> Self {
        Self { player, renderer }
    }

    pub async fn run(
        mut self,
        mut views: mpsc::Receiver<AvatarView>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                view = views.recv() => match view {
                    Some(view) => {
                        let transition = self.player.observe(&view, &mut self.renderer);
                        apply_timer(&mut deadline, transition.timer);
                    }
                    None => break,
                },
                _ = frame_timer(deadline) => {
                    deadline = None;
                    let transition = self.player.on_timer_expired(&mut self.renderer);
                    apply_timer(&mut deadline, transition.timer);
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::debug!("Player driver stopped");
    }
}

fn apply_timer(deadline: &mut Option<Instant>, command: TimerCommand) {
    match command {
        TimerCommand::Keep => {}
        TimerCommand::Arm(duration) => *deadline = Some(Instant::now() + duration),
        TimerCommand::Cancel => *deadline = None,
    }
}

fn frame_timer(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// DisplayHandle
// ---------------------------------------------------------------------------

/// Running poller + driver pair.
pub struct DisplayHandle {
    shutdown: watch::Sender<bool>,
    poller: JoinHandle<()>,
    driver: JoinHandle<()>,
}

impl DisplayHandle {
    /// Stop polling and cancel the pending frame timer.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.poller.await {
            tracing::warn!(error = %e, "Poller task ended abnormally");
        }
        if let Err(e) = self.driver.await {
            tracing::warn!(error = %e, "Player driver task ended abnormally");
        }
    }
}

/// Spawn a display client: poll `synchronizer`'s source and play into `renderer`.
pub fn spawn_display<S, R>(
    synchronizer: PollingSynchronizer<S>,
    player: BatchPlayer,
    renderer: R,
) -> DisplayHandle
where
    S: ViewSource + 'static,
    R: FrameRenderer + 'static,
{
    let (shutdown, shutdown_rx) = watch::channel(false);
    let (tx, rx) = mpsc::channel(VIEW_CHANNEL_CAPACITY);
    let poller = tokio::spawn(synchronizer.run(tx, shutdown_rx.clone()));
    let driver = tokio::spawn(PlayerDriver::new(player, renderer).run(rx, shutdown_rx));
    DisplayHandle {
        shutdown,
        poller,
        driver,
    }
}
