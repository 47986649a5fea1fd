//! Autosave coordinator.
//!
//! One coordinator runs per open document view. It owns a single tokio task
//! whose event loop is the only place the dirty flag changes, so the timer,
//! navigation and unload triggers can race without ever dispatching the same
//! dirty episode twice.
//!
//! | Trigger    | Source                         | Condition                       |
//! |------------|--------------------------------|---------------------------------|
//! | Interval   | recurring timer                | `enabled`, dirty, eligible      |
//! | Navigation | [`HostSignal::NavigationStart`]| `flush_on_navigation`, dirty, eligible |
//! | Unload     | [`HostSignal::Unload`]         | `flush_on_unload`, dirty, eligible |
//! | Manual     | [`AutosaveCoordinator::flush`] | dirty, eligible                 |
//! | Teardown   | shutdown or drop               | dirty, eligible                 |
//!
//! Saves are fire-and-forget: each dispatch runs in its own task and reports
//! back to the loop when done. Teardown never cancels them; a save that
//! finishes after the loop stopped runs the hooks and emits its outcome
//! itself.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use super::config::{AutoSaveConfig, RetryPolicy};
use super::tracker::DirtyTracker;
use crate::document::{DocumentUpdate, SharedDocument};
use crate::error::{AutosaveError, Result};
use crate::handle::DocumentHandle;
use crate::signals::{HostSignal, SignalSource};
use crate::store::{DocumentStore, SaveReceipt};
use crate::throttle::SaveHook;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What caused a save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Interval,
    Navigation,
    Unload,
    Manual,
    Teardown,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interval => "interval",
            Self::Navigation => "navigation",
            Self::Unload => "unload",
            Self::Manual => "manual",
            Self::Teardown => "teardown",
        })
    }
}

/// Save lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveEvent {
    /// A save request was handed to the store.
    Dispatched {
        trigger: Trigger,
        dispatch: u64,
        bytes: usize,
    },
    /// The store acknowledged a dispatched save.
    Saved {
        trigger: Trigger,
        dispatch: u64,
        attempts: u32,
        receipt: SaveReceipt,
    },
    /// A save could not be completed. `dispatch` is `None` when the document
    /// could not be encoded and nothing was sent.
    Failed {
        trigger: Trigger,
        dispatch: Option<u64>,
        attempts: u32,
        message: String,
    },
}

/// Snapshot of coordinator state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutosaveStatus {
    pub dirty: bool,
    pub eligible: bool,
    pub in_flight: usize,
    /// Local updates observed since the coordinator started.
    pub local_updates: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub last_revision: Option<u64>,
    /// User-facing message of the most recent failure, cleared by the next
    /// successful save.
    pub last_error: Option<String>,
}

/// Outcome of tearing a coordinator down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    /// Whether teardown dispatched a final save.
    pub final_flush: bool,
    /// Saves still in flight when the loop stopped, including the final one.
    pub in_flight: usize,
}

enum Command {
    SetEligible(bool),
    Flush(oneshot::Sender<bool>),
    Shutdown(oneshot::Sender<TeardownReport>),
}

struct SaveFinished {
    trigger: Trigger,
    dispatch: u64,
    attempts: u32,
    result: Result<SaveReceipt>,
}

/// Builder for [`AutosaveCoordinator`].
pub struct CoordinatorBuilder<D: ?Sized, S: ?Sized> {
    handle: DocumentHandle,
    document: Arc<D>,
    store: Arc<S>,
    signals: Option<broadcast::Receiver<HostSignal>>,
    config: AutoSaveConfig,
    eligible: bool,
    hooks: Vec<Arc<dyn SaveHook>>,
}

impl<D, S> CoordinatorBuilder<D, S>
where
    D: SharedDocument + ?Sized,
    S: DocumentStore + ?Sized + 'static,
{
    /// Listen for navigation and unload signals from `source`.
    pub fn signals(mut self, source: &impl SignalSource) -> Self {
        self.signals = Some(source.subscribe_signals());
        self
    }

    pub fn config(mut self, config: AutoSaveConfig) -> Self {
        self.config = config;
        self
    }

    /// Initial save eligibility. Defaults to `true`.
    pub fn eligible(mut self, eligible: bool) -> Self {
        self.eligible = eligible;
        self
    }

    /// Run `hook` after every acknowledged save.
    pub fn on_saved(mut self, hook: Arc<dyn SaveHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Subscribe to the document and start the event loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> Result<AutosaveCoordinator> {
        self.config
            .validate()
            .map_err(|reason| AutosaveError::InvalidConfig { reason })?;

        let updates = self.document.subscribe_updates();
        let seen_local_revision = self.document.local_revision();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let tracker = DirtyTracker::new(self.eligible);
        let (status_tx, status_rx) = watch::channel(status_of(&tracker, None, None));

        let period = self.config.interval();
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let span = info_span!("autosave", handle = %self.handle);
        let event_loop = EventLoop {
            handle: self.handle.clone(),
            document: self.document,
            store: self.store,
            config: self.config,
            tracker,
            updates: Some(updates),
            seen_local_revision,
            signals: self.signals,
            commands: command_rx,
            finished_tx,
            finished_rx,
            ticker,
            events: events.clone(),
            status: status_tx,
            hooks: self.hooks.into(),
            next_dispatch: 0,
            last_revision: None,
            last_error: None,
        };

        debug!(handle = %self.handle, interval_ms = period.as_millis() as u64, "starting autosave");
        let task = tokio::spawn(event_loop.run().instrument(span));

        Ok(AutosaveCoordinator {
            handle: self.handle,
            commands: command_tx,
            status: status_rx,
            events,
            task: Some(task),
        })
    }
}

/// Handle to a running autosave event loop.
///
/// Dropping the handle tears the loop down the same way
/// [`shutdown`](Self::shutdown) does, without waiting for it.
pub struct AutosaveCoordinator {
    handle: DocumentHandle,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<AutosaveStatus>,
    events: broadcast::Sender<SaveEvent>,
    task: Option<JoinHandle<()>>,
}

impl AutosaveCoordinator {
    pub fn builder<D, S>(
        handle: DocumentHandle,
        document: Arc<D>,
        store: Arc<S>,
    ) -> CoordinatorBuilder<D, S>
    where
        D: SharedDocument + ?Sized,
        S: DocumentStore + ?Sized + 'static,
    {
        CoordinatorBuilder {
            handle,
            document,
            store,
            signals: None,
            config: AutoSaveConfig::default(),
            eligible: true,
            hooks: Vec::new(),
        }
    }

    pub fn handle(&self) -> &DocumentHandle {
        &self.handle
    }

    /// Change save eligibility. Dirty state survives ineligible periods.
    pub fn set_eligible(&self, eligible: bool) -> Result<()> {
        self.commands
            .send(Command::SetEligible(eligible))
            .map_err(|_| AutosaveError::Closed)
    }

    /// Save now if there are unsaved local edits. Returns whether a save was
    /// dispatched.
    pub async fn flush(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Flush(reply))
            .map_err(|_| AutosaveError::Closed)?;
        rx.await.map_err(|_| AutosaveError::Closed)
    }

    /// Latest state snapshot.
    pub fn status(&self) -> AutosaveStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<AutosaveStatus> {
        self.status.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SaveEvent> {
        self.events.subscribe()
    }

    /// Stop the event loop, dispatching a final save if there are unsaved
    /// local edits. In-flight saves keep running.
    pub async fn shutdown(mut self) -> Result<TeardownReport> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(reply))
            .map_err(|_| AutosaveError::Closed)?;
        let report = rx.await.map_err(|_| AutosaveError::Closed)?;

        if let Some(task) = self.task.take() {
            task.await.map_err(|_| AutosaveError::Closed)?;
        }
        Ok(report)
    }
}

struct EventLoop<D: ?Sized, S: ?Sized> {
    handle: DocumentHandle,
    document: Arc<D>,
    store: Arc<S>,
    config: AutoSaveConfig,
    tracker: DirtyTracker,
    updates: Option<broadcast::Receiver<DocumentUpdate>>,
    /// Document local revision as of the last local update handled.
    seen_local_revision: u64,
    signals: Option<broadcast::Receiver<HostSignal>>,
    commands: mpsc::UnboundedReceiver<Command>,
    finished_tx: mpsc::UnboundedSender<SaveFinished>,
    finished_rx: mpsc::UnboundedReceiver<SaveFinished>,
    ticker: Interval,
    events: broadcast::Sender<SaveEvent>,
    status: watch::Sender<AutosaveStatus>,
    hooks: Arc<[Arc<dyn SaveHook>]>,
    next_dispatch: u64,
    last_revision: Option<u64>,
    last_error: Option<String>,
}

impl<D, S> EventLoop<D, S>
where
    D: SharedDocument + ?Sized,
    S: DocumentStore + ?Sized + 'static,
{
    async fn run(mut self) {
        let reply = loop {
            tokio::select! {
                biased;

                update = recv_or_pending(&mut self.updates) => self.on_update(update),
                command = self.commands.recv() => match command {
                    Some(Command::SetEligible(eligible)) => self.set_eligible(eligible),
                    Some(Command::Flush(reply)) => {
                        let dispatched = self.attempt_save(Trigger::Manual);
                        let _ = reply.send(dispatched);
                    }
                    Some(Command::Shutdown(reply)) => break Some(reply),
                    None => break None,
                },
                Some(finished) = self.finished_rx.recv() => self.on_save_finished(finished),
                signal = recv_or_pending(&mut self.signals) => self.on_signal(signal),
                _ = self.ticker.tick() => self.on_tick(),
            }
            self.publish_status();
        };

        let report = self.teardown();
        if let Some(reply) = reply {
            let _ = reply.send(report);
        }
    }

    fn set_eligible(&mut self, eligible: bool) {
        if self.tracker.is_eligible() != eligible {
            info!(eligible, dirty = self.tracker.is_dirty(), "save eligibility changed");
        }
        self.tracker.set_eligible(eligible);
    }

    fn on_update(&mut self, update: std::result::Result<DocumentUpdate, broadcast::error::RecvError>) {
        match update {
            Ok(update) if update.origin.is_local() => {
                trace!(len = update.len, "local update");
                self.on_local_update();
            }
            Ok(_) => trace!("remote update ignored"),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                if self.catch_up_local_edits() {
                    warn!(missed, "update stream lagged over local edits");
                } else {
                    debug!(missed, "update stream lagged over remote updates only");
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("document update stream closed");
                self.updates = None;
            }
        }
    }

    fn on_local_update(&mut self) {
        self.tracker.mark_dirty();
        self.seen_local_revision = self.seen_local_revision.max(self.document.local_revision());
    }

    /// Mark dirty if the document applied local edits whose notifications
    /// were dropped. Returns whether it did.
    fn catch_up_local_edits(&mut self) -> bool {
        if self.document.local_revision() > self.seen_local_revision {
            self.on_local_update();
            true
        } else {
            false
        }
    }

    fn on_signal(&mut self, signal: std::result::Result<HostSignal, broadcast::error::RecvError>) {
        match signal {
            Ok(HostSignal::NavigationStart { to }) => {
                debug!(to = %to, "navigation starting");
                if self.config.flush_on_navigation {
                    self.attempt_save(Trigger::Navigation);
                }
            }
            Ok(HostSignal::Unload) => {
                debug!("unload requested");
                if self.config.flush_on_unload {
                    self.attempt_save(Trigger::Unload);
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // The dropped signals were navigations or unloads; flush for
                // whichever of the two is enabled, unload first.
                warn!(missed, "host signal stream lagged; flushing");
                if self.config.flush_on_unload {
                    self.attempt_save(Trigger::Unload);
                } else if self.config.flush_on_navigation {
                    self.attempt_save(Trigger::Navigation);
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("host signal stream closed");
                self.signals = None;
            }
        }
    }

    fn on_tick(&mut self) {
        if self.config.enabled {
            self.attempt_save(Trigger::Interval);
        } else {
            trace!("interval saves disabled");
        }
    }

    /// Dispatch a save if the document is dirty and saves are allowed.
    fn attempt_save(&mut self, trigger: Trigger) -> bool {
        if !self.tracker.should_save() {
            trace!(
                %trigger,
                dirty = self.tracker.is_dirty(),
                eligible = self.tracker.is_eligible(),
                "save skipped"
            );
            return false;
        }

        let content = match self.document.encode_state() {
            Ok(content) => content,
            Err(e) => {
                // Nothing was dispatched, so the episode stays dirty.
                error!(%trigger, error = %e, "failed to encode document");
                self.last_error = Some(e.user_message());
                self.emit(SaveEvent::Failed {
                    trigger,
                    dispatch: None,
                    attempts: 0,
                    message: e.to_string(),
                });
                return false;
            }
        };

        if !self.tracker.begin_save() {
            return false;
        }
        self.next_dispatch += 1;
        let dispatch = self.next_dispatch;
        let bytes = content.len();

        info!(%trigger, dispatch, bytes, "dispatching save");
        self.emit(SaveEvent::Dispatched {
            trigger,
            dispatch,
            bytes,
        });

        let store = Arc::clone(&self.store);
        let handle = self.handle.clone();
        let retry = self.config.retry.clone();
        let finished = self.finished_tx.clone();
        let events = self.events.clone();
        let hooks = Arc::clone(&self.hooks);
        tokio::spawn(
            async move {
                let (attempts, result) = save_with_retry(&*store, &handle, content, &retry).await;
                let outcome = SaveFinished {
                    trigger,
                    dispatch,
                    attempts,
                    result,
                };
                if let Err(mpsc::error::SendError(outcome)) = finished.send(outcome) {
                    debug!(dispatch, "autosave already stopped; reporting save outcome");
                    let _ = events.send(outcome.announce(&hooks));
                }
            }
            .in_current_span(),
        );
        true
    }

    fn on_save_finished(&mut self, finished: SaveFinished) {
        match &finished.result {
            Ok(receipt) => {
                self.tracker.save_complete();
                self.last_revision = Some(receipt.revision);
                self.last_error = None;
            }
            Err(e) => {
                self.tracker.save_failed();
                self.last_error = Some(e.user_message());
            }
        }
        let event = finished.announce(&self.hooks);
        self.emit(event);
    }

    fn teardown(&mut self) -> TeardownReport {
        self.signals = None;
        if let Some(mut updates) = self.updates.take() {
            // Edits that raced the shutdown still count.
            loop {
                match updates.try_recv() {
                    Ok(update) if update.origin.is_local() => self.on_local_update(),
                    Ok(_) => {}
                    Err(broadcast::error::TryRecvError::Lagged(_)) => {
                        self.catch_up_local_edits();
                    }
                    Err(_) => break,
                }
            }
        }

        let final_flush = self.attempt_save(Trigger::Teardown);

        // Saves finishing from here on report through their own task.
        self.finished_rx.close();
        while let Ok(finished) = self.finished_rx.try_recv() {
            self.on_save_finished(finished);
        }

        let report = TeardownReport {
            final_flush,
            in_flight: self.tracker.in_flight(),
        };
        self.publish_status();
        info!(
            final_flush,
            in_flight = report.in_flight,
            dispatched = self.tracker.dispatched(),
            "autosave stopped"
        );
        report
    }

    fn emit(&self, event: SaveEvent) {
        let _ = self.events.send(event);
    }

    fn publish_status(&self) {
        let status = status_of(&self.tracker, self.last_revision, self.last_error.clone());
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

fn status_of(
    tracker: &DirtyTracker,
    last_revision: Option<u64>,
    last_error: Option<String>,
) -> AutosaveStatus {
    AutosaveStatus {
        dirty: tracker.is_dirty(),
        eligible: tracker.is_eligible(),
        in_flight: tracker.in_flight(),
        local_updates: tracker.local_updates(),
        dispatched: tracker.dispatched(),
        completed: tracker.completed(),
        failed: tracker.failed(),
        last_revision,
        last_error,
    }
}

impl SaveFinished {
    /// Log the outcome, run post-save hooks on success, and turn it into an
    /// event.
    fn announce(self, hooks: &[Arc<dyn SaveHook>]) -> SaveEvent {
        let Self {
            trigger,
            dispatch,
            attempts,
            result,
        } = self;

        match result {
            Ok(receipt) => {
                info!(
                    %trigger,
                    dispatch,
                    revision = receipt.revision,
                    digest = receipt.short_digest(),
                    "save acknowledged"
                );
                for hook in hooks {
                    hook.after_save(&receipt);
                }
                SaveEvent::Saved {
                    trigger,
                    dispatch,
                    attempts,
                    receipt,
                }
            }
            Err(e) => {
                error!(%trigger, dispatch, attempts, error = %e, "save failed");
                SaveEvent::Failed {
                    trigger,
                    dispatch: Some(dispatch),
                    attempts,
                    message: e.to_string(),
                }
            }
        }
    }
}

async fn recv_or_pending<T: Clone>(
    rx: &mut Option<broadcast::Receiver<T>>,
) -> std::result::Result<T, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Persist `content`, retrying transient failures per `retry`.
async fn save_with_retry<S: DocumentStore + ?Sized>(
    store: &S,
    handle: &DocumentHandle,
    content: Vec<u8>,
    retry: &RetryPolicy,
) -> (u32, Result<SaveReceipt>) {
    let max_attempts = retry.max_attempts();
    let mut attempt = 1;
    loop {
        match store.save(handle, content.clone()).await {
            Ok(receipt) => return (attempt, Ok(receipt)),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %e, "save attempt failed; retrying");
                time::sleep(retry.backoff()).await;
                attempt += 1;
            }
            Err(e) => return (attempt, Err(e)),
        }
    }
}
