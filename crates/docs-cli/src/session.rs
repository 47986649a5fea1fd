//! Replay an editing session against a live coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use docs_autosave::{
    AutoSaveConfig, AutosaveCoordinator, AutosaveStatus, DocumentHandle, DocumentStore,
    HostSignals, MemoryDocument, SaveEvent, SaveHook, SaveReceipt, TeardownReport, ThrottledHook,
    Trigger,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::oneshot;
use tokio::time::{self, Instant};
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::logging::redact_content;
use crate::script::{ScriptStep, Step};

/// Minimum spacing between re-index requests for one document.
pub const REINDEX_WINDOW: Duration = Duration::from_secs(30);

/// How long a save dispatched at teardown may take before the timeline is
/// closed without its outcome.
pub const TEARDOWN_GRACE: Duration = Duration::from_secs(5);

/// Inputs for one replay.
pub struct Session<S: ?Sized> {
    pub handle: DocumentHandle,
    pub config: AutoSaveConfig,
    pub store: Arc<S>,
    /// Initial save eligibility.
    pub eligible: bool,
    /// Document text before the first step.
    pub initial: String,
}

/// A save event and when it was observed, relative to the session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub at: Duration,
    pub event: SaveEvent,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub handle: DocumentHandle,
    pub timeline: Vec<TimelineEntry>,
    /// Coordinator state after teardown, including the outcome of the final
    /// save when it arrived within [`TEARDOWN_GRACE`].
    pub status: AutosaveStatus,
    pub teardown: TeardownReport,
    pub final_bytes: usize,
    pub reindex_requests: usize,
}

/// Counts re-index requests a search indexer would receive.
#[derive(Debug, Default)]
pub struct ReindexQueue {
    queued: AtomicUsize,
}

impl ReindexQueue {
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }
}

impl SaveHook for ReindexQueue {
    fn after_save(&self, receipt: &SaveReceipt) {
        self.queued.fetch_add(1, Ordering::Relaxed);
        info!(
            handle = %receipt.handle,
            revision = receipt.revision,
            "queued search re-index"
        );
    }
}

/// Run `steps` against a fresh coordinator and collect what it saved.
///
/// Teardown happens once every save dispatched by the script has been
/// acknowledged, so the timeline ends with the teardown flush (if any) and
/// its outcome.
pub async fn replay<S>(session: Session<S>, steps: &[ScriptStep]) -> Result<SessionReport>
where
    S: DocumentStore + ?Sized + 'static,
{
    let span = info_span!("replay", handle = %session.handle, steps = steps.len());
    async move {
        let document = Arc::new(MemoryDocument::new(session.initial));
        let signals = HostSignals::new();
        let reindex = Arc::new(ThrottledHook::new(ReindexQueue::default(), REINDEX_WINDOW));

        let coordinator = AutosaveCoordinator::builder(
            session.handle.clone(),
            Arc::clone(&document),
            session.store,
        )
        .signals(&signals)
        .config(session.config)
        .eligible(session.eligible)
        .on_saved(Arc::clone(&reindex) as Arc<dyn SaveHook>)
        .spawn()
        .context("start autosave coordinator")?;

        let started = Instant::now();
        let (stop, stopped) = oneshot::channel();
        let mut collector = tokio::spawn(collect_timeline(
            coordinator.subscribe_events(),
            started,
            stopped,
        ));

        for ScriptStep { line, step } in steps {
            apply_step(&coordinator, &document, &signals, *line, step).await?;
        }

        let mut status = coordinator.watch_status();
        let mut status = status
            .wait_for(|status| status.in_flight == 0)
            .await
            .context("wait for in-flight saves")?
            .clone();

        let teardown = coordinator.shutdown().await.context("stop autosave")?;
        // The event stream ends once the teardown save has finished.
        let timeline = match time::timeout(TEARDOWN_GRACE, &mut collector).await {
            Ok(timeline) => timeline,
            Err(_) => {
                warn!(
                    grace_ms = TEARDOWN_GRACE.as_millis() as u64,
                    "teardown save still running; closing timeline"
                );
                let _ = stop.send(());
                collector.await
            }
        }
        .context("collect save events")?;
        apply_teardown_outcome(&mut status, &timeline);

        Ok(SessionReport {
            handle: session.handle,
            timeline,
            status,
            teardown,
            final_bytes: document.content().len(),
            reindex_requests: reindex.inner().queued(),
        })
    }
    .instrument(span)
    .await
}

async fn apply_step(
    coordinator: &AutosaveCoordinator,
    document: &MemoryDocument,
    signals: &HostSignals,
    line: usize,
    step: &Step,
) -> Result<()> {
    match step {
        Step::Edit(text) => {
            trace!(line, text = redact_content(text), "local edit");
            document.edit_local(|content| content.push_str(text));
        }
        Step::Remote(text) => {
            trace!(line, text = redact_content(text), "remote merge");
            document.merge_remote(|content| content.push_str(text));
        }
        Step::Wait(duration) => {
            debug!(line, wait_ms = duration.as_millis() as u64, "waiting");
            tokio::time::sleep(*duration).await;
        }
        Step::Navigate(route) => {
            debug!(line, route = %route, "navigation");
            signals.navigate(route.clone());
        }
        Step::Unload => {
            debug!(line, "unload");
            signals.unload();
        }
        Step::Eligible(eligible) => {
            debug!(line, eligible, "eligibility changed");
            coordinator
                .set_eligible(*eligible)
                .with_context(|| format!("line {line}: set eligibility"))?;
        }
        Step::Flush => {
            let dispatched = coordinator
                .flush()
                .await
                .with_context(|| format!("line {line}: flush"))?;
            debug!(line, dispatched, "manual flush");
        }
    }
    // Give the coordinator a turn before the next step.
    tokio::task::yield_now().await;
    Ok(())
}

async fn collect_timeline(
    mut events: broadcast::Receiver<SaveEvent>,
    started: Instant,
    mut stop: oneshot::Receiver<()>,
) -> Vec<TimelineEntry> {
    let mut timeline = Vec::new();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => timeline.push(TimelineEntry {
                    at: started.elapsed(),
                    event,
                }),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "timeline dropped save events");
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut stop => break,
        }
    }
    timeline
}

/// Fold the teardown save into a status taken before teardown.
pub fn apply_teardown_outcome(status: &mut AutosaveStatus, timeline: &[TimelineEntry]) {
    for entry in timeline {
        match &entry.event {
            SaveEvent::Dispatched {
                trigger: Trigger::Teardown,
                ..
            } => {
                status.dirty = false;
                status.dispatched += 1;
            }
            SaveEvent::Saved {
                trigger: Trigger::Teardown,
                receipt,
                ..
            } => {
                status.completed += 1;
                status.last_revision = Some(receipt.revision);
                status.last_error = None;
            }
            SaveEvent::Failed {
                trigger: Trigger::Teardown,
                dispatch,
                message,
                ..
            } => {
                if dispatch.is_some() {
                    status.failed += 1;
                }
                status.last_error = Some(message.clone());
            }
            _ => {}
        }
    }
}
