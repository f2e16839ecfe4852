//! # Change Watcher
//!
//! Polls the external state file and reconciles it into the live scene.
//! Each cycle runs Idle -> Reading -> Parsing -> Validating -> Reconciling
//! and back to Idle. Only one cycle runs at a time; a tick that arrives while
//! a cycle is in flight is a no-op.
//!
//! A file that cannot be read, parsed or validated within the retry budget
//! aborts the cycle without touching the store or the diff baseline, and the
//! next tick tries again.

use log::{debug, error, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};

use crate::clock::now_rfc3339;
use crate::config::{RetryPolicy, ServerConfig};
use crate::context::SceneContext;
use crate::error::{SceneError, SceneResult};

use super::diff::{diff, wholesale};
use super::document::SceneDocument;
use super::reconcile::{ReconcileReport, ReconciliationEngine};

/// How a single scan ended
#[derive(Debug)]
pub enum ScanOutcome {
    /// Another cycle was already running
    Busy,

    /// Modification time not newer than the last consumed one
    Unchanged,

    /// The state file does not exist (yet)
    Missing,

    /// Read, parse or validation failed after every retry; nothing applied
    Aborted(SceneError),

    Reconciled(ReconcileReport),
}

/// Diff baseline and detection state, owned by the watcher alone
#[derive(Debug, Default)]
struct WatchState {
    last_seen: Option<SystemTime>,

    /// Last successfully consumed document. Never shared with the store.
    baseline: Option<SceneDocument>,
}

/// Resets the processing flag however the cycle ends, unwinding included
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ChangeWatcher {
    path: PathBuf,
    poll_interval: Duration,
    retry: RetryPolicy,
    write_back: bool,
    engine: ReconciliationEngine,
    processing: AtomicBool,
    state: Mutex<WatchState>,
}

impl ChangeWatcher {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            path: config.state_file.clone(),
            poll_interval: config.poll_interval(),
            retry: config.retry,
            write_back: config.write_back,
            engine: ReconciliationEngine::new(config.animation_duration_ms),
            processing: AtomicBool::new(false),
            state: Mutex::new(WatchState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a baseline has been established by a first successful load
    pub async fn has_baseline(&self) -> bool {
        self.state.lock().await.baseline.is_some()
    }

    /// Run one scan cycle
    pub async fn scan_once(&self, ctx: &SceneContext) -> ScanOutcome {
        let Some(_guard) = ProcessingGuard::acquire(&self.processing) else {
            debug!("State file scan already in progress; skipping tick");
            return ScanOutcome::Busy;
        };

        let modified = match self.modified_time().await {
            Ok(Some(modified)) => modified,
            Ok(None) => {
                debug!("State file {} not found", self.path.display());
                return ScanOutcome::Missing;
            }
            Err(err) => {
                warn!("Could not stat {}: {}", self.path.display(), err);
                return ScanOutcome::Aborted(err);
            }
        };

        let mut state = self.state.lock().await;
        if state.last_seen.is_some_and(|seen| modified <= seen) {
            return ScanOutcome::Unchanged;
        }

        let mut document = match self.load_document().await {
            Ok(document) => document,
            Err(err) => {
                error!(
                    "Giving up on {} after {} attempts: {}; live state left unchanged",
                    self.path.display(),
                    self.retry.attempts.max(1),
                    err
                );
                return ScanOutcome::Aborted(err);
            }
        };

        let changes = match &state.baseline {
            None => {
                info!(
                    "First load of {}: applying {} objects wholesale",
                    self.path.display(),
                    document.object_count()
                );
                wholesale(&document)
            }
            Some(baseline) => diff(baseline, &document),
        };

        let report = if changes.is_empty() {
            debug!("State file touched but content unchanged");
            ReconcileReport::default()
        } else {
            let mut store = ctx.store().lock().await;
            let report = self.engine.apply(&changes, &mut store);

            // Queued under the lock so observers see mutations in commit order
            for notification in &report.notifications {
                ctx.broadcaster().broadcast(notification);
            }

            // An object the store does not hold must diff as a create next time
            for (name, _) in &report.failures {
                if !store.contains(name) && document.forget_object(name) {
                    debug!("'{}' left out of the baseline until it applies", name);
                }
            }

            report
        };

        let last_seen = if self.write_back {
            self.stamp_if_untouched(&document, modified).await
        } else {
            modified
        };

        state.baseline = Some(document);
        state.last_seen = Some(last_seen);

        ScanOutcome::Reconciled(report)
    }

    /// Poll until `shutdown` flips to true. Each cycle runs in its own task so
    /// a panic inside one is logged and polling carries on.
    pub async fn run(self: Arc<Self>, ctx: Arc<SceneContext>, mut shutdown: watch::Receiver<bool>) {
        info!("Watching {} every {:?}", self.path.display(), self.poll_interval);

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let watcher = Arc::clone(&self);
                    let cycle_ctx = Arc::clone(&ctx);
                    let cycle = tokio::spawn(async move { watcher.scan_once(&cycle_ctx).await });

                    match cycle.await {
                        Ok(ScanOutcome::Reconciled(report)) => {
                            debug!("Scan reconciled ({} notifications)", report.notifications.len());
                        }
                        Ok(outcome) => debug!("Scan finished: {:?}", outcome),
                        Err(err) => error!("State file scan failed unexpectedly: {}; polling continues", err),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Change watcher stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn modified_time(&self) -> SceneResult<Option<SystemTime>> {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => Ok(Some(metadata.modified()?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Read, parse and validate with bounded retry
    async fn load_document(&self) -> SceneResult<SceneDocument> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match tokio::fs::read_to_string(&self.path).await {
                Ok(text) => SceneDocument::parse(&text),
                Err(err) => Err(err.into()),
            };

            match result {
                Ok(document) => return Ok(document),
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(
                        "Attempt {}/{} to load {} failed: {}",
                        attempt,
                        attempts,
                        self.path.display(),
                        err
                    );
                    tokio::time::sleep(self.retry.delay()).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Stamp the file unless it was saved again after `modified`. Returns the
    /// modification time to record as consumed. Best effort: a failed
    /// write-back still counts as a consumed edit.
    async fn stamp_if_untouched(&self, document: &SceneDocument, modified: SystemTime) -> SystemTime {
        match self.modified_time().await {
            Ok(Some(current)) if current == modified => {}
            _ => {
                info!(
                    "{} changed again during reconcile; skipping write-back",
                    self.path.display()
                );
                return modified;
            }
        }

        match self.write_stamp(document).await {
            Ok(stamped) => stamped,
            Err(err) => {
                warn!("Could not write last_modified back to {}: {}", self.path.display(), err);
                modified
            }
        }
    }

    /// Rewrite `last_modified` through a temp file and rename. Returns the
    /// file's new modification time.
    async fn write_stamp(&self, document: &SceneDocument) -> SceneResult<SystemTime> {
        let contents = document.render_with_stamp(&now_rfc3339())?;

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        tokio::fs::write(&temp, contents).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        Ok(tokio::fs::metadata(&self.path).await?.modified()?)
    }
}
