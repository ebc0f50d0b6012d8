//! Dataset lifecycle: `Unloaded → Loading → Ready`, with `Ready → Loading →
//! Ready` for reloads.
//!
//! The published [`Snapshot`] lives in a `watch` channel. Readers clone it out
//! and query it without holding any lock; a load pass replaces it in one
//! `send_replace`. Until the first snapshot exists, readers wait on the
//! channel.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::config::LoaderConfig;
use crate::dataset::{build_dataset, Dataset, Record};
use crate::loader::{load_directory, LoadReport};
use crate::query::{execute, Filters, QueryResult};
use crate::schema::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadState::Unloaded => "unloaded",
            LoadState::Loading => "loading",
            LoadState::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// One published load result. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Starts at 1 and grows with every publish.
    pub version: u64,
    pub dataset: Arc<Dataset>,
    pub report: Arc<LoadReport>,
}

impl Snapshot {
    fn empty(report: LoadReport) -> Self {
        Self {
            version: 0,
            dataset: Arc::new(Dataset::empty()),
            report: Arc::new(report),
        }
    }
}

/// Run the whole pipeline once: load the directory, unify, infer, fill.
/// Blocking; call it from `spawn_blocking`.
pub fn load_dataset(config: &LoaderConfig) -> Result<(Dataset, LoadReport)> {
    let outcome = load_directory(config)?;
    let dataset = build_dataset(&outcome.batches, config);
    Ok((dataset, outcome.report))
}

pub struct DatasetController {
    config: LoaderConfig,
    state: watch::Sender<LoadState>,
    snapshot: watch::Sender<Option<Snapshot>>,
    /// Serializes load passes; queries never take it.
    reload_lock: Mutex<()>,
    started: AtomicBool,
}

impl DatasetController {
    pub fn new(config: LoaderConfig) -> Arc<Self> {
        let (state, _) = watch::channel(LoadState::Unloaded);
        let (snapshot, _) = watch::channel(None);
        Arc::new(Self {
            config,
            state,
            snapshot,
            reload_lock: Mutex::new(()),
            started: AtomicBool::new(false),
        })
    }

    /// Kick off the initial load in the background. Only the first call does
    /// anything; later calls return `false`.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.run_pass().await {
                error!("initial load failed: {:#}", e);
            }
        });
        true
    }

    /// Load the directory again and publish the result. On failure the
    /// previous snapshot stays published and the error is returned.
    pub async fn reload(&self) -> Result<Snapshot> {
        self.started.store(true, Ordering::SeqCst);
        self.run_pass().await
    }

    async fn run_pass(&self) -> Result<Snapshot> {
        let _guard = self.reload_lock.lock().await;
        let previous = self.current();
        self.set_state(LoadState::Loading);

        let config = self.config.clone();
        let result = tokio::task::spawn_blocking(move || load_dataset(&config))
            .await
            .map_err(|e| anyhow!("load task crashed: {}", e))
            .and_then(|r| r);

        match (result, previous) {
            (Ok((dataset, report)), previous) => {
                let version = previous.map_or(1, |p| p.version + 1);
                Ok(self.publish(Snapshot {
                    version,
                    dataset: Arc::new(dataset),
                    report: Arc::new(report),
                }))
            }
            (Err(e), None) => {
                warn!("initial load failed, publishing the empty dataset: {:#}", e);
                let report = LoadReport::failed(&self.config.data_dir, format!("{:#}", e));
                Ok(self.publish(Snapshot {
                    version: 1,
                    ..Snapshot::empty(report)
                }))
            }
            (Err(e), Some(previous)) => {
                warn!(
                    version = previous.version,
                    "reload failed, keeping the previous snapshot: {:#}", e
                );
                self.set_state(LoadState::Ready);
                Err(e.context("reload failed"))
            }
        }
    }

    fn publish(&self, snapshot: Snapshot) -> Snapshot {
        info!(
            version = snapshot.version,
            fields = snapshot.dataset.fields().len(),
            records = snapshot.dataset.len(),
            skipped = snapshot.report.skipped().count(),
            "publishing dataset snapshot"
        );
        self.snapshot.send_replace(Some(snapshot.clone()));
        self.set_state(LoadState::Ready);
        snapshot
    }

    fn set_state(&self, state: LoadState) {
        let old = self.state.send_replace(state);
        if old != state {
            info!("dataset state {} -> {}", old, state);
        }
    }

    pub fn state(&self) -> LoadState {
        *self.state.borrow()
    }

    /// True once a snapshot has been published. Stays true during reloads.
    pub fn is_ready(&self) -> bool {
        self.snapshot.borrow().is_some()
    }

    /// The published snapshot, if any, without waiting.
    pub fn current(&self) -> Option<Snapshot> {
        self.snapshot.borrow().clone()
    }

    /// Wait until a snapshot is published and return it.
    pub async fn ready(&self) -> Snapshot {
        let mut rx = self.snapshot.subscribe();
        let published = rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|s| s.clone());
        // the sender lives in `self`, so waiting only ends with a snapshot
        published.unwrap_or_else(|| Snapshot::empty(LoadReport::new(&self.config.data_dir)))
    }

    pub async fn query_result(&self, filters: &Filters) -> QueryResult {
        let snapshot = self.ready().await;
        execute(&snapshot.dataset, filters)
    }

    pub async fn query(&self, filters: &Filters) -> Vec<Record> {
        self.query_result(filters).await.records
    }

    /// `(name, type)` for every field; empty for the empty dataset.
    pub async fn schema(&self) -> Vec<Field> {
        self.ready().await.dataset.fields().to_vec()
    }
}
