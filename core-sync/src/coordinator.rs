//! # Sync Coordinator
//!
//! Drives a sync run across every registered source.
//!
//! ## Overview
//!
//! Sources are visited in id order. For each one the coordinator:
//! 1. Opens a transaction and runs the table mergers in dependency order
//!    (artists, albums, songs, playlists, playlist memberships)
//! 2. Advances the source's watermark and commits
//! 3. Recomputes denormalized counts and removes files of deleted rows
//! 4. Records the outcome in the sync-run history
//!
//! A source either commits as a whole or not at all. Transient network
//! failures are retried with exponential backoff, each attempt in a fresh
//! transaction; when the retries run out the source is abandoned with a
//! network error and the next source still runs. Any other failure aborts
//! only the current source.
//!
//! ## Cancellation
//!
//! [`SyncCoordinator::stop_sync`] cancels the run's token and fires the
//! catalog's cancel trigger. The worker notices between mergers and pages;
//! an in-flight remote read is abandoned right away. The current source rolls
//! back, sources already committed stay committed, and no further source is
//! started.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SyncCoordinator};
//!
//! let coordinator = SyncCoordinator::new(SyncConfig::default(), pool, catalog)
//!     .with_observer(observer);
//!
//! coordinator.start_sync();
//! // ...
//! coordinator.stop_sync();
//! ```

use crate::{
    context::{SyncContext, SyncStats, SyncStatus},
    entity::{
        AlbumEntity, ArtistEntity, EntityDescriptor, MergeEnv, PlaylistEntity,
        PlaylistSongEntity, SongEntity,
    },
    history::{NewSyncRun, SqliteSyncRunRepository, SyncRunRepository},
    merger::TableMerger,
    observer::{EventBusObserver, NoopObserver, SyncObserver},
    Result, SyncError,
};
use bridge_traits::{EntityKind, RemoteCatalog, RemotePage, SourceEndpoint};
use core_async::time::{sleep, timeout, unix_timestamp};
use core_library::models::{Source, SourceId};
use core_library::repositories::source::record_sync;
use core_library::repositories::{SourceRepository, SqliteSourceRepository};
use core_library::{CountMaintainer, FileReaper, MediaPaths, PendingFiles};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, SourceOutcome, SyncOutcome};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Sync coordinator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Retries per source after the first attempt, for transient errors
    pub max_retries: u32,

    /// Base of the exponential backoff between attempts
    pub retry_backoff: Duration,

    /// Deadline for a single remote page request
    pub request_timeout: Duration,

    /// Records requested per remote page
    pub page_size: u32,

    /// Leading articles split off artist and album names
    pub name_prefixes: Vec<String>,

    /// Progress is published every this many items
    pub progress_interval: u64,

    /// Where files of deleted rows live. `None` leaves files alone.
    pub media_paths: Option<MediaPaths>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            request_timeout: Duration::from_secs(60),
            page_size: 500,
            name_prefixes: vec!["The ".to_string()],
            progress_interval: 25,
            media_paths: None,
        }
    }
}

impl SyncConfig {
    pub fn from_core(config: &CoreConfig) -> Self {
        let sync = &config.sync;
        Self {
            max_retries: sync.max_retries,
            retry_backoff: sync.retry_backoff,
            request_timeout: sync.request_timeout,
            page_size: sync.page_size,
            name_prefixes: sync.name_prefixes.clone(),
            progress_interval: sync.progress_interval,
            media_paths: Some(MediaPaths::new(&config.cache_dir, &config.artwork_dir)),
        }
    }

    /// Delay before attempt `attempt + 1`
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_backoff.saturating_mul(factor)
    }
}

/// How one source ended within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source_id: SourceId,
    pub outcome: SourceOutcome,
    pub stats: SyncStats,
    pub tries: u32,
    pub error: Option<String>,
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub stats: SyncStats,
    pub newest_sync_time: i64,
    pub sources: Vec<SourceReport>,
}

/// Changes of one source, committed but not yet post-processed
struct AppliedSource {
    stats: SyncStats,
    newest_sync_time: Option<i64>,
    pending: PendingFiles,
}

/// Sync coordinator for orchestrating synchronization
#[derive(Clone)]
pub struct SyncCoordinator {
    config: SyncConfig,

    /// Database connection pool
    db_pool: SqlitePool,

    /// Network collaborator
    catalog: Arc<dyn RemoteCatalog>,

    /// Presentation layer notifications
    observer: Arc<dyn SyncObserver>,

    /// Removes files of deleted rows
    reaper: Option<Arc<FileReaper>>,

    /// Library maintenance events
    event_bus: Option<EventBus>,

    history: Arc<dyn SyncRunRepository>,

    /// Context of the run in progress, if any
    active: Arc<Mutex<Option<Arc<SyncContext>>>>,
}

impl SyncCoordinator {
    pub fn new(config: SyncConfig, db_pool: SqlitePool, catalog: Arc<dyn RemoteCatalog>) -> Self {
        let history = Arc::new(SqliteSyncRunRepository::new(db_pool.clone()));
        Self {
            config,
            db_pool,
            catalog,
            observer: Arc::new(NoopObserver),
            reaper: None,
            event_bus: None,
            history,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Wire a coordinator from the core configuration: file removal through
    /// the configured file-system bridge and notifications on the event bus.
    pub fn from_core(
        core: &CoreConfig,
        db_pool: SqlitePool,
        catalog: Arc<dyn RemoteCatalog>,
        event_bus: EventBus,
    ) -> Self {
        let config = SyncConfig::from_core(core);
        let observer = Arc::new(EventBusObserver::new(
            event_bus.clone(),
            config.progress_interval,
        ));
        let reaper = config
            .media_paths
            .clone()
            .map(|paths| Arc::new(FileReaper::new(core.file_system.clone(), paths)));

        let mut coordinator = Self::new(config, db_pool, catalog)
            .with_observer(observer)
            .with_event_bus(event_bus);
        coordinator.reaper = reaper;
        coordinator
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_file_reaper(mut self, reaper: Arc<FileReaper>) -> Self {
        self.reaper = Some(reaper);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn history(&self) -> Arc<dyn SyncRunRepository> {
        Arc::clone(&self.history)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start a sync in the background. Does nothing if one is running.
    ///
    /// Returns `true` if a new run was started.
    pub fn start_sync(&self) -> bool {
        let Some(ctx) = self.claim() else {
            debug!("Sync already running, start request ignored");
            return false;
        };

        let coordinator = self.clone();
        core_async::task::spawn(async move {
            if let Err(e) = coordinator.run(ctx).await {
                error!(error = %e, "Sync task failed");
            }
            coordinator.release();
        });

        true
    }

    /// Run a sync to completion on the calling task.
    ///
    /// # Errors
    ///
    /// Returns `SyncInProgress` if another run is active, or an error if the
    /// source list could not be read. Per-source failures are reported in
    /// the returned [`SyncReport`], not as errors.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        let ctx = self.claim().ok_or(SyncError::SyncInProgress)?;
        let result = self.run(ctx).await;
        self.release();
        result
    }

    /// Request cooperative cancellation of the running sync.
    ///
    /// Returns `false` if nothing was running.
    pub fn stop_sync(&self) -> bool {
        let ctx = self.lock_active().clone();
        match ctx {
            Some(ctx) => {
                info!("Cancelling sync");
                ctx.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.lock_active().is_some()
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<Arc<SyncContext>>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn claim(&self) -> Option<Arc<SyncContext>> {
        let mut active = self.lock_active();
        if active.is_some() {
            return None;
        }
        let ctx = Arc::new(SyncContext::new());
        *active = Some(Arc::clone(&ctx));
        Some(ctx)
    }

    fn release(&self) {
        self.lock_active().take();
    }

    #[instrument(skip(self, ctx))]
    async fn run(&self, ctx: Arc<SyncContext>) -> Result<SyncReport> {
        ctx.start()?;

        let sources = match SqliteSourceRepository::new(self.db_pool.clone()).list().await {
            Ok(sources) => sources,
            Err(e) => {
                ctx.set_failed();
                ctx.finish()?;
                return Err(e.into());
            }
        };

        info!(sources = sources.len(), "Starting sync");
        self.observer.begin_sync(sources.len() as u32);

        let mut reports = Vec::with_capacity(sources.len());
        for source in &sources {
            if ctx.is_canceled() {
                info!(source_id = %source.id, "Sync cancelled, skipping remaining sources");
                break;
            }
            reports.push(self.sync_source(&ctx, source).await);
        }

        let status = ctx.finish()?;
        let stats = ctx.stats();
        let newest_sync_time = ctx.newest_sync_time();
        self.observer
            .end_sync(sync_outcome(status), stats, newest_sync_time);

        info!(
            status = %status,
            inserted = stats.inserted,
            updated = stats.updated,
            deleted = stats.deleted,
            newest_sync_time,
            "Sync finished"
        );

        Ok(SyncReport {
            status,
            stats,
            newest_sync_time,
            sources: reports,
        })
    }

    #[instrument(skip(self, ctx, source), fields(source_id = %source.id, host = %source.host))]
    async fn sync_source(&self, ctx: &SyncContext, source: &Source) -> SourceReport {
        let source_id = source.id;
        let started_at = unix_timestamp();

        self.observer.begin_source(source_id);
        ctx.reset_progress();
        ctx.reset_tries();
        ctx.set_trigger(self.catalog.cancel_trigger());

        let result = self.sync_source_with_retry(ctx, source).await;
        ctx.clear_trigger();

        let (outcome, stats, newest_sync_time, error) = match result {
            Ok(applied) => {
                ctx.add_stats(applied.stats);
                if let Some(newest) = applied.newest_sync_time {
                    ctx.observe_sync_time(newest);
                }
                self.after_commit(applied.pending).await;
                info!(
                    inserted = applied.stats.inserted,
                    updated = applied.stats.updated,
                    deleted = applied.stats.deleted,
                    tries = ctx.tries(),
                    "Source committed"
                );
                (
                    SourceOutcome::Committed,
                    applied.stats,
                    applied.newest_sync_time.unwrap_or(0),
                    None,
                )
            }
            Err(SyncError::Cancelled) => {
                info!("Source rolled back after cancellation");
                (SourceOutcome::Canceled, SyncStats::default(), 0, None)
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, tries = ctx.tries(), "Source abandoned after network errors");
                ctx.set_network_error();
                (
                    SourceOutcome::NetworkError,
                    SyncStats::default(),
                    0,
                    Some(e.to_string()),
                )
            }
            Err(e) => {
                warn!(error = %e, "Source rolled back");
                ctx.set_failed();
                (
                    SourceOutcome::Failed,
                    SyncStats::default(),
                    0,
                    Some(e.to_string()),
                )
            }
        };

        let run = NewSyncRun {
            source_id,
            outcome,
            tries: ctx.tries(),
            stats,
            newest_sync_time,
            error_message: error.clone(),
            started_at,
            finished_at: unix_timestamp(),
        };
        if let Err(e) = self.history.record(&run).await {
            warn!(error = %e, "Failed to record sync run");
        }

        self.observer.end_source(source_id, outcome, stats);

        SourceReport {
            source_id,
            outcome,
            stats,
            tries: run.tries,
            error,
        }
    }

    async fn sync_source_with_retry(
        &self,
        ctx: &SyncContext,
        source: &Source,
    ) -> Result<AppliedSource> {
        let endpoint = SourceEndpoint {
            source_id: source.id.get(),
            host: source.host.clone(),
            port: u16::try_from(source.port)
                .map_err(|_| SyncError::Remote(format!("invalid port {}", source.port)))?,
            last_sync_time: source.last_sync_time,
        };

        loop {
            let attempt = ctx.add_try();
            match self.attempt_source(ctx, &endpoint, source.id).await {
                Err(e)
                    if e.is_transient()
                        && attempt <= self.config.max_retries
                        && !ctx.is_canceled() =>
                {
                    let backoff = self.config.backoff(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Transient failure, retrying source"
                    );
                    if ctx.token().run_until_cancelled(sleep(backoff)).await.is_none() {
                        return Err(SyncError::Cancelled);
                    }
                }
                result => return result,
            }
        }
    }

    /// One attempt at a source. Dropping the transaction on any error rolls
    /// the attempt back.
    async fn attempt_source(
        &self,
        ctx: &SyncContext,
        endpoint: &SourceEndpoint,
        source_id: SourceId,
    ) -> Result<AppliedSource> {
        let mut tx = self.db_pool.begin().await?;
        let env = MergeEnv {
            source_id,
            name_prefixes: self.config.name_prefixes.clone(),
            reaper: self.reaper.clone(),
        };
        let mut pending = PendingFiles::new();
        let mut stats = SyncStats::default();
        let mut newest_sync_time: Option<i64> = None;
        let mut processed = 0u64;

        for kind in EntityKind::MERGE_ORDER {
            if ctx.is_canceled() {
                return Err(SyncError::Cancelled);
            }

            let mut run = MergeRun {
                ctx,
                env: &env,
                endpoint,
                pending: &mut pending,
                processed: &mut processed,
            };
            let (merged, newest) = match kind {
                EntityKind::Artist => self.merge_kind(ArtistEntity, &mut tx, &mut run).await?,
                EntityKind::Album => self.merge_kind(AlbumEntity, &mut tx, &mut run).await?,
                EntityKind::Song => self.merge_kind(SongEntity, &mut tx, &mut run).await?,
                EntityKind::Playlist => self.merge_kind(PlaylistEntity, &mut tx, &mut run).await?,
                EntityKind::PlaylistSong => {
                    self.merge_kind(PlaylistSongEntity, &mut tx, &mut run)
                        .await?
                }
            };

            debug!(
                entity = %kind,
                inserted = merged.inserted,
                updated = merged.updated,
                deleted = merged.deleted,
                "Merged entity"
            );
            stats += merged;
            newest_sync_time = newest_sync_time.max(newest);
        }

        if ctx.is_canceled() {
            return Err(SyncError::Cancelled);
        }

        record_sync(&mut tx, source_id, newest_sync_time.unwrap_or(0)).await?;
        tx.commit().await?;

        Ok(AppliedSource {
            stats,
            newest_sync_time,
            pending,
        })
    }

    async fn merge_kind<D: EntityDescriptor>(
        &self,
        descriptor: D,
        conn: &mut SqliteConnection,
        run: &mut MergeRun<'_>,
    ) -> Result<(SyncStats, Option<i64>)> {
        let mut merger = TableMerger::begin(descriptor, conn, run.env.source_id).await?;

        while !merger.is_finished() {
            if run.ctx.is_canceled() {
                return Err(SyncError::Cancelled);
            }

            let page = self
                .fetch_page(
                    run.ctx,
                    merger.descriptor().fetch(
                        self.catalog.as_ref(),
                        run.endpoint,
                        merger.cursor(),
                        self.config.page_size,
                    ),
                )
                .await?;

            let base = *run.processed;
            let count = base + page.records.len() as u64;
            let ctx = run.ctx;
            let source_id = run.env.source_id;
            let observer = &self.observer;

            merger
                .merge_page(conn, run.env, page, run.pending, &mut |index, _| {
                    let (index, count) = ctx.advance_progress(base + index as u64, count);
                    observer.update_progress(source_id, index, count);
                })
                .await?;
            *run.processed = count;
        }

        Ok((merger.stats(), merger.newest_sync_time()))
    }

    /// Await a remote page, bounded by the request timeout and abandoned as
    /// soon as the run is cancelled.
    async fn fetch_page<T>(
        &self,
        ctx: &SyncContext,
        fetch: impl Future<Output = Result<RemotePage<T>>>,
    ) -> Result<RemotePage<T>> {
        match ctx
            .token()
            .run_until_cancelled(timeout(self.config.request_timeout, fetch))
            .await
        {
            None => Err(SyncError::Cancelled),
            Some(Err(_)) => Err(SyncError::Timeout(self.config.request_timeout)),
            Some(Ok(result)) => result,
        }
    }

    /// Post-commit maintenance. Failures here are logged: the merged rows
    /// are already durable and both passes converge on the next run.
    async fn after_commit(&self, pending: PendingFiles) {
        match CountMaintainer::new(self.db_pool.clone()).run().await {
            Ok(report) => self.emit(LibraryEvent::CountsAdjusted {
                rows_changed: report.rows_changed(),
            }),
            Err(e) => warn!(error = %e, "Count maintenance failed"),
        }

        if let Some(reaper) = &self.reaper {
            if !pending.is_empty() {
                let report = reaper.reap(pending).await;
                self.emit(LibraryEvent::FilesReclaimed {
                    removed: report.removed,
                    failed: report.failed,
                });
            }
        }
    }

    fn emit(&self, event: LibraryEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Library(event)).ok();
        }
    }
}

/// Per-source state threaded through the mergers of one attempt
struct MergeRun<'a> {
    ctx: &'a SyncContext,
    env: &'a MergeEnv,
    endpoint: &'a SourceEndpoint,
    pending: &'a mut PendingFiles,
    /// Remote records handled so far in this attempt
    processed: &'a mut u64,
}

fn sync_outcome(status: SyncStatus) -> SyncOutcome {
    match status {
        SyncStatus::Completed => SyncOutcome::Completed,
        SyncStatus::Canceled => SyncOutcome::Canceled,
        _ => SyncOutcome::Failed,
    }
}
