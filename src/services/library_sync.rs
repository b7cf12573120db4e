use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::library::{LibraryStore, Track, TrackNormalizer};
use crate::ports::spotify::SpotifyLibraryApi;
use crate::spotify_rs::types::SpotifyUser;

/// Largest page the saved-tracks endpoint serves.
pub const PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub page_size: u32,
    /// Country code sent with page requests. The probe never carries one.
    pub market: Option<String>,
    /// Cap on concurrently running page requests. `None` issues every page at once.
    pub max_in_flight: Option<usize>,
    pub probe_timeout: Duration,
    pub page_timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            market: None,
            max_in_flight: None,
            probe_timeout: Duration::from_secs(10),
            page_timeout: Duration::from_secs(10),
        }
    }
}

/// Which request (or item) a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOrigin {
    Profile,
    Probe,
    Page { offset: u32 },
    Item { offset: u32, index: usize },
}

#[derive(Debug)]
pub struct SyncFailure {
    pub origin: FailureOrigin,
    pub error: SyncError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Item count reported by the probe, if it succeeded.
    pub total: Option<u32>,
    pub pages_requested: usize,
    pub tracks: usize,
    pub failures: usize,
}

/// Events posted while a sync runs. Tracks from different pages interleave freely;
/// tracks of one page keep their order. `Finished` is always the last event.
#[derive(Debug)]
pub enum SyncEvent {
    Connected(SpotifyUser),
    Track(Track),
    Failure(SyncFailure),
    Finished(SyncSummary),
}

fn report(events: &UnboundedSender<SyncEvent>, origin: FailureOrigin, error: SyncError) {
    tracing::warn!("{:?} failed: {}", origin, error);
    // A closed receiver means nobody is listening anymore; the sync still completes.
    let _ = events.send(SyncEvent::Failure(SyncFailure { origin, error }));
}

/// Offsets of every page needed to cover `total` items.
pub fn page_offsets(total: u32, page_size: u32) -> Vec<u32> {
    (0..total).step_by(page_size.max(1) as usize).collect()
}

#[derive(Debug, Default)]
struct RequestTracker {
    latest: Option<AbortHandle>,
    all: Vec<AbortHandle>,
}

#[derive(Debug, Default)]
struct PageOutcome {
    tracks: usize,
    failures: usize,
}

/// Everything a page task needs, cloned into each spawned task.
struct PageWorker<C> {
    client: Arc<C>,
    normalizer: TrackNormalizer,
    store: LibraryStore,
    events: UnboundedSender<SyncEvent>,
    options: Arc<FetchOptions>,
    permits: Option<Arc<Semaphore>>,
}

impl<C> Clone for PageWorker<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            normalizer: self.normalizer.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
            options: self.options.clone(),
            permits: self.permits.clone(),
        }
    }
}

impl<C: SpotifyLibraryApi> PageWorker<C> {
    async fn run(self, offset: u32) -> PageOutcome {
        let mut outcome = PageOutcome::default();

        let _permit = match &self.permits {
            Some(permits) => match permits.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => {
                    report(
                        &self.events,
                        FailureOrigin::Page { offset },
                        SyncError::Cancelled {
                            operation: format!("page at offset {}", offset),
                        },
                    );
                    outcome.failures += 1;
                    return outcome;
                }
            },
            None => None,
        };

        tracing::debug!("Requesting library page at offset {}", offset);
        let request = self.client.saved_tracks_page(
            offset,
            self.options.page_size,
            self.options.market.clone(),
        );
        let page = match tokio::time::timeout(self.options.page_timeout, request).await {
            Ok(Ok(page)) => page,
            Ok(Err(error)) => {
                report(&self.events, FailureOrigin::Page { offset }, error);
                outcome.failures += 1;
                return outcome;
            }
            Err(_) => {
                report(
                    &self.events,
                    FailureOrigin::Page { offset },
                    SyncError::Timeout {
                        operation: format!("page at offset {}", offset),
                        after: self.options.page_timeout,
                    },
                );
                outcome.failures += 1;
                return outcome;
            }
        };

        if let Some(served) = page.offset.filter(|served| *served != offset) {
            tracing::warn!("Requested page at offset {} but got offset {}", offset, served);
        }
        tracing::debug!(
            "Page at offset {} served {} items (limit {:?})",
            offset,
            page.items.len(),
            page.limit
        );

        let mut tracks = Vec::with_capacity(page.items.len());
        for (index, item) in page.items.iter().enumerate() {
            match self.normalizer.normalize_item(item) {
                Ok(track) => tracks.push(track),
                Err(error) => {
                    report(
                        &self.events,
                        FailureOrigin::Item { offset, index },
                        error.into(),
                    );
                    outcome.failures += 1;
                }
            }
        }

        // One lock per page keeps its tracks contiguous in the store.
        self.store.extend(tracks.iter().cloned());
        for track in tracks {
            let _ = self.events.send(SyncEvent::Track(track));
            outcome.tracks += 1;
        }

        tracing::debug!(
            "Library page at offset {} done: {} tracks, {} failures",
            offset,
            outcome.tracks,
            outcome.failures
        );
        outcome
    }
}

/// Two-phase library download: a `limit=1` probe learns the total, then one
/// request per page runs concurrently.
///
/// Every spawned request is tracked. [`cancel`](Self::cancel) aborts the most recent
/// one, [`cancel_all`](Self::cancel_all) aborts all of them.
pub struct PaginatedLibraryFetcher<C> {
    client: Arc<C>,
    normalizer: TrackNormalizer,
    store: LibraryStore,
    options: Arc<FetchOptions>,
    cancellation: CancellationToken,
    requests: Mutex<RequestTracker>,
}

impl<C: SpotifyLibraryApi + 'static> PaginatedLibraryFetcher<C> {
    pub fn new(
        client: Arc<C>,
        normalizer: TrackNormalizer,
        store: LibraryStore,
        options: FetchOptions,
    ) -> Self {
        Self {
            client,
            normalizer,
            store,
            options: Arc::new(options),
            cancellation: CancellationToken::new(),
            requests: Mutex::new(RequestTracker::default()),
        }
    }

    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    fn requests(&self) -> MutexGuard<'_, RequestTracker> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(&self, handle: AbortHandle) {
        let mut requests = self.requests();
        // `cancel_all` may have drained the tracker after the caller checked.
        if self.is_cancelled() {
            handle.abort();
            return;
        }
        requests.all.retain(|handle| !handle.is_finished());
        requests.latest = Some(handle.clone());
        requests.all.push(handle);
    }

    fn spawn_tracked<T: Send + 'static>(
        &self,
        request: impl Future<Output = T> + Send + 'static,
    ) -> JoinHandle<T> {
        let handle = tokio::spawn(request);
        self.register(handle.abort_handle());
        handle
    }

    /// Aborts the most recently issued request, if it is still running.
    pub fn cancel(&self) {
        if let Some(handle) = self.requests().latest.take() {
            handle.abort();
        }
    }

    /// Aborts every request issued so far and prevents new ones.
    pub fn cancel_all(&self) {
        self.cancellation.cancel();
        let mut requests = self.requests();
        requests.latest = None;
        for handle in requests.all.drain(..) {
            handle.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    fn ensure_active(&self, operation: &str) -> Result<(), SyncError> {
        if self.is_cancelled() {
            return Err(SyncError::Cancelled {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Fetches the profile the token belongs to.
    pub async fn fetch_profile(&self) -> Result<SpotifyUser, SyncError> {
        self.ensure_active("user profile")?;
        let client = self.client.clone();
        let handle = self.spawn_tracked(async move { client.current_user().await });
        handle.await.map_err(|_| SyncError::Cancelled {
            operation: "user profile".into(),
        })?
    }

    /// Learns the library size. Supersedes (cancels) the previous request first.
    pub async fn probe_total(&self) -> Result<u32, SyncError> {
        self.ensure_active("library probe")?;
        self.cancel();

        let client = self.client.clone();
        let probe_timeout = self.options.probe_timeout;
        let handle = self.spawn_tracked(async move {
            match tokio::time::timeout(probe_timeout, client.saved_tracks_page(0, 1, None)).await
            {
                Ok(page) => page.map(|page| page.total),
                Err(_) => Err(SyncError::Timeout {
                    operation: "library probe".into(),
                    after: probe_timeout,
                }),
            }
        });

        let total = tokio::select! {
            joined = handle => joined.map_err(|_| SyncError::Cancelled {
                operation: "library probe".into(),
            })??,
            _ = self.cancellation.cancelled() => {
                return Err(SyncError::Cancelled {
                    operation: "library probe".into(),
                });
            }
        };
        tracing::info!("Library holds {} saved tracks", total);
        Ok(total)
    }

    /// Requests every page covering `total` items, each exactly once, and waits for
    /// all of them. Returns the summary without `total` filled in.
    pub async fn fan_out(&self, total: u32, events: &UnboundedSender<SyncEvent>) -> SyncSummary {
        let mut summary = SyncSummary::default();
        if self.is_cancelled() {
            return summary;
        }

        let worker = PageWorker {
            client: self.client.clone(),
            normalizer: self.normalizer.clone(),
            store: self.store.clone(),
            events: events.clone(),
            options: self.options.clone(),
            permits: self
                .options
                .max_in_flight
                .map(|limit| Arc::new(Semaphore::new(limit.max(1)))),
        };

        let mut pages = JoinSet::new();
        let mut offsets = HashMap::new();
        for offset in page_offsets(total, self.options.page_size) {
            let handle = pages.spawn(worker.clone().run(offset));
            offsets.insert(handle.id(), offset);
            self.register(handle);
            summary.pages_requested += 1;
        }
        tracing::info!(
            "Issued {} page requests (max in flight: {:?})",
            summary.pages_requested,
            self.options.max_in_flight
        );

        while let Some(joined) = pages.join_next_with_id().await {
            match joined {
                Ok((_, outcome)) => {
                    summary.tracks += outcome.tracks;
                    summary.failures += outcome.failures;
                }
                Err(error) => {
                    let offset = offsets.get(&error.id()).copied().unwrap_or_default();
                    let operation = format!("page at offset {}", offset);
                    let error = if error.is_cancelled() {
                        SyncError::Cancelled { operation }
                    } else {
                        SyncError::transport(operation, error)
                    };
                    report(events, FailureOrigin::Page { offset }, error);
                    summary.failures += 1;
                }
            }
        }

        summary
    }

    /// Probe, then fan out. A failed probe ends the run with no pages requested.
    /// Tracks from an earlier run are discarded first.
    pub async fn run(&self, events: &UnboundedSender<SyncEvent>) -> SyncSummary {
        if !self.store.is_empty() {
            tracing::debug!("Discarding {} tracks from the previous run", self.store.len());
            self.store.clear();
        }
        match self.probe_total().await {
            Ok(total) => {
                let mut summary = self.fan_out(total, events).await;
                summary.total = Some(total);
                summary
            }
            Err(error) => {
                report(events, FailureOrigin::Probe, error);
                SyncSummary {
                    failures: 1,
                    ..SyncSummary::default()
                }
            }
        }
    }
}

/// One library sync for one bearer token.
///
/// Owns a fresh [`LibraryStore`]. Dropping the session (or calling
/// [`teardown`](Self::teardown)) aborts every request it issued.
pub struct SyncSession<C: SpotifyLibraryApi + 'static> {
    fetcher: PaginatedLibraryFetcher<C>,
}

impl<C: SpotifyLibraryApi + 'static> SyncSession<C> {
    pub fn new(client: Arc<C>, normalizer: TrackNormalizer, options: FetchOptions) -> Self {
        Self {
            fetcher: PaginatedLibraryFetcher::new(client, normalizer, LibraryStore::new(), options),
        }
    }

    pub fn store(&self) -> LibraryStore {
        self.fetcher.store().clone()
    }

    pub fn teardown(&self) {
        tracing::debug!("Tearing down sync session");
        self.fetcher.cancel_all();
    }

    /// Runs the whole sync, posting events to `events`. The summary is returned
    /// and also posted as the final [`SyncEvent::Finished`].
    pub async fn run(&self, events: UnboundedSender<SyncEvent>) -> SyncSummary {
        let mut profile_failed = false;
        match self.fetcher.fetch_profile().await {
            Ok(user) => {
                tracing::info!(
                    "Connected as {} <{}>",
                    user.display_name.as_deref().unwrap_or("unknown"),
                    user.email.as_deref().unwrap_or("no email")
                );
                let _ = events.send(SyncEvent::Connected(user));
            }
            Err(error) => {
                report(&events, FailureOrigin::Profile, error);
                profile_failed = true;
            }
        }

        let mut summary = self.fetcher.run(&events).await;
        if profile_failed {
            summary.failures += 1;
        }

        tracing::info!(
            "Library sync finished: {} tracks from {} pages, {} failures",
            summary.tracks,
            summary.pages_requested,
            summary.failures
        );
        let _ = events.send(SyncEvent::Finished(summary.clone()));
        summary
    }
}

impl<C: SpotifyLibraryApi + 'static> Drop for SyncSession<C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
