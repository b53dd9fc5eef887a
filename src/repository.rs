use crate::connectivity::Connectivity;
use crate::error::{MovieError, MovieResult};
use crate::feed::Subscription;
use crate::models::{Collection, ListPage, ListingKind, MovieDetail, MovieSummary};
use crate::store::MovieStore;
use crate::tmdb::CatalogService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Offline-aware access to the movie catalog.
///
/// Mediates between the remote catalog and the three cache collections:
/// listings are fetched when the network is usable and written through to
/// their collection, otherwise served from the last cached snapshot. Full
/// detail records fetched later are propagated into listing caches that
/// already hold the movie.
pub struct MovieRepository {
    catalog: Arc<dyn CatalogService>,
    connectivity: Arc<dyn Connectivity>,
    popular: Arc<dyn MovieStore>,
    now_playing: Arc<dyn MovieStore>,
    saved: Arc<dyn MovieStore>,
}

impl MovieRepository {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        connectivity: Arc<dyn Connectivity>,
        popular: Arc<dyn MovieStore>,
        now_playing: Arc<dyn MovieStore>,
        saved: Arc<dyn MovieStore>,
    ) -> Self {
        Self {
            catalog,
            connectivity,
            popular,
            now_playing,
            saved,
        }
    }

    fn store(&self, collection: Collection) -> &Arc<dyn MovieStore> {
        match collection {
            Collection::Popular => &self.popular,
            Collection::NowPlaying => &self.now_playing,
            Collection::Saved => &self.saved,
        }
    }

    /// Runs the connectivity check on the blocking pool; a probe may wait on
    /// DNS and a TCP handshake.
    pub async fn is_online(&self) -> bool {
        let connectivity = self.connectivity.clone();
        match tokio::task::spawn_blocking(move || connectivity.is_reachable()).await {
            Ok(online) => online,
            Err(e) => {
                warn!("Connectivity check did not complete: {}", e);
                false
            }
        }
    }

    /// Fetches one listing page.
    ///
    /// `Ok(Some(page))` is data (remote, or a single synthesized page from the
    /// cache when remote is skipped or unreachable). `Ok(None)` means nothing
    /// is cached. A failed remote call is returned as `RemoteFailure` without
    /// consulting the cache.
    pub async fn fetch_listing(
        &self,
        kind: ListingKind,
        page: u32,
        allow_remote: bool,
    ) -> MovieResult<Option<ListPage>> {
        if allow_remote && self.is_online().await {
            return self.fetch_remote_listing(kind, page).await.map(Some);
        }
        debug!(%kind, page, allow_remote, "Serving listing from cache");
        self.cached_listing(kind)
    }

    async fn fetch_remote_listing(&self, kind: ListingKind, page: u32) -> MovieResult<ListPage> {
        let result = match kind {
            ListingKind::Popular => self.catalog.list_popular(page).await,
            ListingKind::NowPlaying => self.catalog.list_now_playing(page).await,
        };
        let response = result.map_err(|e| {
            warn!("Failed to fetch {} page {}: {:#}", kind, page, e);
            MovieError::remote(e)
        })?;

        if response.items.is_empty() {
            debug!(%kind, page, "Catalog returned an empty page; cache left as is");
            return Ok(response);
        }

        let records: Vec<MovieDetail> = response
            .items
            .iter()
            .map(MovieDetail::from_summary)
            .collect();
        let store = self.store(kind.collection());
        if page == 1 {
            store.replace_all(&records)?;
        } else {
            store.upsert_many(&records)?;
        }
        info!(
            "Fetched {} page {} ({} movies, {} pages total)",
            kind,
            page,
            response.items.len(),
            response.total_pages
        );
        Ok(response)
    }

    fn cached_listing(&self, kind: ListingKind) -> MovieResult<Option<ListPage>> {
        let snapshot = self.store(kind.collection()).observe_all().borrow().clone();
        if snapshot.is_empty() {
            return Ok(None);
        }
        Ok(Some(ListPage::from_cache(&snapshot)))
    }

    pub fn has_cached(&self, kind: ListingKind) -> MovieResult<bool> {
        Ok(self.store(kind.collection()).count()? > 0)
    }

    pub fn observe_listing(&self, kind: ListingKind) -> Subscription<MovieSummary> {
        self.observe(kind.collection())
    }

    /// Saved movies, most recently saved first.
    pub fn observe_saved(&self) -> Subscription<MovieSummary> {
        self.observe(Collection::Saved)
    }

    fn observe(&self, collection: Collection) -> Subscription<MovieSummary> {
        Subscription::new(
            self.store(collection).observe_all(),
            MovieDetail::to_summary,
            CancellationToken::new(),
        )
    }

    /// Fetches full details for a movie.
    ///
    /// Online, a fresh record overwrites the copy in the popular and
    /// now-playing caches when they already hold the id. Offline, the record
    /// is read from the `source` collection; an unknown source is absent and
    /// an id missing from a known source is `CacheMiss`.
    pub async fn fetch_detail(
        &self,
        id: i64,
        source: Option<Collection>,
    ) -> MovieResult<Option<MovieDetail>> {
        let online = self.is_online().await;
        self.fetch_detail_with(id, source, online).await
    }

    /// `fetch_detail` against a connectivity answer the caller already has.
    pub(crate) async fn fetch_detail_with(
        &self,
        id: i64,
        source: Option<Collection>,
        online: bool,
    ) -> MovieResult<Option<MovieDetail>> {
        if !online {
            let Some(collection) = source else {
                debug!("No cache source for movie {} while offline", id);
                return Ok(None);
            };
            return match self.store(collection).get(id)? {
                Some(detail) => Ok(Some(detail)),
                None => Err(MovieError::CacheMiss),
            };
        }

        let detail = self.catalog.get_detail(id).await.map_err(|e| {
            warn!("Failed to fetch details for movie {}: {:#}", id, e);
            MovieError::remote(e)
        })?;
        if let Some(detail) = &detail {
            self.propagate_detail(detail)?;
        }
        Ok(detail)
    }

    fn propagate_detail(&self, detail: &MovieDetail) -> MovieResult<()> {
        for collection in [Collection::Popular, Collection::NowPlaying] {
            let store = self.store(collection);
            if store.exists(detail.id)? {
                store.upsert(detail)?;
                debug!(id = detail.id, %collection, "Refreshed cached movie with full details");
            }
        }
        Ok(())
    }

    /// Reads a record straight from one cache collection.
    pub fn cached_detail(&self, id: i64, collection: Collection) -> MovieResult<Option<MovieDetail>> {
        Ok(self.store(collection).get(id)?)
    }

    pub async fn search(&self, query: &str, page: u32) -> MovieResult<ListPage> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MovieError::InvalidInput("search query is blank".to_string()));
        }
        if !self.is_online().await {
            return Err(MovieError::NetworkUnavailable);
        }
        self.catalog.search(query, page).await.map_err(|e| {
            warn!("Search for '{}' failed: {:#}", query, e);
            MovieError::remote(e)
        })
    }

    pub fn is_saved(&self, id: i64) -> MovieResult<bool> {
        Ok(self.saved.exists(id)?)
    }

    pub fn save(&self, detail: &MovieDetail) -> MovieResult<()> {
        self.saved.upsert(&detail.clone().touched())?;
        Ok(())
    }

    pub fn remove_saved(&self, id: i64) -> MovieResult<()> {
        self.saved.delete(id)?;
        Ok(())
    }

    /// Flips saved membership and returns the state observed afterwards.
    ///
    /// Membership is re-read after the mutation rather than inverted, so a
    /// concurrent toggle on the same id is reflected in the result.
    pub fn toggle_save(&self, detail: &MovieDetail) -> MovieResult<bool> {
        if self.saved.exists(detail.id)? {
            self.remove_saved(detail.id)?;
        } else {
            self.save(detail)?;
        }
        let saved = self.saved.exists(detail.id)?;
        info!(id = detail.id, saved, "Toggled saved movie");
        Ok(saved)
    }
}
