use crate::error::MovieError;
use crate::models::{Collection, ListPage, ListingKind, MovieDetail};
use crate::repository::MovieRepository;
use crate::search::SearchDebouncer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub const NO_INTERNET: &str = "No internet connection";
pub const SERVER_ERROR: &str = "Server error, please try again";
pub const UNKNOWN_ERROR: &str = "Something went wrong";

/// What a screen renders: exactly one of these at any time.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenState<T> {
    Loading,
    Success(T),
    Error(String),
}

pub fn user_message(err: &MovieError) -> String {
    match err {
        MovieError::NetworkUnavailable | MovieError::CacheMiss => NO_INTERNET.to_string(),
        MovieError::RemoteFailure(_) => SERVER_ERROR.to_string(),
        MovieError::InvalidInput(msg) => msg.clone(),
        MovieError::Storage(e) => {
            error!("Cache storage failed: {}", e);
            UNKNOWN_ERROR.to_string()
        }
    }
}

/// State publisher for the popular / now-playing list screens.
pub struct ListingScreen {
    repo: Arc<MovieRepository>,
    kind: ListingKind,
    state: watch::Sender<ScreenState<ListPage>>,
}

impl ListingScreen {
    pub fn new(repo: Arc<MovieRepository>, kind: ListingKind) -> Self {
        let (state, _) = watch::channel(ScreenState::Loading);
        Self { repo, kind, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<ScreenState<ListPage>> {
        self.state.subscribe()
    }

    /// Loads `page`, preferring cached rows over an error when page 1 cannot
    /// be fetched.
    pub async fn load(&self, page: u32) -> ScreenState<ListPage> {
        self.state.send_replace(ScreenState::Loading);
        let next = match self.repo.fetch_listing(self.kind, page, true).await {
            Ok(Some(list)) => ScreenState::Success(list),
            Ok(None) => ScreenState::Error(NO_INTERNET.to_string()),
            Err(MovieError::RemoteFailure(reason)) if page == 1 => {
                match self.repo.fetch_listing(self.kind, page, false).await {
                    Ok(Some(cached)) => {
                        warn!("Showing cached {} after failure: {}", self.kind, reason);
                        ScreenState::Success(cached)
                    }
                    _ => ScreenState::Error(SERVER_ERROR.to_string()),
                }
            }
            Err(e) => ScreenState::Error(user_message(&e)),
        };
        self.state.send_replace(next.clone());
        next
    }
}

/// State publisher for the movie detail screen.
pub struct DetailScreen {
    repo: Arc<MovieRepository>,
    state: watch::Sender<ScreenState<MovieDetail>>,
    saved: watch::Sender<bool>,
    current: Mutex<Option<MovieDetail>>,
}

impl DetailScreen {
    pub fn new(repo: Arc<MovieRepository>) -> Self {
        let (state, _) = watch::channel(ScreenState::Loading);
        let (saved, _) = watch::channel(false);
        Self {
            repo,
            state,
            saved,
            current: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ScreenState<MovieDetail>> {
        self.state.subscribe()
    }

    pub fn subscribe_saved(&self) -> watch::Receiver<bool> {
        self.saved.subscribe()
    }

    pub async fn load(&self, id: i64, source: Option<Collection>) -> ScreenState<MovieDetail> {
        self.state.send_replace(ScreenState::Loading);
        match self.repo.is_saved(id) {
            Ok(saved) => {
                self.saved.send_replace(saved);
            }
            Err(e) => warn!("Could not read saved state for {}: {}", id, e),
        }

        let online = self.repo.is_online().await;
        let next = match self.repo.fetch_detail_with(id, source, online).await {
            Ok(Some(detail)) => ScreenState::Success(detail),
            Ok(None) if online => ScreenState::Error(SERVER_ERROR.to_string()),
            Ok(None) => ScreenState::Error(NO_INTERNET.to_string()),
            Err(MovieError::RemoteFailure(reason)) => {
                let cached = source.and_then(|c| self.repo.cached_detail(id, c).ok().flatten());
                match cached {
                    Some(detail) => {
                        warn!("Showing cached movie {} after failure: {}", id, reason);
                        ScreenState::Success(detail)
                    }
                    None => ScreenState::Error(SERVER_ERROR.to_string()),
                }
            }
            Err(e) => ScreenState::Error(user_message(&e)),
        };

        if let ScreenState::Success(detail) = &next {
            self.set_current(Some(detail.clone()));
        }
        self.state.send_replace(next.clone());
        next
    }

    /// Toggles the saved state of the movie currently shown. `None` when
    /// nothing has been loaded yet.
    pub fn toggle_save(&self) -> Option<Result<bool, MovieError>> {
        let current = self.current()?;
        let result = self.repo.toggle_save(&current);
        if let Ok(saved) = &result {
            self.saved.send_replace(*saved);
        }
        Some(result)
    }

    pub fn current(&self) -> Option<MovieDetail> {
        match self.current.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_current(&self, detail: Option<MovieDetail>) {
        match self.current.lock() {
            Ok(mut guard) => *guard = detail,
            Err(poisoned) => *poisoned.into_inner() = detail,
        }
    }
}

/// State publisher for the search screen. Typing goes through the debouncer;
/// an explicit submit searches immediately. Only the most recent query may
/// publish, so a slow response for older text never replaces newer results.
pub struct SearchScreen {
    repo: Arc<MovieRepository>,
    debouncer: SearchDebouncer,
    state: Arc<watch::Sender<ScreenState<ListPage>>>,
    latest: Arc<AtomicU64>,
}

impl SearchScreen {
    pub fn new(repo: Arc<MovieRepository>, debouncer: SearchDebouncer) -> Self {
        let (state, _) = watch::channel(ScreenState::Success(ListPage {
            items: Vec::new(),
            page: 1,
            total_pages: 0,
            total_results: 0,
        }));
        Self {
            repo,
            debouncer,
            state: Arc::new(state),
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ScreenState<ListPage>> {
        self.state.subscribe()
    }

    pub fn query_changed(&self, text: &str) -> Option<JoinHandle<Option<()>>> {
        if text.trim().is_empty() {
            return None;
        }
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let repo = self.repo.clone();
        let state = self.state.clone();
        let latest = self.latest.clone();
        self.debouncer.submit(text, move |query| async move {
            run_search(&repo, &state, &latest, generation, &query).await;
        })
    }

    pub async fn submit(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.debouncer.cancel();
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        run_search(&self.repo, &self.state, &self.latest, generation, text).await;
    }
}

async fn run_search(
    repo: &MovieRepository,
    state: &watch::Sender<ScreenState<ListPage>>,
    latest: &AtomicU64,
    generation: u64,
    query: &str,
) {
    let is_current = || latest.load(Ordering::SeqCst) == generation;
    if !is_current() {
        return;
    }
    state.send_replace(ScreenState::Loading);
    let next = match repo.search(query, 1).await {
        Ok(page) => ScreenState::Success(page),
        Err(e) => ScreenState::Error(user_message(&e)),
    };
    if is_current() {
        state.send_replace(next);
    } else {
        debug!("Dropping results for '{}'; a newer search is in flight", query);
    }
}
