//! Paginated fetch controller shared by every list view.
//!
//! A `Paginator` owns the page/size cursor and the last loaded page of a list.
//! Every change of page or size, every `refresh`, and re-enabling starts
//! exactly one fetch. Each fetch is tagged with a generation number; when it
//! completes after a newer fetch has been started its result is dropped, so a
//! slow response for an old page can never overwrite a newer one.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::models::PageResponse;

pub type PageFuture<T> = BoxFuture<'static, Result<PageResponse<T>, ApiError>>;

/// Fetch function: (page index, page size) -> page
pub type PageFetch<T> = Arc<dyn Fn(u32, u32) -> PageFuture<T> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationOptions {
    pub initial_page: u32,
    pub initial_size: u32,
    /// While false nothing is fetched, e.g. until a prerequisite id is known
    pub enabled: bool,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            initial_page: 0,
            initial_size: 10,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageState<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_pages: u32,
    pub total_elements: u64,
    pub loading: bool,
    pub error: Option<String>,
    pub enabled: bool,
    generation: u64,
}

impl<T> PageState<T> {
    fn new(options: PaginationOptions) -> Self {
        Self {
            data: Vec::new(),
            page: options.initial_page,
            size: options.initial_size,
            total_pages: 0,
            total_elements: 0,
            loading: options.enabled,
            error: None,
            enabled: options.enabled,
            generation: 0,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page.saturating_add(1) < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 0
    }
}

pub struct Paginator<T> {
    fetch: PageFetch<T>,
    state: Arc<watch::Sender<PageState<T>>>,
}

impl<T> Paginator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create the controller and, when enabled, start loading the initial page.
    /// Must be called inside a Tokio runtime.
    pub fn new(fetch: PageFetch<T>, options: PaginationOptions) -> Self {
        let (state, _) = watch::channel(PageState::new(options));
        let paginator = Self {
            fetch,
            state: Arc::new(state),
        };
        if options.enabled {
            paginator.spawn_fetch(0, options.initial_page, options.initial_size);
        }
        paginator
    }

    /// Build from any async function of (page, size)
    pub fn from_fn<F, Fut>(fetch: F, options: PaginationOptions) -> Self
    where
        F: Fn(u32, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PageResponse<T>, ApiError>> + Send + 'static,
    {
        Self::new(Arc::new(move |page, size| fetch(page, size).boxed()), options)
    }

    pub fn state(&self) -> PageState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PageState<T>> {
        self.state.subscribe()
    }

    /// Wait until no fetch is pending and return the settled state
    pub async fn wait_idle(&self) -> PageState<T> {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        settled
    }

    /// Move to `page`. Returns the spawned fetch, or `None` if nothing changed
    /// or fetching is disabled.
    pub fn set_page(&self, page: u32) -> Option<JoinHandle<()>> {
        self.update_and_fetch(|state| {
            if state.page == page {
                return false;
            }
            state.page = page;
            true
        })
    }

    pub fn set_size(&self, size: u32) -> Option<JoinHandle<()>> {
        self.update_and_fetch(|state| {
            if state.size == size {
                return false;
            }
            state.size = size;
            true
        })
    }

    /// Reload the current page
    pub fn refresh(&self) -> Option<JoinHandle<()>> {
        self.update_and_fetch(|_| true)
    }

    /// Enable or suspend fetching. Disabling drops any in-flight result.
    pub fn set_enabled(&self, enabled: bool) -> Option<JoinHandle<()>> {
        self.update_and_fetch(|state| {
            if state.enabled == enabled {
                return false;
            }
            state.enabled = enabled;
            true
        })
    }

    fn update_and_fetch(
        &self,
        change: impl FnOnce(&mut PageState<T>) -> bool,
    ) -> Option<JoinHandle<()>> {
        let mut request = None;
        self.state.send_if_modified(|state| {
            if !change(state) {
                return false;
            }
            state.generation += 1;
            state.error = None;
            state.loading = state.enabled;
            if state.enabled {
                request = Some((state.generation, state.page, state.size));
            }
            true
        });

        let (generation, page, size) = request?;
        Some(self.spawn_fetch(generation, page, size))
    }

    fn spawn_fetch(&self, generation: u64, page: u32, size: u32) -> JoinHandle<()> {
        debug!(page, size, generation, "Fetching page");
        let request = (self.fetch)(page, size);
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let result = request.await;
            state.send_if_modified(|state| {
                if state.generation != generation {
                    debug!(page, generation, "Discarding superseded page response");
                    return false;
                }
                match result {
                    Ok(response) => {
                        state.data = response.content;
                        state.total_pages = response.total_pages;
                        state.total_elements = response.total_elements;
                    }
                    Err(e) => {
                        warn!(page, error = %e, "Page fetch failed");
                        state.error = Some(e.user_message());
                    }
                }
                state.loading = false;
                true
            });
        })
    }
}
