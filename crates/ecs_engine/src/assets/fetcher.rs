//! Batched asset fetching with progress events

use super::{Asset, AssetError, Fetch};
use crate::events::{EventArg, EventEmitter, EventTarget, EventType, GameEvent};
use crate::foundation::collections::Collection;
use futures::stream::{FuturesUnordered, StreamExt};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

struct FetcherState {
    fetch: Rc<dyn Fetch>,
    queue: RefCell<Collection<String>>,
    events: EventTarget,
}

/// Shared queue of asset paths resolved in one batch
///
/// Cloning the handle shares the queue and listeners. Each settled fetch,
/// successful or not, dispatches a bubbling `fetchProgress` event with the
/// fraction of the batch completed (`progress`) and the settled `path`.
#[derive(Clone)]
pub struct AssetFetcher {
    state: Rc<FetcherState>,
}

impl AssetFetcher {
    /// Create a fetcher on top of a host fetch primitive
    pub fn new(fetch: impl Fetch + 'static) -> Self {
        Self::from_shared(Rc::new(fetch))
    }

    /// Create a fetcher sharing an existing fetch primitive
    pub fn from_shared(fetch: Rc<dyn Fetch>) -> Self {
        Self {
            state: Rc::new(FetcherState {
                fetch,
                queue: RefCell::new(Collection::new()),
                events: EventTarget::new(),
            }),
        }
    }

    /// Queue a path, returns `false` if it was already queued
    pub fn queue_asset(&self, path: impl Into<String>) -> bool {
        self.state.queue.borrow_mut().add(path.into())
    }

    /// Queue several paths
    pub fn queue_assets<I, S>(&self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut queue = self.state.queue.borrow_mut();
        for path in paths {
            queue.add(path.into());
        }
    }

    /// Paths waiting for the next batch, in queue order
    pub fn queued(&self) -> Vec<String> {
        self.state.queue.borrow().to_vec()
    }

    /// Fetch every queued path concurrently and empty the queue
    ///
    /// Resolves to one `(path, asset)` pair per queued path in queue order;
    /// failed fetches yield `None` without affecting the others.
    pub fn fetch_assets(&self) -> impl Future<Output = Vec<(String, Option<Asset>)>> + 'static {
        let paths = std::mem::take(&mut *self.state.queue.borrow_mut()).to_vec();
        let mut requests: FuturesUnordered<_> = paths
            .iter()
            .enumerate()
            .map(|(position, path)| {
                let request = self.fetch(path);
                async move { (position, request.await) }
            })
            .collect();
        let events = self.state.events.clone();

        async move {
            let total = paths.len();
            let mut results: Vec<Option<Asset>> = vec![None; total];
            let mut completed = 0;
            log::debug!("Fetching {} assets", total);

            while let Some((position, result)) = requests.next().await {
                completed += 1;
                let path = &paths[position];
                match result {
                    Ok(asset) => results[position] = Some(asset),
                    Err(e) => log::warn!("Failed to fetch asset '{}': {}", path, e),
                }
                let mut event = GameEvent::new(EventType::FetchProgress, true)
                    .with_arg("progress", EventArg::Number(completed as f64 / total as f64))
                    .with_arg("path", EventArg::Text(path.clone()));
                events.dispatch_event(&mut event);
            }

            paths.into_iter().zip(results).collect()
        }
    }

    /// Fetch and decode one path, bypassing the queue
    pub fn fetch(&self, path: &str) -> impl Future<Output = Result<Asset, AssetError>> + 'static {
        let request = self.state.fetch.fetch(path);
        let path = path.to_string();
        async move {
            let response = request.await?;
            if response.status == 404 {
                return Err(AssetError::NotFound(path));
            }
            if !response.ok() {
                return Err(AssetError::HttpStatus {
                    path,
                    status: response.status,
                });
            }
            Asset::decode(&path, response.body)
        }
    }
}

impl EventEmitter for AssetFetcher {
    fn event_target(&self) -> &EventTarget {
        &self.state.events
    }
}

impl fmt::Debug for AssetFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetFetcher")
            .field("queued", &self.state.queue.borrow().len())
            .finish()
    }
}
