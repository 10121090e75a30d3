//! Host fetch primitives
//!
//! The engine never performs I/O on its own. A [`Fetch`] implementation maps
//! a path to a status and body the way an HTTP fetch would; non-success
//! statuses are reported as responses, transport problems as errors.

use super::AssetError;
use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

/// Status and body of one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP-style status code
    pub status: u16,
    /// Response body
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Successful response with a body
    pub fn ok_with(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Empty response with a status
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network fetch primitive supplied by the host
pub trait Fetch {
    /// Request one path
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, Result<FetchResponse, AssetError>>;
}

/// Fetches paths relative to a root directory
///
/// A missing file answers 404; paths leaving the root are rejected.
#[derive(Debug, Clone)]
pub struct FileFetch {
    root: PathBuf,
}

impl FileFetch {
    /// Serve files below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, AssetError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(AssetError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl Fetch for FileFetch {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, Result<FetchResponse, AssetError>> {
        let resolved = self.resolve(path);
        async move {
            let file = resolved?;
            log::trace!("Reading {:?}", file);
            match std::fs::read(&file) {
                Ok(body) => Ok(FetchResponse::ok_with(body)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FetchResponse::empty(404)),
                Err(e) => Err(AssetError::Io(e)),
            }
        }
        .boxed_local()
    }
}

/// Serves responses from an in-memory table
///
/// Unknown paths answer 404. Useful for tests and hosts that embed their assets.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetch {
    responses: HashMap<String, Rc<FetchResponse>>,
}

impl MemoryFetch {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 for `path`
    pub fn with_asset(mut self, path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.insert(path, FetchResponse::ok_with(body));
        self
    }

    /// Answer `path` with an empty response of `status`
    pub fn with_status(mut self, path: impl Into<String>, status: u16) -> Self {
        self.insert(path, FetchResponse::empty(status));
        self
    }

    /// Set the response for a path
    pub fn insert(&mut self, path: impl Into<String>, response: FetchResponse) {
        self.responses.insert(path.into(), Rc::new(response));
    }
}

impl Fetch for MemoryFetch {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, Result<FetchResponse, AssetError>> {
        let response = self
            .responses
            .get(path)
            .map_or_else(|| FetchResponse::empty(404), |response| FetchResponse::clone(response));
        future::ready(Ok(response)).boxed_local()
    }
}
