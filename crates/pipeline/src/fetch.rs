//! Resource fetching seam and bounded fan-out over it.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::{StreamExt, TryStreamExt, stream};

use crate::error::{FetchError, NormalizeError, ResourceKind};

/// Retrieves resource bytes by URL.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>>;
}

/// In-memory fetcher. Records every request it serves.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    resources: HashMap<String, Vec<u8>>,
    fetches: AtomicUsize,
    requested: RefCell<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.resources.insert(url.into(), bytes.into());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// URLs requested so far, in request order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }
}

impl Fetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.requested.borrow_mut().push(url.to_owned());
        self.resources
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_owned()))
    }
}

/// Resource produced inside the pipeline (a rewritten material document),
/// addressable like a fetched one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualResource {
    url: String,
    bytes: Arc<[u8]>,
}

impl VirtualResource {
    pub const SCHEME: &'static str = "memory://";

    pub fn new(name: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            url: format!("{}{name}", Self::SCHEME),
            bytes: bytes.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Resolves `reference` against the directory of `base`. Absolute URLs,
/// root-relative paths and data URIs are returned as they are.
pub fn sibling_url(base: &str, reference: &str) -> String {
    if reference.contains("://") || reference.starts_with('/') || reference.starts_with("data:") {
        return reference.to_owned();
    }
    match base.rfind('/') {
        Some(i) => format!("{}{}", &base[..=i], reference),
        None => reference.to_owned(),
    }
}

/// Fetches `requests` with at most `limit` in flight. Duplicate URLs are
/// fetched once. The first failure aborts the rest.
pub(crate) async fn fetch_all<F: Fetcher>(
    fetcher: &F,
    requests: impl IntoIterator<Item = (ResourceKind, String)>,
    limit: usize,
) -> Result<HashMap<String, Vec<u8>>, NormalizeError> {
    let mut seen = HashSet::new();
    let unique: Vec<_> = requests
        .into_iter()
        .filter(|(_, url)| seen.insert(url.clone()))
        .collect();
    if unique.is_empty() {
        return Ok(HashMap::new());
    }
    log::debug!("Fetching {} resources ({} at a time)", unique.len(), limit.max(1));

    stream::iter(unique)
        .map(|(kind, url)| async move {
            match fetcher.fetch(&url).await {
                Ok(bytes) => Ok((url, bytes)),
                Err(cause) => Err(NormalizeError::fetch(kind, &url, cause)),
            }
        })
        .buffer_unordered(limit.max(1))
        .try_collect()
        .await
}
