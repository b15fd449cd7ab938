//! Fan-out/fan-in resolution of remote records.
//!
//! Every id is resolved concurrently and the results are joined once all of
//! them have settled. Successful records come back in the order the ids were
//! given, whatever order the lookups completed in. Ids that could not be
//! resolved are left out of `records` and listed in `failed` instead.

use crate::core::RecordStore;
use anyhow::Error;
use futures::future::join_all;
use log::{debug, warn};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FetchOptions {
    /// Upper bound for a single lookup; a lookup exceeding it counts as failed.
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }
}

/// Outcome of resolving one id.
#[derive(Debug)]
pub(crate) enum FetchResult<T> {
    Resolved(T),
    NotFound,
    Failed(String),
}

impl<T> From<Result<Option<T>, Error>> for FetchResult<T> {
    fn from(r: Result<Option<T>, Error>) -> Self {
        match r {
            Ok(Some(v)) => FetchResult::Resolved(v),
            Ok(None) => FetchResult::NotFound,
            Err(e) => FetchResult::Failed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FailedFetch<K> {
    pub id: K,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JoinReport<K, T> {
    pub records: Vec<T>,
    pub failed: Vec<FailedFetch<K>>,
}

impl<K, T> JoinReport<K, T> {
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<&K> {
        self.failed.iter().map(|f| &f.id).collect()
    }
}

pub(crate) async fn fetch_and_join<K, T, F, Fut>(ids: &[K], resolve: F, options: FetchOptions) -> JoinReport<K, T>
where
    K: Clone + Display,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<Option<T>, Error>>,
{
    if ids.is_empty() {
        return JoinReport::empty();
    }
    // all lookups are created up front so none waits on another
    let pending: Vec<_> = ids
        .iter()
        .map(|id| {
            let lookup = resolve(id.clone());
            let id = id.clone();
            async move {
                let outcome = match options.timeout {
                    Some(limit) => match tokio::time::timeout(limit, lookup).await {
                        Ok(r) => r,
                        Err(_) => Err(Error::msg(format!("timed out after {}ms", limit.as_millis()))),
                    },
                    None => lookup.await,
                };
                (id, FetchResult::from(outcome))
            }
        })
        .collect();
    // join_all yields in the order the futures were supplied, not completion order
    let settled = join_all(pending).await;

    let mut report = JoinReport {
        records: Vec::with_capacity(settled.len()),
        failed: Vec::new(),
    };
    for (id, result) in settled {
        match result {
            FetchResult::Resolved(record) => report.records.push(record),
            FetchResult::NotFound => {
                warn!("record {} not found", id);
                report.failed.push(FailedFetch {
                    id,
                    reason: "not found".to_owned(),
                });
            }
            FetchResult::Failed(reason) => {
                warn!("failed to fetch record {}: {}", id, reason);
                report.failed.push(FailedFetch { id, reason });
            }
        }
    }
    debug!("joined {} of {} records", report.records.len(), ids.len());
    report
}

pub(crate) async fn join_records<K, T, S>(store: &S, ids: &[K], options: FetchOptions) -> JoinReport<K, T>
where
    K: Clone + Display,
    S: RecordStore<K, T>,
{
    fetch_and_join(ids, move |id| async move { store.resolve(&id).await }, options).await
}
