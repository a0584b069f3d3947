//! One bidirectional synchronization pass: push the full local snapshot,
//! pull the namespace's snapshot, upsert it locally.

use std::future::Future;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::household::HouseholdResolver;
use crate::models::{ItemRecord, PushItem, ServerRecord};
use crate::namespace::Namespace;
use crate::stats::ExpiryStats;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("request timed out")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed server response: {0}")]
    MalformedResponse(String),
    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("local store failure: {0:#}")]
    LocalStore(anyhow::Error),
}

impl SyncError {
    /// Whether re-running the same operation later can succeed. A 4xx
    /// rejection will be rejected again with the same payload.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { status, .. } if (400..500).contains(status))
    }
}

/// Network seam between the sync client and the reconciliation server.
///
/// Implementations bound every call with a timeout and report it as
/// [`SyncError::Timeout`]; the client never retries on its own.
pub trait SyncTransport {
    fn push(
        &self,
        namespace: &Namespace,
        items: &[PushItem],
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn pull(
        &self,
        namespace: &Namespace,
    ) -> impl Future<Output = Result<Vec<ServerRecord>, SyncError>> + Send;

    /// Returns whether the server held the record.
    fn delete(
        &self,
        namespace: &Namespace,
        local_id: i64,
    ) -> impl Future<Output = Result<bool, SyncError>> + Send;

    fn stats(
        &self,
        namespace: &Namespace,
    ) -> impl Future<Output = Result<ExpiryStats, SyncError>> + Send;
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub namespace: Namespace,
    pub pushed: usize,
    pub pulled: usize,
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsSource {
    Server,
    Local,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub stats: ExpiryStats,
    pub source: StatsSource,
}

/// Stats over this device's rows only, with no network involved.
pub fn local_stats(db: &Database) -> Result<StatsReport, SyncError> {
    let stats = db
        .compute_local_stats(Utc::now())
        .map_err(SyncError::LocalStore)?;
    Ok(StatsReport {
        stats,
        source: StatsSource::Local,
    })
}

pub struct SyncClient<'a, T> {
    db: &'a Database,
    transport: T,
}

impl<'a, T: SyncTransport> SyncClient<'a, T> {
    pub fn new(db: &'a Database, transport: T) -> Self {
        Self { db, transport }
    }

    fn namespace(&self) -> Result<Namespace, SyncError> {
        HouseholdResolver::new(self.db)
            .resolve()
            .map_err(SyncError::LocalStore)
    }

    /// Run one full push/pull pass.
    ///
    /// Takes `&mut self` so a client can never overlap two passes. The local
    /// store is only written after the pull succeeds; a transport failure
    /// leaves it exactly as it was.
    pub async fn synchronize(&mut self) -> Result<SyncReport, SyncError> {
        let namespace = self.namespace()?;
        let items: Vec<PushItem> = self
            .db
            .list_items()
            .map_err(SyncError::LocalStore)?
            .iter()
            .map(ItemRecord::to_push_item)
            .collect();

        info!(namespace = %namespace, count = items.len(), "pushing local snapshot");
        self.transport
            .push(&namespace, &items)
            .await
            .inspect_err(|e| warn!(namespace = %namespace, error = %e, "push failed"))?;

        let records = self
            .transport
            .pull(&namespace)
            .await
            .inspect_err(|e| warn!(namespace = %namespace, error = %e, "pull failed"))?;

        let applied = self.db.apply_pulled(&records).map_err(|e| {
            error!(namespace = %namespace, "applying pulled records failed: {e:#}");
            SyncError::LocalStore(e)
        })?;

        info!(
            namespace = %namespace,
            pulled = records.len(),
            inserted = applied.inserted,
            updated = applied.updated,
            "sync complete"
        );
        Ok(SyncReport {
            namespace,
            pushed: items.len(),
            pulled: records.len(),
            inserted: applied.inserted,
            updated: applied.updated,
        })
    }

    /// Server stats when reachable, otherwise the same computation over the
    /// local store. Only a local store failure is returned as an error.
    pub async fn stats(&self) -> Result<StatsReport, SyncError> {
        let namespace = self.namespace()?;
        match self.transport.stats(&namespace).await {
            Ok(stats) => Ok(StatsReport {
                stats,
                source: StatsSource::Server,
            }),
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "server stats unavailable, computing locally");
                local_stats(self.db)
            }
        }
    }

    /// Delete an item everywhere: server first, then locally.
    ///
    /// If the server call fails nothing is deleted, so a later pull cannot
    /// resurrect a row that only vanished locally. Returns whether the local
    /// row existed.
    pub async fn delete_item(&mut self, id: i64) -> Result<bool, SyncError> {
        let namespace = self.namespace()?;
        let remote = self.transport.delete(&namespace, id).await?;
        let local = self.db.delete_item(id).map_err(SyncError::LocalStore)?;
        info!(namespace = %namespace, id, remote, local, "deleted item");
        Ok(local)
    }
}
