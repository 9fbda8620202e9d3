//! Ingestion gate - at most one recomputation in flight
//!
//! Every ingest request takes a ticket. Recomputation is serialized on an
//! async mutex; a request that gets the lock after a newer ticket was issued
//! is superseded and returns without computing. Readers never touch that
//! mutex: the published snapshot sits behind its own short-lived lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, info};

use finsight_core::{AnalyticsConfig, AnalyticsFacade, AnalyticsSnapshot, FacadeState};

/// Why an ingestion did not publish a snapshot
#[derive(Debug)]
pub enum IngestError {
    /// A newer request arrived while this one was waiting
    Superseded,
    /// The input held no usable rows
    Rejected(finsight_core::Error),
    /// The recomputation task panicked or was cancelled
    Failed(tokio::task::JoinError),
}

pub struct IngestGate {
    latest_ticket: AtomicU64,
    pub(crate) facade: Arc<Mutex<AnalyticsFacade>>,
    published: RwLock<Arc<AnalyticsSnapshot>>,
    state: RwLock<FacadeState>,
    config: AnalyticsConfig,
}

impl IngestGate {
    pub fn new(facade: AnalyticsFacade) -> Self {
        let published = RwLock::new(facade.current_snapshot());
        let state = RwLock::new(facade.state());
        let config = facade.config().clone();
        Self {
            latest_ticket: AtomicU64::new(0),
            facade: Arc::new(Mutex::new(facade)),
            published,
            state,
            config,
        }
    }

    /// The latest published snapshot
    pub fn snapshot(&self) -> Arc<AnalyticsSnapshot> {
        Arc::clone(&self.published.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn state(&self) -> FacadeState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Most recently issued ticket (0 before any ingestion)
    pub fn latest_ticket(&self) -> u64 {
        self.latest_ticket.load(Ordering::SeqCst)
    }

    /// Recompute from `raw` and publish the result, unless superseded
    pub async fn ingest(&self, raw: String) -> Result<Arc<AnalyticsSnapshot>, IngestError> {
        let ticket = self.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(ticket, bytes = raw.len(), "Ingestion queued");

        let guard = Arc::clone(&self.facade).lock_owned().await;

        let latest = self.latest_ticket();
        if latest != ticket {
            info!(ticket, latest, "Ingestion superseded by a newer request");
            return Err(IngestError::Superseded);
        }

        // The guard travels with the work and comes back, so publishing
        // happens before the next request can recompute
        let (facade, result) = tokio::task::spawn_blocking(move || {
            let mut facade = guard;
            let result = facade.ingest(&raw);
            (facade, result)
        })
        .await
        .map_err(IngestError::Failed)?;

        let snapshot = result.map_err(IngestError::Rejected)?;

        *self.published.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = facade.state();
        drop(facade);

        info!(ticket, transactions = snapshot.transaction_count, "Published snapshot");
        Ok(snapshot)
    }
}
