//! Per-highlight enrichment requests.
//!
//! Each request runs `Idle → Requesting → {Succeeded, Failed}`. At most one
//! request per highlight id is in flight; a second request for the same id
//! is turned away until the first reaches a terminal state. Only successes
//! are persisted, so a retry after a failure always starts fresh.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, instrument, warn};

use glean_shared::{GleanError, HighlightId, Result};
use glean_storage::KvStore;

use crate::credentials::CredentialStore;
use crate::enrichment::EnrichmentClient;
use crate::error::EnrichmentError;
use crate::repository::HighlightRepository;

// ---------------------------------------------------------------------------
// State reporting
// ---------------------------------------------------------------------------

/// Lifecycle of one enrichment request, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentState {
    /// Entry state of every request. Observers are never notified of it;
    /// the first reported transition is always away from `Idle`.
    Idle,
    Requesting,
    /// Carries the new summary.
    Succeeded(String),
    /// Carries the user-facing failure message.
    Failed(String),
}

impl EnrichmentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }
}

/// Receives state transitions for display.
pub trait EnrichmentObserver: Send + Sync {
    fn state_changed(&self, id: HighlightId, state: &EnrichmentState);
}

/// No-op observer.
pub struct SilentObserver;

impl EnrichmentObserver for SilentObserver {
    fn state_changed(&self, _id: HighlightId, _state: &EnrichmentState) {}
}

/// How an [`EnrichmentCoordinator::enrich`] call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichOutcome {
    /// Summary generated and stored.
    Succeeded { summary: String },
    /// Nothing stored; `message` is ready for display.
    Failed {
        error: EnrichmentError,
        message: String,
    },
    /// Another request for this id is still running.
    AlreadyRequesting,
}

// ---------------------------------------------------------------------------
// In-flight tracking
// ---------------------------------------------------------------------------

type InFlight = Arc<Mutex<HashSet<HighlightId>>>;

/// Membership of one id in the in-flight set, released on drop.
struct InFlightGuard {
    set: InFlight,
    id: HighlightId,
}

impl InFlightGuard {
    /// `None` if `id` is already in flight.
    fn acquire(set: &InFlight, id: HighlightId) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        inserted.then(|| Self {
            set: Arc::clone(set),
            id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// EnrichmentCoordinator
// ---------------------------------------------------------------------------

/// Runs enrichment requests and stores their summaries.
pub struct EnrichmentCoordinator<S> {
    repository: Arc<HighlightRepository<S>>,
    credentials: CredentialStore<S>,
    client: EnrichmentClient,
    in_flight: InFlight,
}

impl<S: KvStore> EnrichmentCoordinator<S> {
    /// The API key is read from the repository's store on every request.
    pub fn new(repository: Arc<HighlightRepository<S>>, client: EnrichmentClient) -> Self {
        let credentials = CredentialStore::new(Arc::clone(repository.store()));
        Self {
            repository,
            credentials,
            client,
            in_flight: InFlight::default(),
        }
    }

    /// Whether a request for `id` is currently running.
    pub fn is_requesting(&self, id: HighlightId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    /// Summarize `text` and store the result on highlight `id`.
    ///
    /// Enrichment failures come back as [`EnrichOutcome::Failed`]. Only
    /// store failures are returned as `Err`.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn enrich(
        &self,
        id: HighlightId,
        text: &str,
        observer: &dyn EnrichmentObserver,
    ) -> Result<EnrichOutcome> {
        let Some(_in_flight) = InFlightGuard::acquire(&self.in_flight, id) else {
            debug!("enrichment already in flight");
            return Ok(EnrichOutcome::AlreadyRequesting);
        };

        let api_key = match self.credentials.get().await {
            Ok(Some(key)) => key,
            Ok(None) => return Ok(fail(id, EnrichmentError::MissingCredential, observer)),
            Err(e) => return Err(storage_failed(id, e, observer)),
        };

        observer.state_changed(id, &EnrichmentState::Requesting);

        let summary = match self.client.summarize(text, &api_key).await {
            Ok(summary) => summary,
            Err(error) => return Ok(fail(id, error, observer)),
        };

        match self.repository.update_summary(id, &summary).await {
            Ok(stored) => {
                if !stored {
                    debug!("highlight deleted during enrichment, summary discarded");
                }
            }
            Err(e) => return Err(storage_failed(id, e, observer)),
        }

        info!("enrichment succeeded");
        observer.state_changed(id, &EnrichmentState::Succeeded(summary.clone()));
        Ok(EnrichOutcome::Succeeded { summary })
    }
}

fn fail(
    id: HighlightId,
    error: EnrichmentError,
    observer: &dyn EnrichmentObserver,
) -> EnrichOutcome {
    warn!(error = %error, "enrichment failed");
    let message = error.user_message();
    observer.state_changed(id, &EnrichmentState::Failed(message.clone()));
    EnrichOutcome::Failed { error, message }
}

/// Report a store error as `Failed` and hand it back for propagation.
fn storage_failed(
    id: HighlightId,
    error: GleanError,
    observer: &dyn EnrichmentObserver,
) -> GleanError {
    warn!(error = %error, "store unavailable during enrichment");
    observer.state_changed(id, &EnrichmentState::Failed(error.to_string()));
    error
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
