//! Per-search orchestration: session lifecycle, retry policy, cancellation.
//!
//! One search runs the phase sequence Idle → SessionAcquired → Navigated →
//! UIResolved → ResultsReady → Extracted → Succeeded/Failed. Transient
//! failures (navigation timeout, blocking overlay, page faults) retry with a
//! session reset in between, up to a counted bound; everything else is
//! terminal for that search only. The page is released on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::core::{EngineConfig, ExtractError, ExtractionOutcome, FailureKind, FlightObservation, SearchSpec};
use crate::session::SessionProvider;
use crate::{extract, navigate};

/// Run-level cancellation handle, shared between the caller (e.g. a Ctrl-C
/// handler) and every in-flight search.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

pub struct Orchestrator {
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute one configured search end to end.
    ///
    /// Cancellation aborts the in-flight attempt at its next await point; the
    /// session is still released before the outcome is returned.
    pub async fn run_search<S: SessionProvider>(
        &self,
        sessions: &S,
        spec: &SearchSpec,
        cancel: &CancelToken,
    ) -> ExtractionOutcome {
        if cancel.is_cancelled() {
            return failure(spec, &ExtractError::Cancelled);
        }

        let page = match sessions.acquire().await {
            Ok(page) => page,
            Err(e) => {
                warn!(search = %spec.label(), error = %e, "session acquisition failed");
                return failure(spec, &e);
            }
        };
        debug!(search = %spec.label(), phase = "session_acquired");

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ExtractError::Cancelled),
            r = self.drive(sessions, &page, spec) => r,
        };

        // Scoped acquisition: the page goes back on success, failure and
        // cancellation alike.
        sessions.release(page).await;

        match result {
            Ok(observations) => {
                info!(
                    search = %spec.label(),
                    observations = observations.len(),
                    phase = "succeeded"
                );
                ExtractionOutcome::Success { observations }
            }
            Err(e) => {
                warn!(search = %spec.label(), kind = %e.kind(), error = %e, phase = "failed");
                failure(spec, &e)
            }
        }
    }

    /// Attempt loop with bounded retries and session resets between attempts.
    async fn drive<S: SessionProvider>(
        &self,
        sessions: &S,
        page: &S::Page,
        spec: &SearchSpec,
    ) -> Result<Vec<FlightObservation>, ExtractError> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(page, spec).await {
                Ok(observations) => return Ok(observations),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        search = %spec.label(),
                        attempt,
                        max = self.config.max_retries,
                        error = %e,
                        "transient failure, resetting session and retrying"
                    );
                    sessions.reset(page).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt<P: crate::session::PageDriver + ?Sized>(
        &self,
        page: &P,
        spec: &SearchSpec,
    ) -> Result<Vec<FlightObservation>, ExtractError> {
        navigate::navigate(page, spec, &self.config).await?;
        debug!(search = %spec.label(), phase = "results_ready");
        let observations = extract::extract(page, spec, &self.config).await?;
        debug!(search = %spec.label(), phase = "extracted");
        Ok(observations)
    }

    /// Process a batch strictly sequentially on one session.
    ///
    /// One failed search never aborts the batch; a fatal session-start
    /// failure marks all remaining searches failed, so the caller can retry
    /// the whole run at its next trigger.
    pub async fn run_batch<S: SessionProvider>(
        &self,
        sessions: &S,
        specs: &[SearchSpec],
        cancel: &CancelToken,
    ) -> Vec<ExtractionOutcome> {
        let mut outcomes = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let outcome = self.run_search(sessions, spec, cancel).await;
            let fatal = matches!(
                outcome,
                ExtractionOutcome::Failure {
                    kind: FailureKind::SessionStart,
                    ..
                }
            );
            outcomes.push(outcome);
            if fatal {
                warn!("browser session is unstartable, aborting remaining searches");
                for rest in &specs[i + 1..] {
                    outcomes.push(ExtractionOutcome::Failure {
                        kind: FailureKind::SessionStart,
                        message: "run aborted: browser session could not be started".to_string(),
                        search_id: rest.id.clone(),
                    });
                }
                break;
            }
        }
        outcomes
    }
}

fn failure(spec: &SearchSpec, error: &ExtractError) -> ExtractionOutcome {
    ExtractionOutcome::Failure {
        kind: error.kind(),
        message: error.to_string(),
        search_id: spec.id.clone(),
    }
}
