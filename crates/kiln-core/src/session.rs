//! Compilation sessions.
//!
//! A session owns the pending project inputs, the latest published
//! snapshot and the token of the live attempt. Starting an attempt cancels
//! the previous one; only an attempt whose token is still live when it
//! finishes is published to subscribers.

use std::sync::{Arc, Mutex, PoisonError};

use kiln_common::cancel::CancelToken;
use kiln_common::capability::{ModuleResolver, ScriptTransform, StylesheetBuild};
use kiln_common::config::KilnConfig;
use kiln_common::types::{CompilationResult, ProjectInputs};
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::capability::CapabilityHandle;
use crate::orchestrator::{self, CompileOptions, CompileOutcome};

/// A started compilation attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// Sequence number within the session, starting at 1.
    pub number: u64,
    /// Token cancelled when a newer attempt starts.
    pub cancel: CancelToken,
    /// Inputs captured when the attempt started.
    pub inputs: ProjectInputs,
    /// Snapshot the attempt compiles on top of.
    pub previous: Arc<CompilationResult>,
}

#[derive(Debug, Default)]
struct Live {
    number: u64,
    cancel: CancelToken,
}

/// One editing session over a project.
pub struct CompilationSession<S, B, R> {
    id: Uuid,
    config: KilnConfig,
    capabilities: Arc<CapabilityHandle<S, B, R>>,
    inputs: Mutex<ProjectInputs>,
    live: Mutex<Live>,
    latest: watch::Sender<Arc<CompilationResult>>,
}

impl<S, B, R> CompilationSession<S, B, R>
where
    S: ScriptTransform,
    B: StylesheetBuild,
    R: ModuleResolver,
{
    /// Creates a session with no files.
    #[must_use]
    pub fn new(config: KilnConfig, capabilities: Arc<CapabilityHandle<S, B, R>>) -> Self {
        let inputs = ProjectInputs::from_config(&config);
        let empty = CompilationResult::empty(&config.entry_script, &config.entry_style);
        let (latest, _) = watch::channel(Arc::new(empty));
        let id = Uuid::new_v4();
        tracing::info!(session = %id, "compilation session created");
        Self {
            id,
            config,
            capabilities,
            inputs: Mutex::new(inputs),
            live: Mutex::new(Live::default()),
            latest,
        }
    }

    /// Session identifier attached to every log line of its attempts.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Project configuration.
    #[must_use]
    pub const fn config(&self) -> &KilnConfig {
        &self.config
    }

    /// Subscribes to published snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<CompilationResult>> {
        self.latest.subscribe()
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn latest(&self) -> Arc<CompilationResult> {
        Arc::clone(&self.latest.borrow())
    }

    /// Records new content for `filename`.
    pub fn notify_change(&self, filename: &str, content: &str) {
        tracing::debug!(session = %self.id, filename, "file changed");
        self.lock_inputs().set_file(filename, content);
    }

    /// Removes `filename` from the project.
    pub fn remove_file(&self, filename: &str) {
        tracing::debug!(session = %self.id, filename, "file removed");
        let _ = self.lock_inputs().remove_file(filename);
    }

    /// Pending inputs.
    #[must_use]
    pub fn inputs(&self) -> ProjectInputs {
        self.lock_inputs().clone()
    }

    /// Starts an attempt, cancelling the live one.
    pub fn begin_attempt(&self) -> Attempt {
        let mut live = self.lock_live();
        live.cancel.cancel();
        live.number += 1;
        live.cancel = CancelToken::new();
        Attempt {
            number: live.number,
            cancel: live.cancel.clone(),
            inputs: self.inputs(),
            previous: self.latest(),
        }
    }

    /// Starts an attempt and runs it to completion.
    ///
    /// Completed attempts publish their snapshot; failed attempts publish
    /// the previous snapshot with the failure's diagnostics. Superseded
    /// attempts publish nothing.
    pub async fn run(&self) -> CompileOutcome {
        let attempt = self.begin_attempt();
        self.run_attempt(attempt).await
    }

    /// Runs a previously started attempt.
    pub async fn run_attempt(&self, attempt: Attempt) -> CompileOutcome {
        let span = tracing::info_span!("attempt", session = %self.id, attempt = attempt.number);
        let options = CompileOptions {
            cancel: &attempt.cancel,
            capabilities: &self.capabilities,
            config: &self.config,
        };
        let outcome = orchestrator::compile(&attempt.previous, &attempt.inputs, &options)
            .instrument(span.clone())
            .await;
        span.in_scope(|| self.publish(&attempt, &outcome));
        outcome
    }

    fn publish(&self, attempt: &Attempt, outcome: &CompileOutcome) {
        let live = self.lock_live();
        if attempt.cancel.is_cancelled() || live.number != attempt.number {
            tracing::debug!("attempt superseded, not published");
            return;
        }
        let snapshot = match outcome {
            CompileOutcome::Completed(result) => Arc::clone(result),
            CompileOutcome::Failed(diagnostics) => Arc::new(attempt.previous.with_failure(diagnostics)),
            CompileOutcome::Cancelled => return,
        };
        let changed = !Arc::ptr_eq(&snapshot, &self.latest.borrow());
        if changed {
            tracing::info!(
                errors = snapshot.errors.len(),
                warnings = snapshot.warnings.len(),
                "snapshot published"
            );
            let _ = self.latest.send_replace(snapshot);
        }
        drop(live);
    }

    fn lock_inputs(&self) -> std::sync::MutexGuard<'_, ProjectInputs> {
        self.inputs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_live(&self) -> std::sync::MutexGuard<'_, Live> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S, B, R> std::fmt::Debug for CompilationSession<S, B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilationSession")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
