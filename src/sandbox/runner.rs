//! Sandbox job execution
//!
//! Each job runs in its own spawned task, so dropping the caller's future
//! (or the whole orchestrator run) does not interrupt cleanup. Jobs for the
//! same session wait on a per-session lock and run one at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{
    ConfirmationScript, ResourceLimits, SandboxHandle, SandboxJob, SandboxProvider, SandboxState,
};
use crate::domain::VulnerabilityFinding;
use crate::error::SandboxError;

/// Provisioning attempts before the job is declared failed
pub const PROVISION_ATTEMPTS: u32 = 2;

type SessionLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Tears the environment down if the job task is dropped before it could
/// do so itself.
struct TeardownGuard {
    provider: Arc<dyn SandboxProvider>,
    handle: Option<SandboxHandle>,
    job_id: String,
}

impl TeardownGuard {
    fn new(provider: Arc<dyn SandboxProvider>, handle: SandboxHandle, job_id: String) -> Self {
        Self {
            provider,
            handle: Some(handle),
            job_id,
        }
    }

    fn handle(&self) -> Option<&SandboxHandle> {
        self.handle.as_ref()
    }

    async fn teardown(mut self) {
        if let Some(handle) = self.handle.take() {
            release(&*self.provider, &handle, &self.job_id).await;
        }
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let provider = Arc::clone(&self.provider);
        let job_id = self.job_id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                warn!(job_id = %job_id, "Sandbox job interrupted, tearing down in background");
                rt.spawn(async move {
                    release(&*provider, &handle, &job_id).await;
                });
            }
            Err(_) => {
                error!(job_id = %job_id, handle = %handle.id, "Sandbox environment leaked: no runtime for teardown");
            }
        }
    }
}

async fn release(provider: &dyn SandboxProvider, handle: &SandboxHandle, job_id: &str) {
    if let Err(e) = provider.teardown(handle).await {
        error!(job_id, handle = %handle.id, error = %e, "Sandbox teardown failed");
    }
}

/// Caller's view of a submitted job: poll with [`state`](Self::state) or
/// await [`wait`](Self::wait).
pub struct SandboxJobHandle {
    job_id: String,
    updates: watch::Receiver<SandboxJob>,
    task: JoinHandle<SandboxJob>,
}

impl SandboxJobHandle {
    pub fn id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> SandboxState {
        self.updates.borrow().state
    }

    pub fn snapshot(&self) -> SandboxJob {
        self.updates.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the job to reach `Cleaned`
    pub async fn wait(self) -> SandboxJob {
        match self.task.await {
            Ok(job) => job,
            Err(e) => {
                // The guard has already scheduled teardown
                let mut job = self.updates.borrow().clone();
                error!(job_id = %self.job_id, error = %e, "Sandbox job task ended abnormally");
                job.error = Some(format!("job task aborted: {e}"));
                if !job.state.is_outcome() && job.state != SandboxState::Cleaned {
                    job.outcome = Some(SandboxState::Failed);
                }
                job.state = SandboxState::Cleaned;
                job
            }
        }
    }
}

pub struct SandboxRunner {
    provider: Arc<dyn SandboxProvider>,
    limits: ResourceLimits,
    session_locks: Arc<SessionLocks>,
}

impl SandboxRunner {
    pub fn new(provider: Arc<dyn SandboxProvider>, limits: ResourceLimits) -> Self {
        Self {
            provider,
            limits,
            session_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        match self.session_locks.lock() {
            Ok(mut locks) => Arc::clone(locks.entry(session_id.to_string()).or_default()),
            // A poisoned map still must not let two jobs run at once
            Err(poisoned) => Arc::clone(
                poisoned
                    .into_inner()
                    .entry(session_id.to_string())
                    .or_default(),
            ),
        }
    }

    /// Drop the session's lock once no job holds or awaits it
    fn forget_idle_lock(locks: &SessionLocks, session_id: &str) {
        let mut map = match locks.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        if map.get(session_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            map.remove(session_id);
        }
    }

    /// Submit `candidates` for confirmation against `target`. Returns
    /// immediately; the job starts once the session's previous job is done.
    pub fn confirm(
        &self,
        session_id: &str,
        target: &str,
        candidates: Vec<VulnerabilityFinding>,
    ) -> SandboxJobHandle {
        let job = SandboxJob::new(
            session_id,
            candidates.iter().map(|f| f.id.clone()).collect(),
            self.limits.clone(),
        );
        let job_id = job.id.clone();
        let script = ConfirmationScript::render(&job_id, target, &candidates);
        let (tx, rx) = watch::channel(job.clone());

        let lock = self.session_lock(session_id);
        let locks = Arc::clone(&self.session_locks);
        let session_key = session_id.to_string();
        let provider = Arc::clone(&self.provider);
        let task = tokio::spawn(async move {
            let job = {
                let _slot = lock.lock_owned().await;
                run_job(provider, job, script, tx).await
            };
            Self::forget_idle_lock(&locks, &session_key);
            job
        });

        info!(job_id = %job_id, session_id, "Sandbox job queued");
        SandboxJobHandle {
            job_id,
            updates: rx,
            task,
        }
    }
}

fn advance(job: &mut SandboxJob, next: SandboxState, tx: &watch::Sender<SandboxJob>) {
    if let Err(e) = job.transition(next) {
        error!(job_id = %job.id, error = %e, "Sandbox state machine violated");
        return;
    }
    info!(job_id = %job.id, state = %next, "Sandbox state changed");
    tx.send_replace(job.clone());
}

fn fail(job: &mut SandboxJob, err: &SandboxError, tx: &watch::Sender<SandboxJob>) {
    if let Err(e) = job.fail(err.to_string()) {
        error!(job_id = %job.id, error = %e, "Sandbox state machine violated");
        return;
    }
    info!(job_id = %job.id, state = %SandboxState::Failed, "Sandbox state changed");
    tx.send_replace(job.clone());
}

async fn provision(
    provider: &dyn SandboxProvider,
    job: &mut SandboxJob,
    tx: &watch::Sender<SandboxJob>,
) -> Result<SandboxHandle, SandboxError> {
    let mut last = SandboxError::Provision("no attempt made".to_string());
    for attempt in 1..=PROVISION_ATTEMPTS {
        job.provision_attempts = attempt;
        tx.send_replace(job.clone());
        match provider.provision(&job.limits).await {
            Ok(handle) => return Ok(handle),
            Err(e) => {
                warn!(job_id = %job.id, attempt, error = %e, "Sandbox provisioning failed");
                last = e;
            }
        }
    }
    Err(last)
}

async fn run_job(
    provider: Arc<dyn SandboxProvider>,
    mut job: SandboxJob,
    script: ConfirmationScript,
    tx: watch::Sender<SandboxJob>,
) -> SandboxJob {
    advance(&mut job, SandboxState::Provisioning, &tx);

    let guard = match provision(&*provider, &mut job, &tx).await {
        Ok(handle) => TeardownGuard::new(Arc::clone(&provider), handle, job.id.clone()),
        Err(e) => {
            fail(&mut job, &e, &tx);
            advance(&mut job, SandboxState::Cleaned, &tx);
            return job;
        }
    };

    advance(&mut job, SandboxState::Running, &tx);
    let wall_clock = job.limits.wall_clock;

    if let Some(handle) = guard.handle() {
        let run = provider.execute(handle, &script, wall_clock);
        match tokio::time::timeout(wall_clock, run).await {
            Ok(Ok(outcome)) if outcome.exit_code == 0 => {
                job.record_confirmed(&outcome.confirmed);
                advance(&mut job, SandboxState::Completed, &tx);
            }
            Ok(Ok(outcome)) => {
                let err = SandboxError::Execution(format!("script exited with {}", outcome.exit_code));
                fail(&mut job, &err, &tx);
            }
            Ok(Err(SandboxError::Timeout(limit))) => {
                job.error = Some(SandboxError::Timeout(limit).to_string());
                advance(&mut job, SandboxState::TimedOut, &tx);
            }
            Ok(Err(e)) => fail(&mut job, &e, &tx),
            Err(_) => {
                job.error = Some(SandboxError::Timeout(wall_clock).to_string());
                advance(&mut job, SandboxState::TimedOut, &tx);
            }
        }
    }

    guard.teardown().await;
    advance(&mut job, SandboxState::Cleaned, &tx);
    job
}
