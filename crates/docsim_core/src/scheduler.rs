//! Scheduled function emulation.
//!
//! A job is a row in `_scheduled_functions` of the component that scheduled
//! it, plus a tokio timer. When the timer fires the job is claimed
//! (`pending -> inProgress`) in one transaction, the target runs as a
//! top-level call, and the outcome is recorded in a second transaction.
//!
//! Timers use `tokio::time`, so tests running with a paused clock control
//! when jobs fire.

use crate::error::{CoreError, CoreResult};
use crate::functions::FunctionPath;
use crate::runtime::{Component, Expected, Invocation, Runtime};
use crate::types::{Document, FunctionKind, Patch};
use docsim_values::{DocumentId, Value};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// System table holding scheduled jobs.
pub const SCHEDULED_FUNCTIONS_TABLE: &str = "_scheduled_functions";

/// Lifecycle state of a scheduled job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for its timer.
    Pending,
    /// Claimed by its timer and running.
    InProgress,
    /// Finished without error.
    Success,
    /// The target failed.
    Failed {
        /// The failure message.
        error: String,
    },
    /// Canceled before it was claimed.
    Canceled,
}

impl JobState {
    /// The `kind` string stored in the job document.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "inProgress",
            Self::Success => "success",
            Self::Failed { .. } => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Returns true once the job can no longer change state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed { .. } | Self::Canceled)
    }

    /// Document form: `{kind}` plus `error` for failed jobs.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut state = BTreeMap::new();
        state.insert("kind".to_string(), Value::from(self.kind()));
        if let Self::Failed { error } = self {
            state.insert("error".to_string(), Value::from(error.as_str()));
        }
        Value::Object(state)
    }

    /// Parses the document form.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        let kind = value.get("kind").and_then(Value::as_str);
        match kind {
            Some("pending") => Ok(Self::Pending),
            Some("inProgress") => Ok(Self::InProgress),
            Some("success") => Ok(Self::Success),
            Some("canceled") => Ok(Self::Canceled),
            Some("failed") => Ok(Self::Failed {
                error: value
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            _ => Err(CoreError::invalid_operation(format!(
                "malformed scheduled job state: {value}"
            ))),
        }
    }
}

/// A decoded `_scheduled_functions` row.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    /// Job id.
    pub id: DocumentId,
    /// Target function, `module:export`.
    pub name: String,
    /// Absolute path of the target's component.
    pub component: String,
    /// Arguments passed to the target.
    pub args: Value,
    /// When the job is due, in milliseconds since the epoch.
    pub scheduled_time: f64,
    /// Current state.
    pub state: JobState,
    /// When the job reached a terminal state.
    pub completed_time: Option<f64>,
}

impl ScheduledJob {
    /// Decodes a job document.
    pub fn from_document(doc: &Document) -> CoreResult<Self> {
        let fields = doc.fields();
        let state = fields
            .get("state")
            .ok_or_else(|| CoreError::invalid_operation("scheduled job has no state"))?;
        Ok(Self {
            id: doc.id().clone(),
            name: doc.get_str("name").unwrap_or_default().to_string(),
            component: doc.get_str("component").unwrap_or_default().to_string(),
            args: fields.get("args").cloned().unwrap_or_else(Value::empty_object),
            scheduled_time: fields
                .get("scheduledTime")
                .and_then(Value::as_f64)
                .unwrap_or_default(),
            state: JobState::from_value(state)?,
            completed_time: fields.get("completedTime").and_then(Value::as_f64),
        })
    }
}

/// Deadlines of timers that have been armed and not yet settled.
///
/// An entry stays armed from scheduling until its job has been claimed,
/// run and recorded (or skipped). An entry whose deadline has passed is a
/// job that is due or in progress.
#[derive(Debug, Default)]
pub(crate) struct SchedulerState {
    armed: Mutex<BTreeMap<u64, Instant>>,
    settled: Notify,
    next_token: AtomicU64,
}

impl SchedulerState {
    fn arm(&self, deadline: Instant) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.armed.lock().insert(token, deadline);
        token
    }

    fn disarm(&self, token: u64) {
        if self.armed.lock().remove(&token).is_some() {
            self.settled.notify_waiters();
        }
    }

    fn has_due(&self, now: Instant) -> bool {
        self.armed.lock().values().any(|deadline| *deadline <= now)
    }

    /// Returns true when no timer is armed.
    pub(crate) fn is_idle(&self) -> bool {
        self.armed.lock().is_empty()
    }

    /// Number of armed timers.
    pub(crate) fn armed_count(&self) -> usize {
        self.armed.lock().len()
    }

    /// Latest deadline among armed timers.
    pub(crate) fn latest_deadline(&self) -> Option<Instant> {
        self.armed.lock().values().max().copied()
    }

    /// Forgets every timer. Already spawned timers notice the runtime epoch
    /// changed and exit.
    pub(crate) fn clear(&self) {
        self.armed.lock().clear();
        self.settled.notify_waiters();
    }

    /// Waits until no armed timer is due.
    pub(crate) async fn finish_in_progress(&self) {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.has_due(Instant::now()) {
                return;
            }
            notified.await;
        }
    }

    /// Alternates `advance` and [`finish_in_progress`](Self::finish_in_progress)
    /// until nothing is armed, giving up after `max_iterations` rounds.
    pub(crate) async fn finish_all<F, Fut>(&self, max_iterations: usize, mut advance: F) -> CoreResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        for _ in 0..max_iterations {
            self.finish_in_progress().await;
            if self.is_idle() {
                return Ok(());
            }
            advance().await;
        }
        self.finish_in_progress().await;
        if self.is_idle() {
            return Ok(());
        }
        error!(
            iterations = max_iterations,
            armed = self.armed_count(),
            "scheduled functions did not settle"
        );
        Err(CoreError::SchedulerRunaway {
            iterations: max_iterations,
        })
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn unix_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64() * 1000.0)
}

/// Inserts a pending job into `owner`'s store and arms its timer.
pub(crate) fn schedule(
    runtime: &Arc<Runtime>,
    owner: &Component,
    target: (String, FunctionPath),
    delay: Duration,
    args: Value,
) -> CoreResult<DocumentId> {
    let (component, path) = target;
    let kind = runtime.component(&component)?.modules().resolve(&path)?.kind();
    if !matches!(kind, FunctionKind::Mutation | FunctionKind::Action) {
        return Err(CoreError::FunctionKindMismatch {
            path: path.to_string(),
            expected: "mutation or action".to_string(),
            actual: kind.to_string(),
        });
    }

    let deadline = Instant::now().checked_add(delay).ok_or_else(|| {
        CoreError::invalid_operation(format!("delay of {}s is out of range", delay.as_secs()))
    })?;

    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), Value::from(path.to_string()));
    fields.insert("component".to_string(), Value::from(component.as_str()));
    fields.insert("args".to_string(), args);
    fields.insert(
        "scheduledTime".to_string(),
        Value::Float64(unix_millis() + delay.as_secs_f64() * 1000.0),
    );
    fields.insert("state".to_string(), JobState::Pending.to_value());
    let job = owner.store().insert_system(SCHEDULED_FUNCTIONS_TABLE, fields)?;

    let token = runtime
        .scheduler
        .arm(deadline);
    debug!(job = %job, function = %path, delay_ms = delay.as_millis() as u64, "function scheduled");
    tokio::spawn(fire(
        Arc::downgrade(runtime),
        owner.path().to_string(),
        job.clone(),
        token,
        delay,
        runtime.epoch(),
    ));
    Ok(job)
}

/// Moves a pending job to `canceled`. Jobs in any other state are left alone.
pub(crate) fn cancel(owner: &Component, job: &DocumentId) -> CoreResult<()> {
    if job.table() != SCHEDULED_FUNCTIONS_TABLE {
        return Err(CoreError::invalid_operation(format!(
            "{job} is not a scheduled function id"
        )));
    }
    let store = owner.store();
    let doc = store.get(job).ok_or_else(|| CoreError::document_not_found(job))?;
    let current = ScheduledJob::from_document(&doc)?;
    if current.state != JobState::Pending {
        debug!(job = %job, state = current.state.kind(), "cancel ignored");
        return Ok(());
    }
    store.patch_system(
        job,
        &Patch::new()
            .set("state", JobState::Canceled.to_value())
            .set("completedTime", Value::Float64(unix_millis())),
    )?;
    debug!(job = %job, "scheduled function canceled");
    Ok(())
}

async fn fire(runtime: Weak<Runtime>, owner: String, job: DocumentId, token: u64, delay: Duration, epoch: u64) {
    tokio::time::sleep(delay).await;
    let Some(runtime) = runtime.upgrade() else {
        return;
    };
    if runtime.epoch() != epoch {
        return;
    }
    if let Err(e) = run_job(&runtime, &owner, &job).await {
        error!(job = %job, error = %e, "scheduled function bookkeeping failed");
    }
    runtime.scheduler.disarm(token);
}

enum Claim {
    Missing,
    Canceled,
    Run(ScheduledJob),
}

async fn run_job(runtime: &Arc<Runtime>, owner: &str, job_id: &DocumentId) -> CoreResult<()> {
    let id = job_id.clone();
    let claim = runtime
        .system_transaction(owner, move |store| {
            let Some(doc) = store.get(&id) else {
                return Ok(Claim::Missing);
            };
            let job = ScheduledJob::from_document(&doc)?;
            match job.state {
                JobState::Canceled => Ok(Claim::Canceled),
                JobState::Pending => {
                    store.patch_system(
                        &id,
                        &Patch::new().set("state", JobState::InProgress.to_value()),
                    )?;
                    Ok(Claim::Run(job))
                }
                ref other => Err(invariant(&id, other, &JobState::Pending)),
            }
        })
        .await?;

    let job = match claim {
        Claim::Missing => {
            warn!(job = %job_id, "scheduled job not found; its scheduling transaction was rolled back");
            return Ok(());
        }
        Claim::Canceled => {
            debug!(job = %job_id, "scheduled function was canceled");
            return Ok(());
        }
        Claim::Run(job) => job,
    };

    let outcome = match FunctionPath::parse(&job.name) {
        Ok(path) => {
            runtime
                .invoke(Invocation {
                    component: job.component.clone(),
                    path,
                    expected: Expected::Scheduled,
                    args: job.args.clone(),
                    identity: None,
                    nested: false,
                })
                .await
        }
        Err(e) => Err(e),
    };
    let state = match outcome {
        Ok(_) => {
            debug!(job = %job_id, function = %job.name, "scheduled function succeeded");
            JobState::Success
        }
        Err(e) => {
            error!(job = %job_id, function = %job.name, error = %e, "scheduled function failed");
            JobState::Failed {
                error: e.to_string(),
            }
        }
    };

    let id = job_id.clone();
    runtime
        .system_transaction(owner, move |store| {
            let doc = store.get(&id).ok_or_else(|| CoreError::document_not_found(&id))?;
            let current = ScheduledJob::from_document(&doc)?;
            if current.state != JobState::InProgress {
                return Err(invariant(&id, &current.state, &JobState::InProgress));
            }
            store.patch_system(
                &id,
                &Patch::new()
                    .set("state", state.to_value())
                    .set("completedTime", Value::Float64(unix_millis())),
            )
        })
        .await
}

fn invariant(job: &DocumentId, state: &JobState, expected: &JobState) -> CoreError {
    error!(job = %job, state = state.kind(), expected = expected.kind(), "scheduled job invariant violated");
    CoreError::SchedulerInvariant {
        job: job.to_string(),
        state: state.kind().to_string(),
        expected: expected.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_document_form() {
        let failed = JobState::Failed {
            error: "boom".to_string(),
        };
        let value = failed.to_value();
        assert_eq!(value.get("kind").and_then(Value::as_str), Some("failed"));
        assert_eq!(JobState::from_value(&value).unwrap(), failed);
        assert_eq!(
            JobState::from_value(&JobState::InProgress.to_value()).unwrap(),
            JobState::InProgress
        );
        assert!(JobState::from_value(&Value::empty_object()).is_err());
        assert!(JobState::Canceled.is_terminal());
        assert!(!JobState::Pending.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn due_timers_block_until_disarmed() {
        let state = Arc::new(SchedulerState::default());
        let now = Instant::now();
        let due = state.arm(now);
        state.arm(now + Duration::from_secs(60));
        assert!(state.has_due(now));

        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.finish_in_progress().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        state.disarm(due);
        waiter.await.unwrap();
        assert!(!state.is_idle());
        assert_eq!(state.armed_count(), 1);
        assert_eq!(state.latest_deadline(), Some(now + Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn finish_all_gives_up() {
        let state = SchedulerState::default();
        state.arm(Instant::now() + Duration::from_secs(1));
        let mut rounds = 0;
        let err = state
            .finish_all(3, || {
                rounds += 1;
                async {}
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SchedulerRunaway { iterations: 3 }));
        assert_eq!(rounds, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn claim_of_a_finished_job_is_an_invariant_violation() {
        use crate::config::Config;
        use crate::functions::{mutation, Module, ModuleRegistry};
        use crate::runtime::ROOT_COMPONENT;

        let modules = ModuleRegistry::new().module("jobs", || {
            Module::new().export(
                "log",
                mutation(|ctx, _args| async move {
                    ctx.db.insert("logs", Value::empty_object())?;
                    Ok(Value::Null)
                }),
            )
        });
        let runtime = Runtime::new(Config::default(), None, modules);
        let root = runtime.component(ROOT_COMPONENT).unwrap();

        let job = {
            let rt = Arc::clone(&runtime);
            let owner = Arc::clone(&root);
            runtime
                .transact(false, false, async move {
                    let target = (ROOT_COMPONENT.to_string(), FunctionPath::parse("jobs:log")?);
                    schedule(&rt, &owner, target, Duration::from_secs(1), Value::empty_object())
                })
                .await
                .unwrap()
        };
        let id = job.clone();
        runtime
            .system_transaction(ROOT_COMPONENT, move |store| {
                store.patch_system(&id, &Patch::new().set("state", JobState::Success.to_value()))
            })
            .await
            .unwrap();

        let err = run_job(&runtime, ROOT_COMPONENT, &job).await.unwrap_err();
        assert!(matches!(err, CoreError::SchedulerInvariant { .. }), "{err}");

        // the timer hits the same violation, logs it and settles
        tokio::time::advance(Duration::from_secs(1)).await;
        runtime.scheduler.finish_in_progress().await;
        assert!(runtime.scheduler.is_idle());

        let row = ScheduledJob::from_document(&root.store().get(&job).unwrap()).unwrap();
        assert_eq!(row.state, JobState::Success);
        assert!(root.store().table_documents("logs").is_empty());
        assert!(!runtime.transaction_in_progress());
    }

    #[tokio::test]
    async fn finish_all_returns_when_idle() {
        let state = SchedulerState::default();
        state.finish_all(1, || async {}).await.unwrap();
        state.clear();
        assert!(state.is_idle());
    }
}
