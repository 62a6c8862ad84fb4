//! Job lifecycle contract and the per-job execution task.
//!
//! A [`JobHandle`] is what the registry stores and callers talk to. The
//! [`Executor`] it spawns on `start` is the only writer of the job's status
//! and fields: it publishes snapshots through a `watch` channel and takes
//! instructions through the control channel in [`super::signal`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::kind::JobKind;
use super::signal::{self, ControlMessage, DeliveryError, Signal, SignalSender};
use super::state::{Action, JobStatus, MAX_TRANSITIONS, StateTransition};
use super::workload::{JobFields, Workload};
use crate::config::JobSettings;
use crate::error::JobError;

/// Capabilities every job variant offers.
#[async_trait]
pub trait Job: Send + Sync {
    fn id(&self) -> Uuid;

    fn kind(&self) -> JobKind;

    /// Spawn the execution task. Valid only from Submitted.
    async fn start(&self) -> Result<(), JobError>;

    /// Valid only from Running.
    async fn halt(&self) -> Result<(), JobError>;

    /// Valid only from Halted. The existing task picks its work loop back up.
    async fn resume(&self) -> Result<(), JobError>;

    /// Valid from Running or Halted; a no-op once Stopped.
    async fn stop(&self) -> Result<(), JobError>;

    /// Release what the job holds. Valid once Stopped, any number of times.
    async fn clean(&self) -> Result<(), JobError>;

    /// Latest published snapshot. Never waits on the execution task.
    fn details(&self) -> JobDetails;
}

/// Everything the execution task publishes.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub fields: JobFields,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub transitions: Vec<StateTransition>,
}

/// Public view of a job.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobDetails {
    #[serde(rename = "jobID")]
    pub job_id: Uuid,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: JobFields,
    pub transitions: Vec<StateTransition>,
}

/// A job over some [`Workload`].
pub struct JobHandle<W: Workload> {
    id: Uuid,
    kind: JobKind,
    created_at: DateTime<Utc>,
    signals: SignalSender,
    snapshot: watch::Receiver<JobSnapshot>,
    /// Present until `start` moves it onto its own task.
    pending: Mutex<Option<Executor<W>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    signal_timeout: Duration,
}

impl<W: Workload> JobHandle<W> {
    /// Create a job in Submitted state. Nothing runs until `start`.
    pub fn new(id: Uuid, workload: W, settings: &JobSettings) -> Self {
        let now = Utc::now();
        let (signals, control) = signal::channel(settings.signal_buffer, settings.signal_timeout);
        let (status_tx, snapshot) = watch::channel(JobSnapshot {
            status: JobStatus::Submitted,
            fields: workload.fields(),
            started_at: None,
            updated_at: now,
            transitions: Vec::new(),
        });

        Self {
            id,
            kind: workload.kind(),
            created_at: now,
            signals,
            snapshot,
            pending: Mutex::new(Some(Executor {
                id,
                workload,
                control,
                status_tx,
                status: JobStatus::Submitted,
                tick: settings.tick_interval,
            })),
            task: Mutex::new(None),
            signal_timeout: settings.signal_timeout,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.snapshot.borrow().status
    }

    fn invalid(&self, status: JobStatus, action: Action) -> JobError {
        JobError::InvalidTransition {
            id: self.id,
            status,
            action,
        }
    }

    /// Send a signal and translate the task's answer.
    async fn signal(&self, signal: Signal, action: Action) -> Result<JobStatus, JobError> {
        // Read-only precheck: a Submitted job has no task to answer.
        let current = self.status();
        if current == JobStatus::Submitted {
            return Err(self.invalid(current, action));
        }

        debug!(job_id = %self.id, ?signal, "Delivering signal");
        let rejected = |status: JobStatus| {
            // Stopping a stopped job is a no-op, not an error.
            if signal == Signal::Stop && status.is_terminal() {
                Ok(status)
            } else {
                Err(self.invalid(status, action))
            }
        };

        match self.signals.deliver(signal).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(status)) => rejected(status),
            // The task has exited; its last snapshot is final.
            Err(DeliveryError::Closed) => rejected(self.status()),
            Err(DeliveryError::TimedOut) => Err(JobError::Unresponsive {
                id: self.id,
                action,
                waited: self.signals.timeout(),
            }),
        }
    }
}

#[async_trait]
impl<W: Workload> Job for JobHandle<W> {
    fn id(&self) -> Uuid {
        self.id
    }

    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn start(&self) -> Result<(), JobError> {
        let executor = self.pending.lock().await.take();
        let Some(executor) = executor else {
            // Another start took the executor and may not have published
            // Running yet. Report the status it settles on.
            let mut snapshot = self.snapshot.clone();
            let settled = timeout(
                self.signal_timeout,
                snapshot.wait_for(|s| s.status != JobStatus::Submitted),
            )
            .await
            .ok()
            .and_then(|seen| seen.ok().map(|s| s.status));
            return Err(self.invalid(settled.unwrap_or(JobStatus::Running), Action::Start));
        };

        let handle = tokio::spawn(executor.run());
        *self.task.lock().await = Some(handle);

        // Wait for the task to publish Running so callers see it immediately.
        let mut snapshot = self.snapshot.clone();
        let published = timeout(
            self.signal_timeout,
            snapshot.wait_for(|s| s.status != JobStatus::Submitted),
        )
        .await
        .is_ok();

        if !published {
            return Err(JobError::Unresponsive {
                id: self.id,
                action: Action::Start,
                waited: self.signal_timeout,
            });
        }
        info!(job_id = %self.id, kind = %self.kind, "Job started");
        Ok(())
    }

    async fn halt(&self) -> Result<(), JobError> {
        self.signal(Signal::Halt, Action::Halt).await?;
        info!(job_id = %self.id, "Job halted");
        Ok(())
    }

    async fn resume(&self) -> Result<(), JobError> {
        self.signal(Signal::Resume, Action::Resume).await?;
        info!(job_id = %self.id, "Job resumed");
        Ok(())
    }

    async fn stop(&self) -> Result<(), JobError> {
        self.signal(Signal::Stop, Action::Stop).await?;
        info!(job_id = %self.id, "Job stopped");
        Ok(())
    }

    async fn clean(&self) -> Result<(), JobError> {
        let status = self.status();
        if !status.is_terminal() {
            return Err(self.invalid(status, Action::Clean));
        }

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            // The task exits right after publishing Stopped; only its drain remains.
            match timeout(self.signal_timeout, handle).await {
                Ok(Ok(())) => debug!(job_id = %self.id, "Execution task joined"),
                Ok(Err(e)) => warn!(job_id = %self.id, error = %e, "Execution task ended abnormally"),
                Err(_) => {
                    warn!(job_id = %self.id, "Execution task did not exit in time");
                }
            }
        }
        Ok(())
    }

    fn details(&self) -> JobDetails {
        let snapshot = self.snapshot.borrow().clone();
        JobDetails {
            job_id: self.id,
            kind: self.kind,
            status: snapshot.status,
            created_at: self.created_at,
            started_at: snapshot.started_at,
            updated_at: snapshot.updated_at,
            fields: snapshot.fields,
            transitions: snapshot.transitions,
        }
    }
}

/// Whether the execution loop keeps going after handling a signal.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// The per-job execution task.
struct Executor<W: Workload> {
    id: Uuid,
    workload: W,
    control: mpsc::Receiver<ControlMessage>,
    status_tx: watch::Sender<JobSnapshot>,
    status: JobStatus,
    tick: Duration,
}

impl<W: Workload> Executor<W> {
    async fn run(mut self) {
        self.transition(JobStatus::Running, "started");

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                message = self.control.recv() => {
                    let Some(message) = message else {
                        // Every handle is gone; nobody can stop us any more.
                        self.transition(JobStatus::Stopped, "job handle dropped");
                        break;
                    };
                    if self.handle(message) == Flow::Exit {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if self.status == JobStatus::Running {
                        self.workload.step(self.id).await;
                        self.publish();
                    }
                }
            }
        }

        self.drain().await;
        debug!(job_id = %self.id, "Execution task exited");
    }

    fn handle(&mut self, message: ControlMessage) -> Flow {
        let target = message.signal.target();
        if !self.status.can_transition_to(target) {
            debug!(
                job_id = %self.id,
                signal = ?message.signal,
                status = %self.status,
                "Rejecting signal"
            );
            message.respond(Err(self.status));
            return Flow::Continue;
        }

        let reason = match message.signal {
            Signal::Halt => "halt signal",
            Signal::Resume => "resume signal",
            Signal::Stop => "stop signal",
        };
        self.transition(target, reason);
        message.respond(Ok(target));

        if target == JobStatus::Stopped {
            Flow::Exit
        } else {
            Flow::Continue
        }
    }

    /// Refuse everything still queued after Stop.
    async fn drain(&mut self) {
        self.control.close();
        while let Some(message) = self.control.recv().await {
            message.respond(Err(JobStatus::Stopped));
        }
    }

    fn transition(&mut self, to: JobStatus, reason: &str) {
        let from = self.status;
        self.status = to;
        let now = Utc::now();
        let fields = self.workload.fields();

        self.status_tx.send_modify(|snapshot| {
            snapshot.transitions.push(StateTransition {
                from,
                to,
                timestamp: now,
                reason: Some(reason.to_string()),
            });
            if snapshot.transitions.len() > MAX_TRANSITIONS {
                let excess = snapshot.transitions.len() - MAX_TRANSITIONS;
                snapshot.transitions.drain(..excess);
            }
            if to == JobStatus::Running && snapshot.started_at.is_none() {
                snapshot.started_at = Some(now);
            }
            snapshot.status = to;
            snapshot.fields = fields;
            snapshot.updated_at = now;
        });
    }

    fn publish(&self) {
        let fields = self.workload.fields();
        self.status_tx.send_modify(|snapshot| {
            snapshot.fields = fields;
            snapshot.updated_at = Utc::now();
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::jobs::workload::{ExportWork, SimpleWork};

    fn settings() -> JobSettings {
        JobSettings {
            tick_interval: Duration::from_millis(10),
            signal_timeout: Duration::from_secs(1),
            signal_buffer: 8,
        }
    }

    fn simple() -> JobHandle<SimpleWork> {
        JobHandle::new(Uuid::new_v4(), SimpleWork::new(), &settings())
    }

    fn ticks(job: &dyn Job) -> u64 {
        match job.details().fields {
            JobFields::Simple { ticks } => ticks,
            other => panic!("expected simple fields, got {other:?}"),
        }
    }

    /// Poll `details` until `pred` holds, failing after a couple of seconds.
    async fn wait_until(job: &dyn Job, pred: impl Fn(&JobDetails) -> bool) -> JobDetails {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let details = job.details();
            if pred(&details) {
                return details;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached, last details: {details:?}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn assert_invalid(result: Result<(), JobError>, expected: JobStatus) {
        match result {
            Err(JobError::InvalidTransition { status, .. }) => assert_eq!(status, expected),
            other => panic!("expected InvalidTransition from {expected}, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn new_job_is_submitted() {
        let job = simple();
        let details = job.details();
        assert_eq!(details.status, JobStatus::Submitted);
        assert!(details.started_at.is_none());
        assert_eq!(details.kind, JobKind::Simple);
    }

    #[tokio::test]
    async fn start_reports_running_immediately() {
        let job = simple();
        job.start().await.unwrap();
        let details = job.details();
        assert_eq!(details.status, JobStatus::Running);
        assert!(details.started_at.is_some());
        job.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let job = simple();
        job.start().await.unwrap();
        assert_invalid(job.start().await, JobStatus::Running);
        job.stop().await.unwrap();
    }

    #[tokio::test]
    async fn racing_starts_report_running_to_the_loser() {
        for _ in 0..20 {
            let job = Arc::new(simple());
            let starts: Vec<_> = (0..2)
                .map(|_| {
                    let job = Arc::clone(&job);
                    tokio::spawn(async move { job.start().await })
                })
                .collect();

            let mut results = Vec::new();
            for start in starts {
                results.push(start.await.unwrap());
            }
            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            let loser = results.into_iter().find(|r| r.is_err()).unwrap();
            assert_invalid(loser, JobStatus::Running);
            job.stop().await.unwrap();
        }
    }

    #[tokio::test]
    async fn signals_before_start_are_invalid() {
        let job = simple();
        assert_invalid(job.halt().await, JobStatus::Submitted);
        assert_invalid(job.resume().await, JobStatus::Submitted);
        assert_invalid(job.stop().await, JobStatus::Submitted);
        assert_invalid(job.clean().await, JobStatus::Submitted);
        assert_eq!(job.status(), JobStatus::Submitted);
    }

    #[tokio::test]
    async fn halt_and_resume_reuse_the_same_task() {
        let job = simple();
        job.start().await.unwrap();
        wait_until(&job, |d| matches!(d.fields, JobFields::Simple { ticks } if ticks >= 2)).await;

        job.halt().await.unwrap();
        assert_eq!(job.status(), JobStatus::Halted);
        assert_invalid(job.halt().await, JobStatus::Halted);

        let halted_at = ticks(&job);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(ticks(&job), halted_at, "halted job must not produce work");

        job.resume().await.unwrap();
        assert_eq!(job.status(), JobStatus::Running);
        wait_until(&job, |d| {
            matches!(d.fields, JobFields::Simple { ticks } if ticks >= halted_at + 2)
        })
        .await;

        // The same task answers the stop.
        job.stop().await.unwrap();
        job.clean().await.unwrap();
        assert!(job.task.lock().await.is_none());
    }

    #[tokio::test]
    async fn resume_requires_halted() {
        let job = simple();
        job.start().await.unwrap();
        assert_invalid(job.resume().await, JobStatus::Running);
        job.stop().await.unwrap();
        assert_invalid(job.resume().await, JobStatus::Stopped);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_final() {
        let job = simple();
        job.start().await.unwrap();
        job.halt().await.unwrap();
        job.stop().await.unwrap();
        assert_eq!(job.status(), JobStatus::Stopped);

        job.stop().await.unwrap();
        assert_invalid(job.halt().await, JobStatus::Stopped);
        assert_invalid(job.resume().await, JobStatus::Stopped);
        assert_invalid(job.start().await, JobStatus::Stopped);

        job.clean().await.unwrap();
        job.clean().await.unwrap();
    }

    #[tokio::test]
    async fn stopped_job_produces_no_more_work() {
        let job = simple();
        job.start().await.unwrap();
        wait_until(&job, |d| matches!(d.fields, JobFields::Simple { ticks } if ticks >= 1)).await;
        job.stop().await.unwrap();
        let final_ticks = ticks(&job);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks(&job), final_ticks);
    }

    #[tokio::test]
    async fn concurrent_halt_and_stop_settle_on_stopped() {
        for _ in 0..20 {
            let job = Arc::new(simple());
            job.start().await.unwrap();

            let halter = {
                let job = Arc::clone(&job);
                tokio::spawn(async move { job.halt().await })
            };
            let stopper = {
                let job = Arc::clone(&job);
                tokio::spawn(async move { job.stop().await })
            };

            let (halted, stopped) = tokio::join!(halter, stopper);
            stopped.unwrap().unwrap();
            match halted.unwrap() {
                Ok(()) => {}
                Err(JobError::InvalidTransition { status, .. }) => {
                    assert_eq!(status, JobStatus::Stopped)
                }
                Err(other) => panic!("unexpected halt error: {other:?}"),
            }
            assert_eq!(job.status(), JobStatus::Stopped);
        }
    }

    #[tokio::test]
    async fn dropped_handle_stops_task() {
        let job = simple();
        job.start().await.unwrap();
        let mut snapshot = job.snapshot.clone();
        drop(job);

        let seen = timeout(
            Duration::from_secs(1),
            snapshot.wait_for(|s| s.status == JobStatus::Stopped),
        )
        .await;
        assert!(matches!(seen, Ok(Ok(_))));
    }

    #[tokio::test]
    async fn export_job_runs_to_completion() {
        let from = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2020, 1, 4).unwrap();
        let job = JobHandle::new(Uuid::new_v4(), ExportWork::new(from, to), &settings());
        assert_eq!(job.kind(), JobKind::Export);

        job.start().await.unwrap();
        let details = wait_until(&job, |d| {
            matches!(d.fields, JobFields::Export { complete: true, .. })
        })
        .await;

        match details.fields {
            JobFields::Export {
                cursor_date,
                exported_days,
                ..
            } => {
                assert_eq!(cursor_date, NaiveDate::from_ymd_opt(2020, 1, 4).unwrap());
                assert_eq!(exported_days, 2);
            }
            other => panic!("expected export fields, got {other:?}"),
        }
        assert_eq!(details.status, JobStatus::Running);

        // Idles without exporting anything further.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            job.details().fields,
            JobFields::Export { exported_days: 2, .. }
        ));
        job.stop().await.unwrap();
    }

    #[tokio::test]
    async fn transition_history_is_recorded() {
        let job = simple();
        job.start().await.unwrap();
        job.halt().await.unwrap();
        job.resume().await.unwrap();
        job.stop().await.unwrap();

        let history: Vec<(JobStatus, JobStatus)> = job
            .details()
            .transitions
            .iter()
            .map(|t| (t.from, t.to))
            .collect();
        assert_eq!(
            history,
            vec![
                (JobStatus::Submitted, JobStatus::Running),
                (JobStatus::Running, JobStatus::Halted),
                (JobStatus::Halted, JobStatus::Running),
                (JobStatus::Running, JobStatus::Stopped),
            ]
        );
    }

    #[tokio::test]
    async fn details_serialize_with_wire_keys() {
        let job = simple();
        let json = serde_json::to_value(job.details()).unwrap();
        assert_eq!(json["jobID"], job.id().to_string());
        assert_eq!(json["status"], "Submitted");
        assert_eq!(json["type"], "Simple");
        assert_eq!(json["ticks"], 0);
    }
}
