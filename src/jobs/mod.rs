//! Background jobs: lifecycle, execution and registry.
//!
//! Core components:
//! - `state`: Status machine (Submitted → Running ⇄ Halted → Stopped)
//! - `signal`: Control messages delivered to a running job
//! - `kind`: Job types and validated submission arguments
//! - `workload`: Per-variant unit of work (Simple, Export)
//! - `job`: Lifecycle contract and the per-job execution task
//! - `registry`: Concurrency-safe map of live jobs
//! - `controller`: Lifecycle orchestration for the request layer

pub mod controller;
pub mod job;
pub mod kind;
pub mod registry;
pub mod signal;
pub mod state;
pub mod workload;

pub use controller::JobController;
pub use job::{Job, JobDetails, JobHandle};
pub use kind::{JobKind, JobSpec, SubmitRequest};
pub use registry::{JobRegistry, RegistrySummary};
pub use state::{Action, JobStatus, StateTransition};
pub use workload::{ExportWork, JobFields, SimpleWork, Workload};
