//! Variant-specific work performed by an execution task.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;
use tracing::{debug, info};
use uuid::Uuid;

use super::kind::{JobKind, format_date, serialize_date};

/// Observable, variant-specific part of a job's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum JobFields {
    Simple {
        ticks: u64,
    },
    Export {
        #[serde(serialize_with = "serialize_date")]
        #[schema(value_type = String, example = "2020-Jan-01")]
        from_date: NaiveDate,
        #[serde(serialize_with = "serialize_date")]
        #[schema(value_type = String, example = "2020-Jan-04")]
        to_date: NaiveDate,
        #[serde(serialize_with = "serialize_date")]
        #[schema(value_type = String, example = "2020-Jan-02")]
        cursor_date: NaiveDate,
        exported_days: u64,
        complete: bool,
    },
}

/// One kind of work a job can do.
///
/// `step` is called at most once per tick and only while the job is Running.
/// It must return in bounded time: the task cannot observe signals while a
/// step is in progress.
#[async_trait]
pub trait Workload: Send + 'static {
    fn kind(&self) -> JobKind;

    /// Perform one unit of work, or nothing if there is none left.
    async fn step(&mut self, job_id: Uuid);

    fn fields(&self) -> JobFields;
}

/// Placeholder work: one log line per tick.
#[derive(Debug, Default)]
pub struct SimpleWork {
    ticks: u64,
}

impl SimpleWork {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Workload for SimpleWork {
    fn kind(&self) -> JobKind {
        JobKind::Simple
    }

    async fn step(&mut self, job_id: Uuid) {
        self.ticks += 1;
        info!(job_id = %job_id, tick = self.ticks, "Doing job");
    }

    fn fields(&self) -> JobFields {
        JobFields::Simple { ticks: self.ticks }
    }
}

/// Exports one day of data per tick for every day strictly between
/// `from_date` and `to_date`.
#[derive(Debug)]
pub struct ExportWork {
    from_date: NaiveDate,
    to_date: NaiveDate,
    cursor_date: NaiveDate,
    exported_days: u64,
}

impl ExportWork {
    /// Callers validate `from_date < to_date` beforehand (see `JobSpec::export`).
    pub fn new(from_date: NaiveDate, to_date: NaiveDate) -> Self {
        Self {
            from_date,
            to_date,
            cursor_date: from_date.succ_opt().unwrap_or(from_date),
            exported_days: 0,
        }
    }

    fn in_range(&self) -> bool {
        self.from_date < self.cursor_date && self.cursor_date < self.to_date
    }
}

#[async_trait]
impl Workload for ExportWork {
    fn kind(&self) -> JobKind {
        JobKind::Export
    }

    async fn step(&mut self, job_id: Uuid) {
        if !self.in_range() {
            debug!(job_id = %job_id, "Export range exhausted, idling");
            return;
        }

        info!(
            job_id = %job_id,
            date = %format_date(self.cursor_date),
            "Exporting data"
        );
        self.exported_days += 1;

        match self.cursor_date.succ_opt() {
            Some(next) => self.cursor_date = next,
            // End of the calendar; nothing left to advance into.
            None => self.cursor_date = self.to_date,
        }
    }

    fn fields(&self) -> JobFields {
        JobFields::Export {
            from_date: self.from_date,
            to_date: self.to_date,
            cursor_date: self.cursor_date,
            exported_days: self.exported_days,
            complete: !self.in_range(),
        }
    }
}
