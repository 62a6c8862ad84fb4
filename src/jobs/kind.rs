//! Job type tags and submission arguments.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use utoipa::ToSchema;

use crate::error::JobError;

/// Calendar date layout used on the wire, e.g. `2020-Jan-05`.
pub const DATE_LAYOUT: &str = "%Y-%b-%d";

/// Known job variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
pub enum JobKind {
    Simple,
    Export,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "Simple"),
            Self::Export => write!(f, "Export"),
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Simple" => Ok(Self::Simple),
            "Export" => Ok(Self::Export),
            _ => Err(JobError::validation("Invalid Job Type")),
        }
    }
}

/// Raw submission as it arrives from the request layer.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SubmitRequest {
    /// `Simple` or `Export`.
    #[serde(rename = "Type")]
    #[schema(example = "Export")]
    pub job_type: String,
    /// Variant arguments. Export takes `from_date` and `to_date`.
    #[serde(default)]
    #[schema(value_type = Object, example = json!({"from_date": "2020-Jan-01", "to_date": "2020-Jan-04"}))]
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl SubmitRequest {
    pub fn simple() -> Self {
        Self {
            job_type: JobKind::Simple.to_string(),
            args: Default::default(),
        }
    }

    pub fn export(from_date: &str, to_date: &str) -> Self {
        let mut args = serde_json::Map::new();
        args.insert("from_date".into(), from_date.into());
        args.insert("to_date".into(), to_date.into());
        Self {
            job_type: JobKind::Export.to_string(),
            args,
        }
    }
}

/// A validated job description. Only this type reaches the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSpec {
    Simple,
    Export { from_date: NaiveDate, to_date: NaiveDate },
}

impl JobSpec {
    /// Build an export spec, requiring `from_date` strictly before `to_date`.
    pub fn export(from_date: NaiveDate, to_date: NaiveDate) -> Result<Self, JobError> {
        if from_date >= to_date {
            return Err(JobError::validation("from_date must be before to_date"));
        }
        Ok(Self::Export { from_date, to_date })
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Self::Simple => JobKind::Simple,
            Self::Export { .. } => JobKind::Export,
        }
    }
}

impl TryFrom<&SubmitRequest> for JobSpec {
    type Error = JobError;

    fn try_from(request: &SubmitRequest) -> Result<Self, Self::Error> {
        match request.job_type.parse::<JobKind>()? {
            JobKind::Simple => Ok(Self::Simple),
            JobKind::Export => {
                let from_date = date_arg(&request.args, "from_date")?;
                let to_date = date_arg(&request.args, "to_date")?;
                Self::export(from_date, to_date)
            }
        }
    }
}

fn date_arg(
    args: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<NaiveDate, JobError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .and_then(|raw| parse_date(raw).ok())
        .ok_or_else(|| JobError::validation(format!("Invalid {key} format")))
}

/// Parse a date in [`DATE_LAYOUT`].
pub fn parse_date(raw: &str) -> chrono::ParseResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_LAYOUT)
}

/// Format a date in [`DATE_LAYOUT`].
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_LAYOUT).to_string()
}

/// Serialize a date in [`DATE_LAYOUT`].
pub fn serialize_date<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_date(*date))
}
