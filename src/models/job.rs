use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    Health,
    Test,
    Warmup,
    Rotation,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Health => "health",
            JobType::Test => "test",
            JobType::Warmup => "warmup",
            JobType::Rotation => "rotation",
        }
    }

    pub fn all() -> [JobType; 4] {
        [JobType::Health, JobType::Test, JobType::Warmup, JobType::Rotation]
    }

    /// Max concurrent workers per queue (spec §4.4).
    pub fn concurrency(&self) -> usize {
        match self {
            JobType::Health => 5,
            JobType::Test => 3,
            JobType::Warmup => 2,
            JobType::Rotation => 1,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High = 1,
    Medium = 2,
    Low = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
}

/// A unit of deferred work (spec §3). `target_id` is a domain id for
/// per-domain jobs or a pool id for sweep jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    pub target_id: String,
    pub priority: Priority,
    pub attempt: u32,
    pub not_before: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        job_type: JobType,
        target_id: impl Into<String>,
        priority: Priority,
        not_before: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            job_type,
            target_id: target_id.into(),
            priority,
            attempt: 0,
            not_before,
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobLogStatus {
    Success,
    Failed,
    Retry,
}

/// Audit record per job attempt (spec §3). TTL 30 days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub job_id: String,
    pub job_type: JobType,
    pub status: JobLogStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub const JOB_LOG_TTL_DAYS: i64 = 30;
