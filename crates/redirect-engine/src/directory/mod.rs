//! # Employee Directory
//!
//! Read-only view of the people a ticket can be redirected to. The matcher
//! works on a snapshot taken at the start of a redirect attempt; the
//! coordinator re-checks the chosen candidate with [`EmployeeDirectory::lookup`]
//! right before committing, since availability can change mid-call.
//!
//! ## Examples
//!
//! ```rust
//! use deskcall_redirect_engine::directory::{
//!     AvailabilityStatus, EmployeeDirectory, EmployeeRecord, InMemoryDirectory,
//! };
//!
//! # tokio_test::block_on(async {
//! let directory = InMemoryDirectory::new();
//! directory.upsert(
//!     EmployeeRecord::new("omar", "DevOps Engineer")
//!         .with_expertise("kubernetes, deployment pipelines, monitoring"),
//! );
//!
//! let snapshot = directory.snapshot().await.unwrap();
//! assert_eq!(snapshot.len(), 1);
//! assert_eq!(snapshot[0].availability_status, AvailabilityStatus::Available);
//! # });
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RedirectError, Result};

/// Employee availability as reported by the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    #[default]
    #[serde(alias = "Available")]
    Available,
    #[serde(alias = "Busy")]
    Busy,
    #[serde(alias = "Offline")]
    Offline,
}

impl AvailabilityStatus {
    /// Contribution to the availability scoring factor
    pub fn score_factor(&self) -> f64 {
        match self {
            AvailabilityStatus::Available => 1.0,
            AvailabilityStatus::Busy => 0.5,
            AvailabilityStatus::Offline => 0.0,
        }
    }

    /// Ordering used to break score ties, lower is better
    pub fn rank(&self) -> u8 {
        match self {
            AvailabilityStatus::Available => 0,
            AvailabilityStatus::Busy => 1,
            AvailabilityStatus::Offline => 2,
        }
    }

    pub fn is_reachable(&self) -> bool {
        !matches!(self, AvailabilityStatus::Offline)
    }
}

impl FromStr for AvailabilityStatus {
    type Err = RedirectError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" | "online" | "idle" => Ok(AvailabilityStatus::Available),
            "busy" | "on_call" | "away" => Ok(AvailabilityStatus::Busy),
            "offline" | "unavailable" => Ok(AvailabilityStatus::Offline),
            other => Err(RedirectError::invalid_input(format!(
                "unknown availability status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AvailabilityStatus::Available => "available",
            AvailabilityStatus::Busy => "busy",
            AvailabilityStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// One employee as seen by the matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    /// Unique, case-insensitive identifier
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub expertise_text: String,
    #[serde(default)]
    pub responsibilities_text: String,
    #[serde(default)]
    pub availability_status: AvailabilityStatus,
    #[serde(default)]
    pub current_workload: u32,
}

impl EmployeeRecord {
    pub fn new(username: impl Into<String>, role: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            full_name: username.clone(),
            username,
            role: role.into(),
            expertise_text: String::new(),
            responsibilities_text: String::new(),
            availability_status: AvailabilityStatus::Available,
            current_workload: 0,
        }
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }

    pub fn with_expertise(mut self, expertise: impl Into<String>) -> Self {
        self.expertise_text = expertise.into();
        self
    }

    pub fn with_responsibilities(mut self, responsibilities: impl Into<String>) -> Self {
        self.responsibilities_text = responsibilities.into();
        self
    }

    pub fn with_status(mut self, status: AvailabilityStatus) -> Self {
        self.availability_status = status;
        self
    }

    pub fn with_workload(mut self, workload: u32) -> Self {
        self.current_workload = workload;
        self
    }

    /// Directory key for this record
    pub fn key(&self) -> String {
        self.username.to_lowercase()
    }
}

/// Source of employee records
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    /// All employees, in a stable order
    ///
    /// Fails with [`RedirectError::DirectoryUnavailable`] when the directory
    /// cannot be reached.
    async fn snapshot(&self) -> Result<Vec<EmployeeRecord>>;

    /// Fresh record for one employee
    async fn lookup(&self, username: &str) -> Result<Option<EmployeeRecord>>;
}

/// Directory held in memory, keyed by lowercased username
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    employees: Arc<DashMap<String, EmployeeRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = EmployeeRecord>) -> Self {
        let directory = Self::new();
        for record in records {
            directory.upsert(record);
        }
        directory
    }

    /// Load a JSON array of employee records
    pub fn from_json_str(source: &str) -> Result<Self> {
        let records: Vec<EmployeeRecord> = serde_json::from_str(source)
            .map_err(|e| RedirectError::invalid_input(format!("invalid directory JSON: {}", e)))?;
        Ok(Self::from_records(records))
    }

    pub fn upsert(&self, record: EmployeeRecord) {
        debug!(
            username = %record.username,
            status = %record.availability_status,
            "directory upsert"
        );
        self.employees.insert(record.key(), record);
    }

    /// Change an employee's availability; `false` when the employee is unknown
    pub fn set_status(&self, username: &str, status: AvailabilityStatus) -> bool {
        match self.employees.get_mut(&username.to_lowercase()) {
            Some(mut record) => {
                record.availability_status = status;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, username: &str) -> Option<EmployeeRecord> {
        self.employees
            .remove(&username.to_lowercase())
            .map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.employees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }
}

#[async_trait]
impl EmployeeDirectory for InMemoryDirectory {
    async fn snapshot(&self) -> Result<Vec<EmployeeRecord>> {
        let mut records: Vec<EmployeeRecord> =
            self.employees.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(records)
    }

    async fn lookup(&self, username: &str) -> Result<Option<EmployeeRecord>> {
        Ok(self
            .employees
            .get(&username.to_lowercase())
            .map(|entry| entry.value().clone()))
    }
}
