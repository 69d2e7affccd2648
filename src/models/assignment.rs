use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::complaint::ComplaintStatus;
use crate::timestamp;

/// The assigned agent's own view of the work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentStatus {
    Assigned,
    InProgress,
    Resolved,
    Closed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::InProgress => "in-progress",
            AssignmentStatus::Resolved => "resolved",
            AssignmentStatus::Closed => "closed",
        }
    }

    /// Ledger statuses that still count against an agent's workload.
    pub fn active() -> [&'static str; 2] {
        [
            AssignmentStatus::Assigned.as_str(),
            AssignmentStatus::InProgress.as_str(),
        ]
    }

    /// `open` has no ledger counterpart.
    pub fn from_complaint(status: ComplaintStatus) -> Option<Self> {
        match status {
            ComplaintStatus::Open => None,
            ComplaintStatus::Assigned => Some(AssignmentStatus::Assigned),
            ComplaintStatus::InProgress => Some(AssignmentStatus::InProgress),
            ComplaintStatus::Resolved => Some(AssignmentStatus::Resolved),
            ComplaintStatus::Closed => Some(AssignmentStatus::Closed),
        }
    }
}

impl From<AssignmentStatus> for ComplaintStatus {
    fn from(status: AssignmentStatus) -> Self {
        match status {
            AssignmentStatus::Assigned => ComplaintStatus::Assigned,
            AssignmentStatus::InProgress => ComplaintStatus::InProgress,
            AssignmentStatus::Resolved => ComplaintStatus::Resolved,
            AssignmentStatus::Closed => ComplaintStatus::Closed,
        }
    }
}

impl FromStr for AssignmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(AssignmentStatus::Assigned),
            "in-progress" => Ok(AssignmentStatus::InProgress),
            "resolved" => Ok(AssignmentStatus::Resolved),
            "closed" => Ok(AssignmentStatus::Closed),
            other => Err(format!("Unknown assignment status '{}'", other)),
        }
    }
}

/// Ledger entry (`assigned_complaint` collection). One per complaint,
/// keyed by `complaintId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedComplaint {
    #[serde(rename = "_id")]
    pub id: String,
    pub complaint_id: String,
    pub agent_id: String,
    /// Snapshot taken at assignment time.
    pub agent_name: String,
    pub status: AssignmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(with = "timestamp")]
    pub assigned_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_ledger_status_maps_onto_a_complaint_status() {
        for status in [
            AssignmentStatus::Assigned,
            AssignmentStatus::InProgress,
            AssignmentStatus::Resolved,
            AssignmentStatus::Closed,
        ] {
            let complaint: ComplaintStatus = status.into();
            assert_eq!(complaint.as_str(), status.as_str());
            assert_eq!(AssignmentStatus::from_complaint(complaint), Some(status));
        }
        assert_eq!(AssignmentStatus::from_complaint(ComplaintStatus::Open), None);
    }

    #[test]
    fn open_is_not_a_ledger_status() {
        assert!("open".parse::<AssignmentStatus>().is_err());
    }
}
