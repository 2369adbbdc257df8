//! Followup entity type - one stage-scoped action within a case's timeline

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::identity::{RecordId, RecordPrefix, TenantId};

/// Completion state of a stage followup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    /// Open; at most one per case at a time
    #[serde(rename = "pending")]
    Pending,
    /// Resolved on time
    #[serde(rename = "done")]
    Done,
    /// Resolved after its deadline, with the overdue state acknowledged
    #[serde(rename = "overdue-acknowledged")]
    OverdueAcknowledged,
}

impl Default for StageStatus {
    fn default() -> Self {
        StageStatus::Pending
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Done => write!(f, "done"),
            StageStatus::OverdueAcknowledged => write!(f, "overdue-acknowledged"),
        }
    }
}

impl std::str::FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(StageStatus::Pending),
            "done" => Ok(StageStatus::Done),
            "overdue-acknowledged" | "overdue_acknowledged" => Ok(StageStatus::OverdueAcknowledged),
            _ => Err(format!(
                "Estado de etapa inválido: {}. Use pending, done u overdue-acknowledged",
                s
            )),
        }
    }
}

/// A stage followup record owned by exactly one case.
///
/// Followups are historical record: closing (or even archiving) the case
/// never deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Followup {
    /// Unique identifier
    pub id: RecordId,

    /// Owning case
    pub case_id: RecordId,

    /// Tenant scope, denormalized for isolation filters
    pub tenant_id: TenantId,

    /// Key into the SLA registry (indagacion, citacion, ...)
    pub process_stage: String,

    /// Kind of action taken in this stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,

    /// Date the stage action was started
    pub action_date: NaiveDate,

    /// Deadline computed from action_date plus the stage SLA at open time;
    /// later SLA edits never rewrite it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,

    /// Person responsible for the stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible: Option<String>,

    /// Free-text observations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,

    /// Additional detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Completion state
    #[serde(default)]
    pub stage_status: StageStatus,

    /// References into the external evidence subsystem
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_refs: Vec<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Followup {
    /// Create a new pending followup for a case
    pub fn new(
        case_id: RecordId,
        tenant_id: TenantId,
        process_stage: String,
        action_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::new(RecordPrefix::Seg),
            case_id,
            tenant_id,
            process_stage,
            action_type: None,
            action_date,
            due_date: None,
            responsible: None,
            observations: None,
            detail: None,
            stage_status: StageStatus::default(),
            evidence_refs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the followup still counts as the case's open stage
    pub fn is_open(&self) -> bool {
        self.stage_status == StageStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_followup_creation() {
        let case_id = RecordId::new(RecordPrefix::Caso);
        let followup = Followup::new(
            case_id.clone(),
            TenantId::new("t1").unwrap(),
            "indagacion".to_string(),
            NaiveDate::from_ymd_opt(2024, 3, 18).unwrap(),
        );

        assert!(followup.id.to_string().starts_with("SEG-"));
        assert_eq!(followup.case_id, case_id);
        assert!(followup.is_open());
        assert!(followup.due_date.is_none());
    }

    #[test]
    fn test_stage_status_roundtrip() {
        for status in [
            StageStatus::Pending,
            StageStatus::Done,
            StageStatus::OverdueAcknowledged,
        ] {
            let parsed: StageStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_done_is_not_open() {
        let mut followup = Followup::new(
            RecordId::new(RecordPrefix::Caso),
            TenantId::new("t1").unwrap(),
            "citacion".to_string(),
            NaiveDate::from_ymd_opt(2024, 3, 18).unwrap(),
        );
        followup.stage_status = StageStatus::Done;
        assert!(!followup.is_open());
    }
}
