//! Case entity type - disciplinary cases tracked through the due process

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::identity::{RecordId, RecordPrefix, TenantId};

/// Case lifecycle status
///
/// Transitions are forward-only: a case is never reopened once closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    /// Reported, nothing started yet
    Reportado,
    /// Under active stage followup
    #[serde(rename = "En Seguimiento")]
    EnSeguimiento,
    /// Closed; terminal
    Cerrado,
}

impl Default for CaseStatus {
    fn default() -> Self {
        CaseStatus::Reportado
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaseStatus::Reportado => write!(f, "Reportado"),
            CaseStatus::EnSeguimiento => write!(f, "En Seguimiento"),
            CaseStatus::Cerrado => write!(f, "Cerrado"),
        }
    }
}

impl std::str::FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reportado" => Ok(CaseStatus::Reportado),
            "en seguimiento" | "en-seguimiento" | "seguimiento" => Ok(CaseStatus::EnSeguimiento),
            "cerrado" => Ok(CaseStatus::Cerrado),
            _ => Err(format!(
                "Estado de caso inválido: {}. Use Reportado, 'En Seguimiento' o Cerrado",
                s
            )),
        }
    }
}

/// Conduct gravity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConductGravity {
    Leve,
    Grave,
    Gravisima,
}

impl Default for ConductGravity {
    fn default() -> Self {
        ConductGravity::Leve
    }
}

impl std::fmt::Display for ConductGravity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConductGravity::Leve => write!(f, "leve"),
            ConductGravity::Grave => write!(f, "grave"),
            ConductGravity::Gravisima => write!(f, "gravisima"),
        }
    }
}

impl std::str::FromStr for ConductGravity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "leve" => Ok(ConductGravity::Leve),
            "grave" => Ok(ConductGravity::Grave),
            "gravisima" | "gravísima" => Ok(ConductGravity::Gravisima),
            _ => Err(format!(
                "Gravedad inválida: {}. Use leve, grave o gravisima",
                s
            )),
        }
    }
}

/// A disciplinary case, exclusively scoped to one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    /// Unique identifier
    pub id: RecordId,

    /// Owning school; cross-tenant access is forbidden
    pub tenant_id: TenantId,

    /// Student the case concerns
    pub student: String,

    /// Course/section of the student
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,

    /// Date of the incident
    pub incident_date: NaiveDate,

    /// Time of the incident, when recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_time: Option<NaiveTime>,

    /// Conduct gravity classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conduct: Option<ConductGravity>,

    /// Free-text incident description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Lifecycle status
    #[serde(default)]
    pub status: CaseStatus,

    /// Start of the indagación window; stamped when seguimiento begins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indagacion_start_date: Option<NaiveDate>,

    /// Derived indagación deadline; recomputed only for future stages,
    /// never authoritative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indagacion_due_date: Option<NaiveDate>,

    /// Closure resolution text, merged on close
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    /// Disciplinary measure applied, merged on close
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure: Option<String>,

    /// Set exactly when the case enters Cerrado
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Case {
    /// Create a new case in the initial Reportado status
    pub fn new(tenant_id: TenantId, student: String, incident_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::new(RecordPrefix::Caso),
            tenant_id,
            student,
            course: None,
            incident_date,
            incident_time: None,
            conduct: None,
            description: None,
            status: CaseStatus::default(),
            indagacion_start_date: None,
            indagacion_due_date: None,
            resolution: None,
            measure: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the case is closed
    pub fn is_closed(&self) -> bool {
        self.status == CaseStatus::Cerrado
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::new("t1").unwrap()
    }

    #[test]
    fn test_case_creation_defaults() {
        let case = Case::new(
            tenant(),
            "Ana Pérez".to_string(),
            NaiveDate::from_ymd_opt(2024, 3, 18).unwrap(),
        );

        assert!(case.id.to_string().starts_with("CASO-"));
        assert_eq!(case.status, CaseStatus::Reportado);
        assert!(case.closed_at.is_none());
        assert!(case.indagacion_due_date.is_none());
    }

    #[test]
    fn test_status_display_roundtrip() {
        for status in [
            CaseStatus::Reportado,
            CaseStatus::EnSeguimiento,
            CaseStatus::Cerrado,
        ] {
            let parsed: CaseStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_status_serde_labels() {
        let json = serde_json::to_string(&CaseStatus::EnSeguimiento).unwrap();
        assert_eq!(json, "\"En Seguimiento\"");
    }

    #[test]
    fn test_gravity_from_str() {
        assert_eq!(
            "gravísima".parse::<ConductGravity>().unwrap(),
            ConductGravity::Gravisima
        );
        assert!("inexistente".parse::<ConductGravity>().is_err());
    }
}
