//! Case lifecycle engine: status transitions and stage followups
//!
//! Statuses move forward only: Reportado -> En Seguimiento -> Cerrado, with
//! Reportado -> Cerrado as a legal shortcut. Cerrado is terminal and only
//! reachable through [`CaseWorkflow::close_case`], which stamps `closed_at`.
//! The subordinate stage sequence allows at most one open followup per case.

use chrono::{Local, NaiveDate, NaiveTime, Utc};

use crate::core::busdays::project_due_date;
use crate::core::error::CoreError;
use crate::core::gateway::CaseGateway;
use crate::core::identity::{RecordId, TenantId};
use crate::core::sla::{SlaRegistry, DEFAULT_INDAGACION_DAYS, INITIAL_STAGE};
use crate::entities::case::{Case, CaseStatus, ConductGravity};
use crate::entities::followup::{Followup, StageStatus};

/// Payload for creating a case. Tenant, student and incident date are
/// required; everything else is optional.
#[derive(Debug, Default, Clone)]
pub struct NewCase {
    pub tenant_id: Option<TenantId>,
    pub student: Option<String>,
    pub incident_date: Option<NaiveDate>,
    pub incident_time: Option<NaiveTime>,
    pub course: Option<String>,
    pub conduct: Option<ConductGravity>,
    pub description: Option<String>,
    pub status: Option<CaseStatus>,
}

/// Details for opening a new stage followup
#[derive(Debug, Default, Clone)]
pub struct StageDetails {
    pub action_type: Option<String>,
    pub action_date: Option<NaiveDate>,
    pub responsible: Option<String>,
    pub observations: Option<String>,
    pub detail: Option<String>,
    pub evidence_refs: Vec<String>,
}

/// How the open stage was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageResolution {
    Done,
    OverdueAcknowledged,
}

impl StageResolution {
    fn as_status(self) -> StageStatus {
        match self {
            StageResolution::Done => StageStatus::Done,
            StageResolution::OverdueAcknowledged => StageStatus::OverdueAcknowledged,
        }
    }
}

/// Resolution fields merged into the case on close
#[derive(Debug, Default, Clone)]
pub struct CaseClosure {
    pub resolution: Option<String>,
    pub measure: Option<String>,
}

/// The case lifecycle engine
pub struct CaseWorkflow<'a> {
    gateway: &'a CaseGateway,
}

impl<'a> CaseWorkflow<'a> {
    pub fn new(gateway: &'a CaseGateway) -> Self {
        Self { gateway }
    }

    /// Check if a status transition is valid
    pub fn is_valid_transition(&self, from: CaseStatus, to: CaseStatus) -> bool {
        matches!(
            (from, to),
            (CaseStatus::Reportado, CaseStatus::EnSeguimiento)
                | (CaseStatus::Reportado, CaseStatus::Cerrado)
                | (CaseStatus::EnSeguimiento, CaseStatus::Cerrado)
        )
    }

    /// Get allowed transitions from the current status
    pub fn allowed_transitions(&self, current: CaseStatus) -> Vec<CaseStatus> {
        match current {
            CaseStatus::Reportado => vec![CaseStatus::EnSeguimiento, CaseStatus::Cerrado],
            CaseStatus::EnSeguimiento => vec![CaseStatus::Cerrado],
            CaseStatus::Cerrado => vec![],
        }
    }

    /// Create a case in the initial status and persist it
    pub fn create_case(&self, payload: NewCase) -> Result<Case, CoreError> {
        let (Some(tenant_id), Some(student), Some(incident_date)) = (
            payload.tenant_id,
            payload.student.filter(|s| !s.trim().is_empty()),
            payload.incident_date,
        ) else {
            return Err(CoreError::validation("Datos inválidos para crear caso"));
        };

        let status = payload.status.unwrap_or_default();
        if status == CaseStatus::Cerrado {
            // closed_at is stamped by close_case only; a case cannot be born closed
            return Err(CoreError::validation("Datos inválidos para crear caso"));
        }

        let mut case = Case::new(tenant_id, student, incident_date);
        case.status = status;
        case.incident_time = payload.incident_time;
        case.course = payload.course;
        case.conduct = payload.conduct;
        case.description = payload.description;

        self.gateway.insert_case(&case)?;
        Ok(case)
    }

    /// Load a case by id
    pub fn get_case(&self, id: &str) -> Result<Case, CoreError> {
        let record_id = parse_case_id(id)?;
        self.gateway
            .find_case(&record_id)?
            .ok_or_else(|| CoreError::NotFound(record_id.to_string()))
    }

    /// Begin (or resume) the due process for a case.
    ///
    /// Best-effort: an unknown case resolves to `Ok(false)` rather than an
    /// error, because this path is also invoked opportunistically. The
    /// followup insert is idempotent; when a concurrent caller wins the
    /// open-stage slot, the constraint failure reads as "already started".
    pub fn start_seguimiento(&self, case_id: &str) -> Result<bool, CoreError> {
        if case_id.trim().is_empty() {
            return Err(CoreError::validation("Se requiere id de caso"));
        }

        let Some(mut case) = self.resolve_case_best_effort(case_id) else {
            return Ok(false);
        };
        if case.is_closed() {
            return Ok(false);
        }

        let today = Local::now().date_naive();
        let registry = SlaRegistry::new(self.gateway);
        let days = match registry.days_for_stage(&case.tenant_id, INITIAL_STAGE) {
            Ok(days) => days,
            Err(CoreError::ConfigurationMissing { .. }) => DEFAULT_INDAGACION_DAYS,
            Err(e) => return Err(e),
        };

        // due-process initialization: stamp the indagación window and move
        // the case into seguimiento
        let mut dirty = false;
        if case.indagacion_start_date.is_none() {
            case.indagacion_start_date = Some(today);
            case.indagacion_due_date = Some(project_due_date(today, days));
            dirty = true;
        }
        if case.status == CaseStatus::Reportado {
            case.status = CaseStatus::EnSeguimiento;
            dirty = true;
        }
        if dirty {
            case.updated_at = Utc::now();
            self.gateway.update_case(&case)?;
        }

        if self.gateway.find_open_followup(&case.id)?.is_none() {
            let mut followup = Followup::new(
                case.id.clone(),
                case.tenant_id.clone(),
                INITIAL_STAGE.to_string(),
                today,
            );
            followup.due_date = Some(project_due_date(today, days));

            match self.gateway.insert_followup(&followup) {
                Ok(()) => {}
                Err(CoreError::Store(e)) if e.is_constraint() => {}
                Err(e) => return Err(e),
            }
        }

        Ok(true)
    }

    /// Open the next stage of a case's due process.
    ///
    /// Requires the previous stage to be resolved; the stage's SLA must be
    /// configured (ConfigurationMissing propagates to the caller here).
    pub fn advance_stage(
        &self,
        case_id: &str,
        stage_key: &str,
        details: StageDetails,
    ) -> Result<Followup, CoreError> {
        let mut case = self.get_case(case_id)?;
        if case.is_closed() {
            return Err(CoreError::validation(
                "No se puede avanzar etapa de un caso cerrado",
            ));
        }
        if self.gateway.find_open_followup(&case.id)?.is_some() {
            return Err(CoreError::validation(
                "Ya existe una etapa abierta para el caso",
            ));
        }

        let registry = SlaRegistry::new(self.gateway);
        let days = registry.days_for_stage(&case.tenant_id, stage_key)?;

        let action_date = details
            .action_date
            .unwrap_or_else(|| Local::now().date_naive());

        let mut followup = Followup::new(
            case.id.clone(),
            case.tenant_id.clone(),
            stage_key.trim().to_string(),
            action_date,
        );
        followup.due_date = Some(project_due_date(action_date, days));
        followup.action_type = details.action_type;
        followup.responsible = details.responsible;
        followup.observations = details.observations;
        followup.detail = details.detail;
        followup.evidence_refs = details.evidence_refs;

        match self.gateway.insert_followup(&followup) {
            Ok(()) => {}
            Err(CoreError::Store(e)) if e.is_constraint() => {
                return Err(CoreError::validation(
                    "Ya existe una etapa abierta para el caso",
                ));
            }
            Err(e) => return Err(e),
        }

        if case.status == CaseStatus::Reportado {
            case.status = CaseStatus::EnSeguimiento;
            case.updated_at = Utc::now();
            self.gateway.update_case(&case)?;
        }

        Ok(followup)
    }

    /// Resolve the case's open stage
    pub fn complete_stage(
        &self,
        case_id: &str,
        resolution: StageResolution,
    ) -> Result<Followup, CoreError> {
        let case = self.get_case(case_id)?;

        let Some(mut followup) = self.gateway.find_open_followup(&case.id)? else {
            return Err(CoreError::validation(
                "El caso no tiene una etapa abierta",
            ));
        };

        followup.stage_status = resolution.as_status();
        followup.updated_at = Utc::now();
        self.gateway.update_followup(&followup)?;
        Ok(followup)
    }

    /// Close a case: stamps Cerrado + closed_at and merges closure fields.
    ///
    /// Followups are left untouched; they are historical record.
    pub fn close_case(&self, case_id: &str, closure: CaseClosure) -> Result<Case, CoreError> {
        let mut case = self.get_case(case_id)?;
        if case.is_closed() {
            return Err(CoreError::validation("El caso ya está cerrado"));
        }

        case.status = CaseStatus::Cerrado;
        case.closed_at = Some(Utc::now());
        if closure.resolution.is_some() {
            case.resolution = closure.resolution;
        }
        if closure.measure.is_some() {
            case.measure = closure.measure;
        }
        case.updated_at = Utc::now();

        self.gateway.update_case(&case)?;
        Ok(case)
    }

    /// Full stage history of a case, oldest first
    pub fn stage_history(&self, case_id: &str) -> Result<Vec<Followup>, CoreError> {
        let case = self.get_case(case_id)?;
        self.gateway.list_followups(&case.id)
    }

    /// Best-effort case resolution: parse and lookup failures are swallowed
    /// and read as "not found", never propagated. Used where a secondary
    /// lookup must not block the primary operation.
    fn resolve_case_best_effort(&self, case_id: &str) -> Option<Case> {
        let record_id = RecordId::parse(case_id.trim()).ok()?;
        self.gateway.find_case(&record_id).ok().flatten()
    }
}

fn parse_case_id(id: &str) -> Result<RecordId, CoreError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CoreError::validation("Se requiere id de caso"));
    }
    RecordId::parse(id).map_err(|e| CoreError::validation(format!("Id de caso inválido: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sla::DEFAULT_STAGES;

    fn tenant() -> TenantId {
        TenantId::new("t1").unwrap()
    }

    fn new_case_payload() -> NewCase {
        NewCase {
            tenant_id: Some(tenant()),
            student: Some("Ana Pérez".to_string()),
            incident_date: NaiveDate::from_ymd_opt(2024, 3, 15),
            ..NewCase::default()
        }
    }

    fn setup() -> CaseGateway {
        let gateway = CaseGateway::open_in_memory().unwrap();
        let registry = SlaRegistry::new(&gateway);
        registry.seed_defaults(&tenant()).unwrap();
        gateway
    }

    #[test]
    fn test_transition_table() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        let workflow = CaseWorkflow::new(&gateway);

        assert!(workflow.is_valid_transition(CaseStatus::Reportado, CaseStatus::EnSeguimiento));
        assert!(workflow.is_valid_transition(CaseStatus::Reportado, CaseStatus::Cerrado));
        assert!(workflow.is_valid_transition(CaseStatus::EnSeguimiento, CaseStatus::Cerrado));

        // no backward moves, no un-closing
        assert!(!workflow.is_valid_transition(CaseStatus::EnSeguimiento, CaseStatus::Reportado));
        assert!(!workflow.is_valid_transition(CaseStatus::Cerrado, CaseStatus::Reportado));
        assert!(!workflow.is_valid_transition(CaseStatus::Cerrado, CaseStatus::EnSeguimiento));

        assert!(workflow.allowed_transitions(CaseStatus::Cerrado).is_empty());
    }

    #[test]
    fn test_create_case_requires_fields() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);

        let err = workflow.create_case(NewCase::default()).unwrap_err();
        assert_eq!(err.to_string(), "Datos inválidos para crear caso");

        let err = workflow
            .create_case(NewCase {
                student: Some("Ana".to_string()),
                ..NewCase::default()
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_create_case_defaults_to_reportado() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);

        let case = workflow.create_case(new_case_payload()).unwrap();
        assert_eq!(case.status, CaseStatus::Reportado);
        assert!(case.closed_at.is_none());

        let loaded = workflow.get_case(&case.id.to_string()).unwrap();
        assert_eq!(loaded.student, "Ana Pérez");
    }

    #[test]
    fn test_create_case_cannot_be_born_closed() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);

        let err = workflow
            .create_case(NewCase {
                status: Some(CaseStatus::Cerrado),
                ..new_case_payload()
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_get_case_requires_id() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);

        let err = workflow.get_case("").unwrap_err();
        assert_eq!(err.to_string(), "Se requiere id de caso");
    }

    #[test]
    fn test_get_case_not_found() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let id = RecordId::new(crate::core::identity::RecordPrefix::Caso);

        let err = workflow.get_case(&id.to_string()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_start_seguimiento_requires_id() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);

        let err = workflow.start_seguimiento("").unwrap_err();
        assert_eq!(err.to_string(), "Se requiere id de caso");
    }

    #[test]
    fn test_start_seguimiento_unknown_case_is_non_fatal() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let id = RecordId::new(crate::core::identity::RecordPrefix::Caso);

        assert!(!workflow.start_seguimiento(&id.to_string()).unwrap());
        // garbage ids degrade the same way
        assert!(!workflow.start_seguimiento("CASO-garbage").unwrap());
    }

    #[test]
    fn test_start_seguimiento_initializes_due_process() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let case = workflow.create_case(new_case_payload()).unwrap();

        assert!(workflow.start_seguimiento(&case.id.to_string()).unwrap());

        let today = Local::now().date_naive();
        let updated = workflow.get_case(&case.id.to_string()).unwrap();
        assert_eq!(updated.status, CaseStatus::EnSeguimiento);
        assert_eq!(updated.indagacion_start_date, Some(today));
        assert_eq!(
            updated.indagacion_due_date,
            Some(project_due_date(today, 5))
        );

        let open = gateway.find_open_followup(&case.id).unwrap().unwrap();
        assert_eq!(open.process_stage, INITIAL_STAGE);
        assert_eq!(open.due_date, Some(project_due_date(today, 5)));
    }

    #[test]
    fn test_start_seguimiento_is_idempotent_for_followups() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let case = workflow.create_case(new_case_payload()).unwrap();
        let id = case.id.to_string();

        assert!(workflow.start_seguimiento(&id).unwrap());
        assert!(workflow.start_seguimiento(&id).unwrap());

        let history = workflow.stage_history(&id).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_open());
    }

    #[test]
    fn test_start_seguimiento_without_sla_uses_default_window() {
        let gateway = CaseGateway::open_in_memory().unwrap(); // no seeding
        let workflow = CaseWorkflow::new(&gateway);
        let case = workflow.create_case(new_case_payload()).unwrap();

        assert!(workflow.start_seguimiento(&case.id.to_string()).unwrap());

        let today = Local::now().date_naive();
        let updated = workflow.get_case(&case.id.to_string()).unwrap();
        assert_eq!(
            updated.indagacion_due_date,
            Some(project_due_date(today, DEFAULT_INDAGACION_DAYS))
        );
    }

    #[test]
    fn test_start_seguimiento_skips_closed_case() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let case = workflow.create_case(new_case_payload()).unwrap();
        workflow
            .close_case(&case.id.to_string(), CaseClosure::default())
            .unwrap();

        assert!(!workflow.start_seguimiento(&case.id.to_string()).unwrap());
        let closed = workflow.get_case(&case.id.to_string()).unwrap();
        assert_eq!(closed.status, CaseStatus::Cerrado);
    }

    #[test]
    fn test_advance_stage_computes_deadline_in_business_days() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let case = workflow.create_case(new_case_payload()).unwrap();

        // indagación opened on a Monday with a 5-day SLA is due the
        // following Monday
        let monday = NaiveDate::from_ymd_opt(2024, 3, 18).unwrap();
        let followup = workflow
            .advance_stage(
                &case.id.to_string(),
                "indagacion",
                StageDetails {
                    action_date: Some(monday),
                    ..StageDetails::default()
                },
            )
            .unwrap();

        assert_eq!(
            followup.due_date,
            Some(NaiveDate::from_ymd_opt(2024, 3, 25).unwrap())
        );
    }

    #[test]
    fn test_advance_stage_blocked_while_stage_open() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let case = workflow.create_case(new_case_payload()).unwrap();
        let id = case.id.to_string();

        workflow.start_seguimiento(&id).unwrap();
        let err = workflow
            .advance_stage(&id, "citacion", StageDetails::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "Ya existe una etapa abierta para el caso");
    }

    #[test]
    fn test_advance_stage_requires_sla_configuration() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let case = workflow.create_case(new_case_payload()).unwrap();

        let err = workflow
            .advance_stage(
                &case.id.to_string(),
                "etapa-inexistente",
                StageDetails::default(),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationMissing { .. }));
    }

    #[test]
    fn test_sla_change_affects_only_future_stages() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let registry = SlaRegistry::new(&gateway);
        let case = workflow.create_case(new_case_payload()).unwrap();
        let id = case.id.to_string();

        let monday = NaiveDate::from_ymd_opt(2024, 3, 18).unwrap();
        let first = workflow
            .advance_stage(
                &id,
                "indagacion",
                StageDetails {
                    action_date: Some(monday),
                    ..StageDetails::default()
                },
            )
            .unwrap();

        registry.upsert_stage(&tenant(), "citacion", 1).unwrap();
        workflow.complete_stage(&id, StageResolution::Done).unwrap();

        let second = workflow
            .advance_stage(
                &id,
                "citacion",
                StageDetails {
                    action_date: Some(monday),
                    ..StageDetails::default()
                },
            )
            .unwrap();

        // already-stamped deadline untouched, new stage uses the new value
        let history = workflow.stage_history(&id).unwrap();
        assert_eq!(history[0].due_date, first.due_date);
        assert_eq!(
            second.due_date,
            Some(NaiveDate::from_ymd_opt(2024, 3, 19).unwrap())
        );
    }

    #[test]
    fn test_complete_stage_acknowledges_overdue() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let case = workflow.create_case(new_case_payload()).unwrap();
        let id = case.id.to_string();

        workflow.start_seguimiento(&id).unwrap();
        let resolved = workflow
            .complete_stage(&id, StageResolution::OverdueAcknowledged)
            .unwrap();
        assert_eq!(resolved.stage_status, StageStatus::OverdueAcknowledged);
        assert!(gateway.find_open_followup(&case.id).unwrap().is_none());
    }

    #[test]
    fn test_complete_stage_without_open_stage() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let case = workflow.create_case(new_case_payload()).unwrap();

        let err = workflow
            .complete_stage(&case.id.to_string(), StageResolution::Done)
            .unwrap_err();
        assert_eq!(err.to_string(), "El caso no tiene una etapa abierta");
    }

    #[test]
    fn test_close_case_stamps_closed_at() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let case = workflow.create_case(new_case_payload()).unwrap();
        let id = case.id.to_string();

        workflow.start_seguimiento(&id).unwrap();
        let closed = workflow
            .close_case(
                &id,
                CaseClosure {
                    resolution: Some("Amonestación escrita".to_string()),
                    measure: Some("carta de compromiso".to_string()),
                },
            )
            .unwrap();

        assert_eq!(closed.status, CaseStatus::Cerrado);
        assert!(closed.closed_at.is_some());
        assert_eq!(closed.resolution.as_deref(), Some("Amonestación escrita"));

        // closed_at is non-null iff Cerrado
        let reloaded = workflow.get_case(&id).unwrap();
        assert!(reloaded.is_closed() && reloaded.closed_at.is_some());
    }

    #[test]
    fn test_close_case_twice_is_rejected() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let case = workflow.create_case(new_case_payload()).unwrap();
        let id = case.id.to_string();

        workflow.close_case(&id, CaseClosure::default()).unwrap();
        let err = workflow.close_case(&id, CaseClosure::default()).unwrap_err();
        assert_eq!(err.to_string(), "El caso ya está cerrado");
    }

    #[test]
    fn test_closing_does_not_delete_followups() {
        let gateway = setup();
        let workflow = CaseWorkflow::new(&gateway);
        let case = workflow.create_case(new_case_payload()).unwrap();
        let id = case.id.to_string();

        workflow.start_seguimiento(&id).unwrap();
        workflow.complete_stage(&id, StageResolution::Done).unwrap();
        workflow.close_case(&id, CaseClosure::default()).unwrap();

        assert_eq!(workflow.stage_history(&id).unwrap().len(), 1);
    }
}
