//! Per-tenant SLA registry: business days allowed per process stage
//!
//! The registry is the source of truth for deadline computation. A missing
//! (tenant, stage) row is a configuration error surfaced to the caller,
//! never a silent zero-day deadline. Edits apply to future due-date
//! computations only; deadlines already stamped on followups stay put.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::error::CoreError;
use crate::core::gateway::CaseGateway;
use crate::core::identity::TenantId;

/// Stage the due process starts in
pub const INITIAL_STAGE: &str = "indagacion";

/// Fallback window for due-process initialization when a tenant has no
/// SLA row for the initial stage
pub const DEFAULT_INDAGACION_DAYS: u32 = 5;

/// Stages seeded on tenant onboarding, with their default business days
pub const DEFAULT_STAGES: &[(&str, u32)] = &[
    ("indagacion", 5),
    ("citacion", 3),
    ("descargos", 5),
    ("resolucion", 10),
    ("apelacion", 5),
];

/// One SLA row: business days allowed for a stage, scoped to a tenant
#[derive(Debug, Clone, Serialize)]
pub struct SlaEntry {
    pub stage_key: String,
    pub days_to_due: u32,
    pub updated_at: DateTime<Utc>,
}

/// Registry of stage SLAs for deadline computation and admin editing
pub struct SlaRegistry<'a> {
    gateway: &'a CaseGateway,
}

impl<'a> SlaRegistry<'a> {
    pub fn new(gateway: &'a CaseGateway) -> Self {
        Self { gateway }
    }

    /// Business days allowed for a stage.
    ///
    /// A missing row is `ConfigurationMissing`; the caller decides the
    /// fallback policy.
    pub fn days_for_stage(&self, tenant: &TenantId, stage_key: &str) -> Result<u32, CoreError> {
        let stage_key = stage_key.trim();
        if stage_key.is_empty() {
            return Err(CoreError::validation("Se requiere clave de etapa"));
        }

        self.gateway
            .sla_days(tenant, stage_key)?
            .ok_or_else(|| CoreError::ConfigurationMissing {
                tenant: tenant.to_string(),
                stage: stage_key.to_string(),
            })
    }

    /// Create or replace the SLA for a stage
    pub fn upsert_stage(
        &self,
        tenant: &TenantId,
        stage_key: &str,
        days_to_due: u32,
    ) -> Result<(), CoreError> {
        let stage_key = stage_key.trim();
        if stage_key.is_empty() {
            return Err(CoreError::validation("Se requiere clave de etapa"));
        }
        self.gateway.sla_upsert(tenant, stage_key, days_to_due)
    }

    /// Remove a stage's SLA; true when a row existed
    pub fn delete_stage(&self, tenant: &TenantId, stage_key: &str) -> Result<bool, CoreError> {
        self.gateway.sla_delete(tenant, stage_key.trim())
    }

    pub fn list_stages(&self, tenant: &TenantId) -> Result<Vec<SlaEntry>, CoreError> {
        self.gateway.sla_list(tenant)
    }

    /// Tenant onboarding: seed the default stage set.
    ///
    /// Idempotent, and never clobbers an admin edit: only missing stages are
    /// inserted. Returns how many rows were created.
    pub fn seed_defaults(&self, tenant: &TenantId) -> Result<u32, CoreError> {
        let mut created = 0;
        for (stage_key, days) in DEFAULT_STAGES {
            if self.gateway.sla_seed(tenant, stage_key, *days)? {
                created += 1;
            }
        }
        Ok(created)
    }
}
