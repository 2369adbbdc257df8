//! Shared helper functions for CLI commands

use console::{style, StyledObject};
use miette::{IntoDiagnostic, Result};

use crate::cli::GlobalOpts;
use crate::core::identity::{RecordId, TenantId};
use crate::core::urgency::{Severity, UrgencyResult};
use crate::core::{CaseGateway, Config, Project};

/// Discover the workspace and open its case store
pub fn open_gateway(global: &GlobalOpts) -> Result<(Project, CaseGateway)> {
    let project = match &global.project {
        Some(path) => Project::discover_from(path).into_diagnostic()?,
        None => Project::discover().into_diagnostic()?,
    };
    let gateway = CaseGateway::open(&project.store_path()).into_diagnostic()?;
    Ok((project, gateway))
}

/// Resolve the tenant scope: --colegio flag, else configured default.
///
/// Every data command requires one; there is no "all tenants" mode.
pub fn resolve_tenant(flag: &Option<String>, config: &Config) -> Result<TenantId> {
    let raw = flag
        .clone()
        .or_else(|| config.default_tenant.clone())
        .ok_or_else(|| {
            miette::miette!(
                "Se requiere --colegio o 'default_tenant' en la configuración del espacio"
            )
        })?;
    TenantId::new(raw).into_diagnostic()
}

/// Format a RecordId for display, truncating if too long
pub fn format_short_id(id: &RecordId) -> String {
    let s = id.to_string();
    if s.len() > 16 {
        format!("{}...", &s[..13])
    } else {
        s
    }
}

/// Truncate a string to max_len, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

/// Escape a string for CSV output
///
/// Handles commas, quotes, and newlines according to RFC 4180.
pub fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Style an urgency badge by its severity
pub fn style_urgency(result: &UrgencyResult) -> StyledObject<String> {
    let label = result.alerta_urgencia.clone();
    match result.severity() {
        Severity::Critical => style(label).red().bold(),
        Severity::Warning => style(label).yellow(),
        Severity::Ok => style(label).green(),
        Severity::Neutral => style(label).dim(),
    }
}
