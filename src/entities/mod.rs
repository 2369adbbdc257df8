//! Entity types for the case engine

pub mod case;
pub mod followup;

pub use case::{Case, CaseStatus, ConductGravity};
pub use followup::{Followup, StageStatus};
