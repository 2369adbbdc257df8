//! Command implementations

pub mod caso;
pub mod colegio;
pub mod completions;
pub mod init;
pub mod plazos;
pub mod sla;
