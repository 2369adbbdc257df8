//! Convive: motor de casos de convivencia escolar
//!
//! Tracks disciplinary cases through their due-process workflow, computes
//! stage deadlines in business days, and flags overdue work, on top of a
//! tenant-scoped, retry-safe SQLite store.

pub mod cli;
pub mod core;
pub mod entities;
