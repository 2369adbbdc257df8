//! Urgency classification for stage deadlines
//!
//! The upstream statistics service reports deadline state as free text, not
//! a closed enum, and the spelling drifts (accented and unaccented forms
//! both occur). The raw text is classified into [`UrgencyLevel`] exactly
//! once, here; everything downstream consumes the tagged variant.

use chrono::NaiveDate;
use serde::Serialize;

use crate::core::busdays::business_days_between;

/// Display severity for an urgency label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Ok,
    Neutral,
}

/// Deadline state of a case or stage, tagged at the boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrgencyLevel {
    /// The deadline has passed
    Overdue,
    /// The deadline is today
    DueToday,
    /// The deadline is ahead; the business-day count may be unknown
    Upcoming(Option<i64>),
    /// Comfortably within the allowed window
    OnTrack,
    /// No deadline is known for the case
    NoDeadline,
    /// Unrecognized upstream text, passed through uppercased
    Unknown(String),
}

impl UrgencyLevel {
    /// Classify the raw upstream urgency text.
    ///
    /// First match wins, operating on the uppercased text. Absent text falls
    /// back to the numeric days-remaining signal when one exists, and to
    /// "no deadline" otherwise.
    pub fn from_text(raw: Option<&str>, dias_restantes: Option<i64>) -> Self {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty());

        let Some(raw) = raw else {
            return match dias_restantes {
                Some(n) => UrgencyLevel::Upcoming(Some(n)),
                None => UrgencyLevel::NoDeadline,
            };
        };

        let upper = raw.to_uppercase();
        if upper.contains("VENCIDO") {
            UrgencyLevel::Overdue
        } else if upper.contains("VENCE HOY") {
            UrgencyLevel::DueToday
        } else if upper.contains("PRÓXIMO") || upper.contains("PROXIMO") {
            UrgencyLevel::Upcoming(dias_restantes)
        } else if upper.contains("EN PLAZO") || upper.contains("AL DÍA") || upper.contains("AL DIA")
        {
            UrgencyLevel::OnTrack
        } else {
            UrgencyLevel::Unknown(upper)
        }
    }

    /// Classify from a deadline date this engine computed itself
    pub fn from_deadline(today: NaiveDate, deadline: Option<NaiveDate>) -> Self {
        let Some(deadline) = deadline else {
            return UrgencyLevel::NoDeadline;
        };

        let restantes = business_days_between(today, deadline);
        if restantes < 0 {
            UrgencyLevel::Overdue
        } else if restantes == 0 {
            UrgencyLevel::DueToday
        } else {
            UrgencyLevel::Upcoming(Some(restantes))
        }
    }

    /// Human-facing badge label
    pub fn label(&self) -> String {
        match self {
            UrgencyLevel::Overdue => "VENCIDO".to_string(),
            UrgencyLevel::DueToday => "VENCE HOY".to_string(),
            UrgencyLevel::Upcoming(Some(n)) => format!("{} DÍAS", n),
            UrgencyLevel::Upcoming(None) => "PRÓXIMO".to_string(),
            UrgencyLevel::OnTrack => "AL DÍA".to_string(),
            UrgencyLevel::NoDeadline => "SIN PLAZO".to_string(),
            UrgencyLevel::Unknown(raw) => raw.clone(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            UrgencyLevel::Overdue | UrgencyLevel::DueToday => Severity::Critical,
            UrgencyLevel::Upcoming(_) => Severity::Warning,
            UrgencyLevel::OnTrack => Severity::Ok,
            UrgencyLevel::NoDeadline | UrgencyLevel::Unknown(_) => Severity::Neutral,
        }
    }

    /// Business days remaining, when the variant carries one
    pub fn dias_restantes(&self) -> Option<i64> {
        match self {
            UrgencyLevel::Upcoming(n) => *n,
            _ => None,
        }
    }
}

/// Derived deadline summary for one case; computed on read, never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrgencyResult {
    pub alerta_urgencia: String,
    pub dias_restantes: Option<i64>,
}

impl UrgencyResult {
    /// Build the summary from a deadline as of `today`
    pub fn from_deadline(today: NaiveDate, deadline: Option<NaiveDate>) -> Self {
        let level = UrgencyLevel::from_deadline(today, deadline);
        let dias_restantes = deadline.map(|d| business_days_between(today, d));
        Self {
            alerta_urgencia: level.label(),
            dias_restantes,
        }
    }

    pub fn severity(&self) -> Severity {
        let level = UrgencyLevel::from_text(Some(&self.alerta_urgencia), self.dias_restantes);
        match level {
            // labels like "3 DÍAS" carry no keyword; fall back to the count
            UrgencyLevel::Unknown(_) => match self.dias_restantes {
                Some(n) if n <= 0 => Severity::Critical,
                Some(_) => Severity::Warning,
                None => Severity::Neutral,
            },
            other => other.severity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_vencido_wins_over_days() {
        let level = UrgencyLevel::from_text(Some("VENCIDO"), Some(-2));
        assert_eq!(level, UrgencyLevel::Overdue);
        assert_eq!(level.label(), "VENCIDO");
        assert_eq!(level.severity(), Severity::Critical);
    }

    #[test]
    fn test_vence_hoy() {
        let level = UrgencyLevel::from_text(Some("vence hoy"), Some(0));
        assert_eq!(level, UrgencyLevel::DueToday);
        assert_eq!(level.severity(), Severity::Critical);
    }

    #[test]
    fn test_proximo_with_count() {
        let level = UrgencyLevel::from_text(Some("PRÓXIMO"), Some(3));
        assert_eq!(level.label(), "3 DÍAS");
        assert_eq!(level.severity(), Severity::Warning);
    }

    #[test]
    fn test_proximo_unaccented_without_count() {
        let level = UrgencyLevel::from_text(Some("proximo"), None);
        assert_eq!(level.label(), "PRÓXIMO");
    }

    #[test]
    fn test_on_track_variants_collapse() {
        for raw in ["EN PLAZO", "al día", "AL DIA"] {
            let level = UrgencyLevel::from_text(Some(raw), Some(10));
            assert_eq!(level, UrgencyLevel::OnTrack);
            assert_eq!(level.label(), "AL DÍA");
        }
    }

    #[test]
    fn test_unknown_text_passes_through_uppercased() {
        let level = UrgencyLevel::from_text(Some("en revisión"), None);
        assert_eq!(level, UrgencyLevel::Unknown("EN REVISIÓN".to_string()));
        assert_eq!(level.label(), "EN REVISIÓN");
        assert_eq!(level.severity(), Severity::Neutral);
    }

    #[test]
    fn test_no_text_no_deadline() {
        let level = UrgencyLevel::from_text(None, None);
        assert_eq!(level, UrgencyLevel::NoDeadline);
        assert_eq!(level.label(), "SIN PLAZO");
    }

    #[test]
    fn test_no_text_falls_back_to_days() {
        let level = UrgencyLevel::from_text(None, Some(4));
        assert_eq!(level.label(), "4 DÍAS");
    }

    #[test]
    fn test_classification_is_deterministic() {
        let a = UrgencyLevel::from_text(Some("VENCE HOY"), Some(0));
        let b = UrgencyLevel::from_text(Some("VENCE HOY"), Some(0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_from_deadline_overdue() {
        let level = UrgencyLevel::from_deadline(d(2024, 3, 20), Some(d(2024, 3, 18)));
        assert_eq!(level, UrgencyLevel::Overdue);
    }

    #[test]
    fn test_from_deadline_today() {
        let level = UrgencyLevel::from_deadline(d(2024, 3, 20), Some(d(2024, 3, 20)));
        assert_eq!(level, UrgencyLevel::DueToday);
    }

    #[test]
    fn test_from_deadline_missing() {
        let level = UrgencyLevel::from_deadline(d(2024, 3, 20), None);
        assert_eq!(level, UrgencyLevel::NoDeadline);
    }

    #[test]
    fn test_result_from_deadline_carries_days() {
        let res = UrgencyResult::from_deadline(d(2024, 3, 18), Some(d(2024, 3, 21)));
        assert_eq!(res.alerta_urgencia, "3 DÍAS");
        assert_eq!(res.dias_restantes, Some(3));
    }

    #[test]
    fn test_result_severity_tracks_days() {
        let upcoming = UrgencyResult::from_deadline(d(2024, 3, 18), Some(d(2024, 3, 21)));
        assert_eq!(upcoming.severity(), Severity::Warning);

        let overdue = UrgencyResult::from_deadline(d(2024, 3, 21), Some(d(2024, 3, 18)));
        assert_eq!(overdue.alerta_urgencia, "VENCIDO");
        assert_eq!(overdue.severity(), Severity::Critical);

        let unknown = UrgencyResult::from_deadline(d(2024, 3, 18), None);
        assert_eq!(unknown.severity(), Severity::Neutral);
    }

    #[test]
    fn test_result_without_deadline() {
        let res = UrgencyResult::from_deadline(d(2024, 3, 18), None);
        assert_eq!(res.alerta_urgencia, "SIN PLAZO");
        assert_eq!(res.dias_restantes, None);
    }
}
