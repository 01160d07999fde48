// src/services/classify.rs

//! Cycling subset predicate.

use crate::models::Ticket;

const REPORT_MARKERS: &[&str] = &["cykl", "kolob", "cikli"];
const NAME_MARKERS: &[&str] = &["cyklo", "kolob"];
/// "recyklace" and friends mention bins, not bikes.
const REPORT_EXCLUDE: &str = "recykl";

/// Whether a ticket belongs in the cycling subset store.
///
/// Looks at `report` (or `description` when the report is blank) and `name`.
pub fn is_cycling_related(ticket: &Ticket) -> bool {
    let report = if ticket.report.trim().is_empty() {
        ticket.description.to_lowercase()
    } else {
        ticket.report.to_lowercase()
    };
    let name = ticket.name.to_lowercase();

    if report.is_empty() && name.is_empty() {
        return false;
    }
    if report.contains(REPORT_EXCLUDE) {
        return false;
    }

    REPORT_MARKERS.iter().any(|m| report.contains(m))
        || NAME_MARKERS.iter().any(|m| name.contains(m))
}

/// Clone the cycling-related tickets out of `tickets`, keeping order.
pub fn cycling_subset(tickets: &[Ticket]) -> Vec<Ticket> {
    tickets
        .iter()
        .filter(|t| is_cycling_related(t))
        .cloned()
        .collect()
}
