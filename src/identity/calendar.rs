use super::message::{is_valid_id, stable_hash_hex};

/// Default tolerance for comparing event start times, in seconds.
pub const DEFAULT_START_TOLERANCE_SECS: i64 = 60;

/// Derive the public id for a calendar event.
///
/// Upstream external identifiers (CalDAV UIDs and the like) are opaque and
/// already stable, so they are used verbatim when present. Otherwise the id
/// is hashed from the event's natural key within its calendar.
pub fn generate_public_id(
    external_identifier: Option<&str>,
    calendar_id: &str,
    summary: &str,
    start_utc: i64,
    occurrence_date: Option<i64>,
) -> String {
    if let Some(external) = external_identifier {
        let trimmed = external.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut input = format!("event:{}\u{1f}{}\u{1f}{}", calendar_id, summary, start_utc);
    if let Some(occurrence) = occurrence_date {
        input.push('\u{1f}');
        input.push_str(&occurrence.to_string());
    }
    stable_hash_hex(&input)
}

/// True when `s` is an upstream external identifier rather than one of our
/// derived 32-hex ids.
pub fn is_external_id(s: &str) -> bool {
    !s.is_empty() && !is_valid_id(s)
}

/// Compare a stored event against current upstream content.
///
/// Summaries compare case-insensitively; start times match within
/// `tolerance_secs` of drift.
pub fn content_matches(
    stored_summary: &str,
    stored_start: i64,
    current_summary: &str,
    current_start: i64,
    tolerance_secs: i64,
) -> bool {
    stored_summary.to_lowercase() == current_summary.to_lowercase()
        && (stored_start - current_start).abs() <= tolerance_secs
}

/// The identifier triple an event carries on both sides of reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventIdentity {
    pub eventkit_id: Option<String>,
    pub external_id: Option<String>,
    pub calendar_id: String,
}

/// Outcome of comparing a stored event identity against the current upstream
/// identity for what should be the same event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityResolution {
    /// Both identifier pairs agree.
    Match,
    /// Nothing was stored; the event is new.
    NewEvent,
    /// Only the external identifier drifted.
    ExternalIdChanged { external_id: Option<String> },
    /// Only the EventKit identifier drifted.
    EventKitIdChanged { eventkit_id: Option<String> },
    /// Both identifiers drifted.
    BothIdsChanged {
        eventkit_id: Option<String>,
        external_id: Option<String>,
    },
    /// The calendars differ; these are not the same event.
    NotFound,
}

/// Classify identifier drift between a stored event and its current
/// upstream counterpart.
pub fn reconcile_identity(
    stored: Option<&EventIdentity>,
    current: &EventIdentity,
) -> IdentityResolution {
    let Some(stored) = stored else {
        return IdentityResolution::NewEvent;
    };

    if stored.calendar_id != current.calendar_id {
        return IdentityResolution::NotFound;
    }

    let eventkit_changed = stored.eventkit_id != current.eventkit_id;
    let external_changed = stored.external_id != current.external_id;

    match (eventkit_changed, external_changed) {
        (false, false) => IdentityResolution::Match,
        (false, true) => IdentityResolution::ExternalIdChanged {
            external_id: current.external_id.clone(),
        },
        (true, false) => IdentityResolution::EventKitIdChanged {
            eventkit_id: current.eventkit_id.clone(),
        },
        (true, true) => IdentityResolution::BothIdsChanged {
            eventkit_id: current.eventkit_id.clone(),
            external_id: current.external_id.clone(),
        },
    }
}
