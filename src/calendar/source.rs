//! Abstract calendar upstream and the sync routine that drains it.

use chrono::Utc;

use super::database::CalendarDatabase;
use crate::error::DatabaseError;
use crate::models::{CalendarSyncSummary, StoredAttendee, StoredCalendar, StoredEvent};

/// One upstream event together with its attendee list.
#[derive(Debug, Clone)]
pub struct SourcedEvent {
    pub event: StoredEvent,
    pub attendees: Vec<StoredAttendee>,
}

/// A snapshot-producing calendar upstream.
///
/// Implementations wrap whatever actually holds the events (the OS calendar
/// store, an ICS file, a test fixture); the engine only consumes the
/// records.
pub trait CalendarSource {
    fn calendars(&self) -> Result<Vec<StoredCalendar>, DatabaseError>;
    fn events(&self, calendar: &StoredCalendar) -> Result<Vec<SourcedEvent>, DatabaseError>;
}

/// Mirror a source snapshot into the calendar database.
///
/// Per calendar: upsert the calendar row, batch-upsert its events, replace
/// each event's attendees, and prune events no longer present upstream.
/// Finishes by stamping `last_sync_time`.
pub async fn sync_from_source(
    source: &dyn CalendarSource,
    db: &CalendarDatabase,
) -> Result<CalendarSyncSummary, DatabaseError> {
    let mut summary = CalendarSyncSummary::default();

    for calendar in source.calendars()? {
        db.upsert_calendar(&calendar).await?;
        summary.calendars += 1;

        let sourced = source.events(&calendar)?;
        let events: Vec<StoredEvent> = sourced.iter().map(|s| s.event.clone()).collect();
        summary.events_upserted += db.upsert_events(&events).await?;

        for item in &sourced {
            db.replace_attendees(&item.event.id, &item.attendees).await?;
        }

        let keep: Vec<String> = events.iter().map(|e| e.id.clone()).collect();
        summary.events_pruned += db.delete_events_not_in(&keep, &calendar.id).await?;
    }

    db.set_last_sync_time(Utc::now().timestamp()).await?;
    log::info!(
        "calendar sync complete: {} calendars, {} events upserted, {} pruned",
        summary.calendars,
        summary.events_upserted,
        summary.events_pruned
    );
    Ok(summary)
}
