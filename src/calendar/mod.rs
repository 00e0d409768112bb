//! The calendar database and its upstream source abstraction.
//!
//! Calendar ingestion is a parallel track to mail: an external
//! [`CalendarSource`] produces calendar and event records that are upserted
//! into [`CalendarDatabase`]. The store models recurrence masters and
//! occurrences uniformly and never expands recurrence rules itself.

pub mod database;
pub mod source;

pub use database::CalendarDatabase;
pub use source::{CalendarSource, SourcedEvent, sync_from_source};
