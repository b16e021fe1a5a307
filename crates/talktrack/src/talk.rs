//! Core talk types for talktrack.
//!
//! A [`Talk`] is one scheduled conference session as served by the talks
//! server. Records are never mutated on the client; a fetched list replaces
//! the previous one wholesale.

use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};

/// One scheduled conference session.
///
/// Field names match the server's JSON (`startTime`, `endTime`). Timestamps
/// are kept as the raw ISO-8601 strings the server sent. Missing fields decode
/// to empty values so partial records still reach the list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Talk {
    /// Title of the talk. Unique within a list and used as the favorite key.
    pub title: String,

    /// Short description shown under the title.
    pub subtitle: String,

    /// ISO-8601 start timestamp.
    pub start_time: String,

    /// ISO-8601 end timestamp.
    pub end_time: String,

    /// Length of the talk in minutes.
    pub duration: f64,
}

impl Talk {
    /// Parsed start time, if the server sent a valid RFC 3339 timestamp.
    #[must_use]
    pub fn starts_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.start_time).ok()
    }

    /// Parsed end time, if the server sent a valid RFC 3339 timestamp.
    #[must_use]
    pub fn ends_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.end_time).ok()
    }

    /// Local wall-clock start time for display.
    #[must_use]
    pub fn display_start(&self) -> String {
        format_iso_time(&self.start_time)
    }

    /// Local wall-clock end time for display.
    #[must_use]
    pub fn display_end(&self) -> String {
        format_iso_time(&self.end_time)
    }
}

/// Render an ISO-8601 timestamp as a local time of day.
///
/// Unparsable input is returned unchanged.
#[must_use]
pub fn format_iso_time(iso_time: &str) -> String {
    DateTime::parse_from_rfc3339(iso_time).map_or_else(
        |_| iso_time.to_string(),
        |dt| dt.with_timezone(&Local).format("%H:%M:%S").to_string(),
    )
}
