//! CSV projection of a child's history.
//!
//! Pure: writes into an in-memory buffer and is deterministic for a given input.

use chrono::SecondsFormat;
use thiserror::Error;

use crate::history::HistoryEntry;

pub const CSV_HEADER: [&str; 6] = [
    "entry_type",
    "points",
    "dollar_value",
    "note",
    "occurred_at",
    "recorded_by",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv output was not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("csv buffer could not be flushed: {0}")]
    Flush(String),
}

/// Render history rows as CSV text with a header row.
///
/// Text fields containing a comma, quote or line break are quoted with inner
/// quotes doubled. Timestamps are RFC 3339 with microseconds and an explicit
/// offset; dollar values keep their full decimal scale.
pub fn history_to_csv<I>(rows: I) -> Result<String, ExportError>
where
    I: IntoIterator<Item = HistoryEntry>,
{
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;
    for row in rows {
        writer.write_record([
            row.entry_type.as_str().to_string(),
            row.points.to_string(),
            row.dollar_value.to_string(),
            row.note.unwrap_or_default(),
            row.occurred_at.to_rfc3339_opts(SecondsFormat::Micros, false),
            row.recorded_by.to_string(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Flush(e.error().to_string()))?;
    Ok(String::from_utf8(bytes)?)
}
