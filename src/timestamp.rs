use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

/// Layout of the capture timestamp embedded in page filenames.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H_%M_%S";

static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}-\d{2}_\d{2}_\d{2}").expect("timestamp pattern is valid")
});

/// Sort key for a page filename: the embedded `YYYY-MM-DD-HH_MM_SS` stamp,
/// or the whole filename when none is present.
///
/// Names without a stamp compare lexically against stamped ones, so they can
/// land anywhere among them.
pub fn extract_timestamp(filename: &str) -> &str {
    TIMESTAMP_RE
        .find(filename)
        .map(|m| m.as_str())
        .unwrap_or(filename)
}

/// Capture time of a page, if its filename carries a valid stamp.
pub fn parse_timestamp(filename: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(extract_timestamp(filename), TIMESTAMP_FORMAT).ok()
}
