//! Time and timestamp utilities
//!
//! All times handled by the collector are UTC. Upstream timestamps carry a
//! fixed `+0000` offset, so they are parsed straight into naive date-times.

use chrono::{NaiveDateTime, Utc};

/// Date-time layout used by the upstream stream, e.g. `Mon Jan 02 15:04:05 +0000 2023`
pub const SOURCE_FORMAT: &str = "%a %b %d %H:%M:%S +0000 %Y";

/// Sortable layout written into exported records, e.g. `2023-01-02 15:04:05`
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Layout of the `creation_date` partition label
pub const PARTITION_DATE_FORMAT: &str = "%Y-%m-%d";

/// Current UTC wall-clock time
pub fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Parse an upstream timestamp
pub fn parse_source_timestamp(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, SOURCE_FORMAT)
}

/// Format a timestamp in the canonical export layout
pub fn format_canonical(time: &NaiveDateTime) -> String {
    time.format(CANONICAL_FORMAT).to_string()
}

/// Format the date part used for storage partitioning
pub fn format_partition_date(time: &NaiveDateTime) -> String {
    time.format(PARTITION_DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_source_timestamp() {
        let parsed = parse_source_timestamp("Mon Jan 02 15:04:05 +0000 2023").unwrap();
        let expected = NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_opt(15, 4, 5)
            .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_canonical_form_is_not_a_source_timestamp() {
        let parsed = parse_source_timestamp("Mon Jan 02 15:04:05 +0000 2023").unwrap();
        let canonical = format_canonical(&parsed);
        assert_eq!(canonical, "2023-01-02 15:04:05");
        assert!(parse_source_timestamp(&canonical).is_err());
    }

    #[test]
    fn test_rejects_inconsistent_weekday() {
        assert!(parse_source_timestamp("Tue Jan 02 15:04:05 +0000 2023").is_err());
    }

    #[test]
    fn test_rejects_non_zero_offset() {
        assert!(parse_source_timestamp("Mon Jan 02 15:04:05 +0100 2023").is_err());
    }

    #[test]
    fn test_partition_date() {
        let time = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(format_partition_date(&time), "2024-03-09");
    }
}
