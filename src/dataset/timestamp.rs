use chrono::{DateTime, NaiveDateTime, ParseError};

/// Offset-aware layout of the `StartedAt`/`CompletedAt` columns once the
/// trailing `UTC` token has been removed.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

const UTC_SUFFIX: &str = " UTC";

/// Parses a step timestamp such as `2024-08-14 09:31:07 +0000 UTC`.
///
/// The literal ` UTC` marker is stripped, the remainder is parsed with an
/// explicit offset and the offset is then dropped, keeping the wall-clock
/// time as a naive timestamp. Strings that already lack the marker parse to
/// the same instant.
///
/// # Errors
///
/// Returns the underlying `chrono` error when the string does not match
/// [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ParseError> {
    let trimmed = raw.trim();
    let without_marker = trimmed.strip_suffix(UTC_SUFFIX).unwrap_or(trimmed);

    DateTime::parse_from_str(without_marker.trim_end(), TIMESTAMP_FORMAT)
        .map(|parsed| parsed.naive_local())
}

/// Renders a naive timestamp back into the log format with a zero offset.
pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    format!("{} +0000 UTC", timestamp.format("%Y-%m-%d %H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_parse_with_utc_marker() {
        let parsed = parse_timestamp("2024-08-14 09:31:07 +0000 UTC").unwrap();
        assert_eq!(parsed, naive(2024, 8, 14, 9, 31, 7));
    }

    #[test]
    fn test_parse_keeps_wall_clock_for_non_zero_offset() {
        let parsed = parse_timestamp("2024-08-14 09:31:07 +0200 UTC").unwrap();
        assert_eq!(parsed, naive(2024, 8, 14, 9, 31, 7));

        let parsed = parse_timestamp("2024-08-14 23:59:59 -0500 UTC").unwrap();
        assert_eq!(parsed, naive(2024, 8, 14, 23, 59, 59));
    }

    #[test]
    fn test_parse_is_idempotent_on_stripped_input() {
        let with_marker = parse_timestamp("2024-01-02 03:04:05 +0000 UTC").unwrap();
        let without_marker = parse_timestamp("2024-01-02 03:04:05 +0000").unwrap();
        assert_eq!(with_marker, without_marker);
    }

    #[test]
    fn test_parse_tolerates_surrounding_whitespace() {
        let parsed = parse_timestamp("  2024-01-02 03:04:05 +0000 UTC\n").unwrap();
        assert_eq!(parsed, naive(2024, 1, 2, 3, 4, 5));
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("not a timestamp").is_err());
        assert!(parse_timestamp("2024-01-02T03:04:05Z").is_err());
        assert!(parse_timestamp("2024-01-02 03:04:05").is_err());
        assert!(parse_timestamp("2024-13-02 03:04:05 +0000 UTC").is_err());
    }

    #[test]
    fn test_format_then_parse_round_trips() {
        let inputs = [
            "2024-08-14 09:31:07 +0000 UTC",
            "2023-12-31 23:59:59 +0100 UTC",
            "2024-02-29 00:00:00 -0800 UTC",
        ];

        for input in inputs {
            let parsed = parse_timestamp(input).unwrap();
            let reparsed = parse_timestamp(&format_timestamp(parsed)).unwrap();
            assert_eq!(parsed, reparsed, "round trip failed for {input}");
        }
    }
}
