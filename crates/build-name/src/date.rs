//! Date helpers for build filenames.
//!
//! Build filenames carry a compact `YYYYMMDD` date. The manifest stores both
//! a display form (`YYYY-MM-DD`) and an epoch-seconds timestamp used for all
//! ordering.

use chrono::{NaiveDate, NaiveTime};

use crate::NameError;

/// Length of a raw `YYYYMMDD` date.
pub const RAW_DATE_LEN: usize = 8;

/// Parse a raw `YYYYMMDD` date segment.
pub fn parse_raw_date(raw: &str) -> Result<NaiveDate, NameError> {
    if raw.len() != RAW_DATE_LEN || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NameError::InvalidDate(raw.to_string()));
    }

    NaiveDate::parse_from_str(raw, "%Y%m%d").map_err(|_| NameError::InvalidDate(raw.to_string()))
}

/// Split a raw `YYYYMMDD` date into its `YYYY-MM-DD` display form.
///
/// The input must already be validated by [`parse_raw_date`].
pub fn display_date(raw: &str) -> String {
    format!("{}-{}-{}", &raw[0..4], &raw[4..6], &raw[6..8])
}

/// Parse a user supplied date in either `YYYY-MM-DD` or `YYYYMMDD` form.
pub fn parse_date(value: &str) -> Result<NaiveDate, NameError> {
    let value = value.trim();
    if value.contains('-') {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|_| NameError::InvalidDate(value.to_string()))
    } else {
        parse_raw_date(value)
    }
}

/// Seconds since the epoch of `date` at midnight, read as UTC.
///
/// Only used for relative ordering, so the host timezone never matters.
pub fn midnight_timestamp(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_raw_date() {
        let date = parse_raw_date("20200422").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2020, 4, 22).unwrap());
    }

    #[test]
    fn test_parse_raw_date_rejects_bad_input() {
        assert!(parse_raw_date("2020042").is_err());
        assert!(parse_raw_date("2020-04-22").is_err());
        assert!(parse_raw_date("20201341").is_err());
        assert!(parse_raw_date("2020o422").is_err());
    }

    #[test]
    fn test_display_date_is_inverse_of_concatenation() {
        let raw = "20200422";
        let display = display_date(raw);
        assert_eq!(display, "2020-04-22");
        assert_eq!(display.replace('-', ""), raw);
    }

    #[test]
    fn test_parse_date_accepts_both_forms() {
        let expected = NaiveDate::from_ymd_opt(2021, 1, 31).unwrap();
        assert_eq!(parse_date("2021-01-31").unwrap(), expected);
        assert_eq!(parse_date("20210131").unwrap(), expected);
        assert!(parse_date("31/01/2021").is_err());
    }

    #[test]
    fn test_midnight_timestamp() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 2).unwrap();
        assert_eq!(midnight_timestamp(epoch), 86_400);

        let date = NaiveDate::from_ymd_opt(2020, 4, 22).unwrap();
        assert_eq!(midnight_timestamp(date), 1_587_513_600);
    }
}
