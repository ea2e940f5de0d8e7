//! Build queries over the manifest.

use build_name::NameError;

use crate::artifact::Build;

/// Invalid filter arguments.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("an exact date cannot be combined with a start or end date")]
    ConflictingDates,

    #[error("{0}")]
    InvalidDate(#[from] NameError),
}

/// Filter over device, version and an inclusive date range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildFilter {
    pub device: Option<String>,
    pub version: Option<String>,
    /// Inclusive lower bound (epoch seconds)
    min_timestamp: Option<i64>,
    /// Exclusive upper bound: midnight after the last included day
    max_timestamp: Option<i64>,
}

impl BuildFilter {
    pub fn new(device: Option<String>, version: Option<String>) -> Self {
        Self {
            device,
            version,
            min_timestamp: None,
            max_timestamp: None,
        }
    }

    /// Restrict to a date range; `date` is shorthand for `min == max == date`.
    ///
    /// Dates are `YYYY-MM-DD` or `YYYYMMDD`. Both bounds are inclusive.
    pub fn with_dates(
        mut self,
        min_date: Option<&str>,
        max_date: Option<&str>,
        date: Option<&str>,
    ) -> Result<Self, FilterError> {
        let (min_date, max_date) = match date {
            Some(_) if min_date.is_some() || max_date.is_some() => {
                return Err(FilterError::ConflictingDates)
            }
            Some(date) => (Some(date), Some(date)),
            None => (min_date, max_date),
        };

        if let Some(min) = min_date {
            let min = build_name::parse_date(min)?;
            self.min_timestamp = Some(build_name::midnight_timestamp(min));
        }

        if let Some(max) = max_date {
            let max = build_name::parse_date(max)?;
            // NaiveDate::MAX has no next day; leave the range open.
            self.max_timestamp = max.succ_opt().map(build_name::midnight_timestamp);
        }

        Ok(self)
    }

    pub fn matches(&self, build: &Build) -> bool {
        if let Some(device) = &self.device {
            if &build.device != device {
                return false;
            }
        }
        if let Some(version) = &self.version {
            if &build.version != version {
                return false;
            }
        }
        if let Some(min) = self.min_timestamp {
            if build.timestamp < min {
                return false;
            }
        }
        if let Some(max) = self.max_timestamp {
            if build.timestamp >= max {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::File;

    fn build(filename: &str) -> Build {
        let primary = File {
            path: None,
            filename: filename.to_string(),
            reference: None,
            sha256: "ab".to_string(),
            size: 1,
        };
        Build::new(primary, Vec::new()).unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = BuildFilter::default();
        assert!(filter.matches(&build("lineage-17.1-20200422-UNOFFICIAL-bardock.zip")));
    }

    #[test]
    fn test_device_and_version() {
        let filter = BuildFilter::new(Some("bardock".to_string()), Some("17.1".to_string()));
        assert!(filter.matches(&build("lineage-17.1-20200422-UNOFFICIAL-bardock.zip")));
        assert!(!filter.matches(&build("lineage-18.1-20200422-UNOFFICIAL-bardock.zip")));
        assert!(!filter.matches(&build("lineage-17.1-20200422-UNOFFICIAL-lavender.zip")));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let filter = BuildFilter::default()
            .with_dates(Some("2020-04-01"), Some("2020-04-22"), None)
            .unwrap();
        assert!(filter.matches(&build("lineage-17.1-20200401-UNOFFICIAL-bardock.zip")));
        assert!(filter.matches(&build("lineage-17.1-20200422-UNOFFICIAL-bardock.zip")));
        assert!(!filter.matches(&build("lineage-17.1-20200331-UNOFFICIAL-bardock.zip")));
        assert!(!filter.matches(&build("lineage-17.1-20200423-UNOFFICIAL-bardock.zip")));
    }

    #[test]
    fn test_exact_date() {
        let filter = BuildFilter::default()
            .with_dates(None, None, Some("20200422"))
            .unwrap();
        assert!(filter.matches(&build("lineage-17.1-20200422-UNOFFICIAL-bardock.zip")));
        assert!(!filter.matches(&build("lineage-17.1-20200421-UNOFFICIAL-bardock.zip")));
        assert!(!filter.matches(&build("lineage-17.1-20200423-UNOFFICIAL-bardock.zip")));
    }

    #[test]
    fn test_date_with_bound_is_usage_error() {
        let err = BuildFilter::default()
            .with_dates(Some("2020-04-01"), None, Some("2020-04-22"))
            .unwrap_err();
        assert!(matches!(err, FilterError::ConflictingDates));

        let err = BuildFilter::default()
            .with_dates(None, Some("2020-04-01"), Some("2020-04-22"))
            .unwrap_err();
        assert!(matches!(err, FilterError::ConflictingDates));
    }

    #[test]
    fn test_invalid_date_is_rejected() {
        let err = BuildFilter::default()
            .with_dates(Some("April 1st"), None, None)
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidDate(_)));
    }
}
