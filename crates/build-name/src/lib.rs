//! Parser for LineageOS build artifact filenames.
//!
//! Artifacts follow `lineage-<version>-<YYYYMMDD>-<type>-<device>[-gsi].<ext>`.
//! Parsing yields the structured identity a build is keyed and ordered by.

mod date;

pub use date::{display_date, midnight_timestamp, parse_date, parse_raw_date, RAW_DATE_LEN};

use chrono::NaiveDate;
use thiserror::Error;

/// Literal first segment of every recognized artifact.
pub const PRODUCT_PREFIX: &str = "lineage";

/// Recognized build extensions, longest first so `.img.tar.gz` wins over `.img`.
pub const BUILD_EXTENSIONS: &[&str] = &[".img.tar.gz", ".zip", ".img"];

/// Extensions that denote a disk image (the only ones allowed a `gsi` suffix).
const DISK_IMAGE_EXTENSIONS: &[&str] = &[".img.tar.gz", ".img"];

/// Optional trailing segment carried by generic system images.
pub const GSI_SUFFIX: &str = "gsi";

/// Build type literal used by recovery images.
pub const RECOVERY_TYPE: &str = "recovery";

/// Number of hyphen-delimited segments in a regular artifact name.
const SEGMENTS: usize = 5;

/// Reasons a filename is not a recognized build artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("{0}: unrecognized extension")]
    UnknownExtension(String),

    #[error("{filename}: expected 5 segments, found {found}")]
    SegmentCount { filename: String, found: usize },

    #[error("{filename}: expected prefix 'lineage', found '{found}'")]
    UnknownPrefix { filename: String, found: String },

    #[error("{0}: empty segment")]
    EmptySegment(String),

    #[error("invalid date '{0}'")]
    InvalidDate(String),
}

/// Structured identity parsed from an artifact filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildName {
    /// Full filename, including extension
    pub filename: String,

    /// Filename without the recognized extension; the build's identity key
    pub stem: String,

    /// Recognized extension, including the leading dot
    pub extension: &'static str,

    /// Version segment (e.g. "17.1")
    pub version: String,

    /// Raw `YYYYMMDD` date segment
    pub raw_date: String,

    /// Lower-cased build type (e.g. "unofficial", "recovery")
    pub build_type: String,

    /// Device codename
    pub device: String,

    /// Whether the name carried the trailing `gsi` segment
    pub gsi: bool,

    date: NaiveDate,
}

impl BuildName {
    /// `YYYY-MM-DD` display form of the build date.
    pub fn display_date(&self) -> String {
        display_date(&self.raw_date)
    }

    /// Calendar date of the build.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Epoch seconds of the build date at midnight, used for ordering.
    pub fn timestamp(&self) -> i64 {
        midnight_timestamp(self.date)
    }

    /// Whether this artifact is a recovery image rather than a build.
    pub fn is_recovery(&self) -> bool {
        self.build_type == RECOVERY_TYPE
    }
}

/// Split a filename into its stem and recognized build extension.
pub fn split_extension(filename: &str) -> Option<(&str, &'static str)> {
    BUILD_EXTENSIONS.iter().find_map(|ext| {
        filename
            .strip_suffix(ext)
            .filter(|stem| !stem.is_empty())
            .map(|stem| (stem, *ext))
    })
}

/// Parse an artifact filename into its structured identity.
pub fn parse(filename: &str) -> Result<BuildName, NameError> {
    let (stem, extension) =
        split_extension(filename).ok_or_else(|| NameError::UnknownExtension(filename.to_string()))?;

    let parts: Vec<&str> = stem.split('-').collect();
    let gsi = match parts.len() {
        SEGMENTS => false,
        6 if parts[5] == GSI_SUFFIX && DISK_IMAGE_EXTENSIONS.contains(&extension) => true,
        found => {
            return Err(NameError::SegmentCount {
                filename: filename.to_string(),
                found,
            })
        }
    };

    if parts[0] != PRODUCT_PREFIX {
        return Err(NameError::UnknownPrefix {
            filename: filename.to_string(),
            found: parts[0].to_string(),
        });
    }

    if parts[..SEGMENTS].iter().any(|p| p.is_empty()) {
        return Err(NameError::EmptySegment(filename.to_string()));
    }

    let raw_date = parts[2];
    let date = parse_raw_date(raw_date)?;

    Ok(BuildName {
        filename: filename.to_string(),
        stem: stem.to_string(),
        extension,
        version: parts[1].to_string(),
        raw_date: raw_date.to_string(),
        build_type: parts[3].to_lowercase(),
        device: parts[4].to_string(),
        gsi,
        date,
    })
}

/// Whether `filename` names a primary build artifact (not a recovery image).
pub fn is_build_artifact(filename: &str) -> bool {
    parse(filename).map(|n| !n.is_recovery()).unwrap_or(false)
}

/// Whether `filename` names a recovery image.
pub fn is_recovery_image(filename: &str) -> bool {
    parse(filename).map(|n| n.is_recovery()).unwrap_or(false)
}
