/*!
 * File descriptors consumed by the planner and executor.
 *
 * `FileRef` is the read-only input record for one media file. Metadata
 * extraction (EXIF, geocoding) happens upstream; the engine only sees the
 * resolved values.
 */

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Timestamps attached to a media file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDateTime {
    /// When the media was captured, if known (EXIF or similar)
    pub taken: Option<DateTime<Utc>>,
    /// Filesystem creation time
    pub created: DateTime<Utc>,
    /// Filesystem modification time
    pub modified: DateTime<Utc>,
}

impl FileDateTime {
    /// The most meaningful timestamp: capture time when present, otherwise
    /// the earlier of creation and modification time.
    pub fn best(&self) -> DateTime<Utc> {
        match self.taken {
            Some(taken) => taken,
            None => self.created.min(self.modified),
        }
    }
}

/// Resolved location for a media file, finest to coarsest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationData {
    pub district: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl LocationData {
    /// True when no component is known
    pub fn is_empty(&self) -> bool {
        self.district.is_none()
            && self.city.is_none()
            && self.county.is_none()
            && self.state.is_none()
            && self.country.is_none()
    }
}

/// One enumerated media file plus its sidecars
#[derive(Debug, Clone)]
pub struct FileRef {
    /// Absolute source path
    pub path: PathBuf,
    /// Byte length
    pub size: u64,
    /// Timestamps
    pub date_time: FileDateTime,
    /// Resolved location, when metadata provided one
    pub location: Option<LocationData>,
    /// Camera model, when metadata provided one
    pub camera: Option<String>,
    /// Album name, when metadata provided one
    pub album: Option<String>,
    /// Why this file landed in the unknown bucket (missing EXIF, failed
    /// geocode, ...)
    pub unknown_reason: Option<String>,
    /// Sidecar files that travel with this one, in attachment order
    pub sidecars: Vec<FileRef>,
}

impl FileRef {
    /// File name including extension
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// File name without extension
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Extension including the leading dot, or empty
    pub fn extension(&self) -> String {
        match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!(".{}", ext),
            None => String::new(),
        }
    }

    /// Name of the directory containing this file
    pub fn parent_directory_name(&self) -> &str {
        self.path
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn test_best_prefers_taken() {
        let dt = FileDateTime {
            taken: Some(Utc.with_ymd_and_hms(2023, 6, 15, 9, 0, 0).unwrap()),
            created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            modified: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        };
        assert_eq!(dt.best().year(), 2023);
    }

    #[test]
    fn test_best_falls_back_to_earliest() {
        let dt = FileDateTime {
            taken: None,
            created: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            modified: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        };
        assert_eq!(dt.best(), dt.modified);
    }

    #[test]
    fn test_name_components() {
        let file = test_support::file_ref("/photos/2024/trip/IMG_001.JPG", 10, None);
        assert_eq!(file.file_name(), "IMG_001.JPG");
        assert_eq!(file.stem(), "IMG_001");
        assert_eq!(file.extension(), ".JPG");
        assert_eq!(file.parent_directory_name(), "trip");
    }

    #[test]
    fn test_extension_missing() {
        let file = test_support::file_ref("/photos/README", 10, None);
        assert_eq!(file.extension(), "");
    }
}
