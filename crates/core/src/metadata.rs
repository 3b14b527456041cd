use chrono::{NaiveDateTime, Timelike};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// What a successful lookup yields for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub timestamp: NaiveDateTime,
    pub tag: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataError {
    #[error("file could not be read: {0}")]
    Unreadable(String),
    #[error("no capture timestamp in metadata")]
    NoTimestampField,
    #[error("metadata is corrupt: {0}")]
    CorruptFormat(String),
}

/// Source of capture metadata for a file.
pub trait MetadataLookup: Sync {
    fn lookup(&self, path: &Path) -> Result<CaptureMetadata, MetadataError>;
}

/// One input file as seen by the planner. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub source_path: PathBuf,
    pub timestamp: Option<NaiveDateTime>,
    pub tag: Option<String>,
    pub metadata_error: Option<MetadataError>,
}

impl FileRecord {
    pub fn resolved(source_path: PathBuf, timestamp: NaiveDateTime, tag: Option<String>) -> Self {
        Self {
            source_path,
            timestamp: Some(truncate_to_second(timestamp)),
            tag: tag.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            metadata_error: None,
        }
    }

    pub fn failed(source_path: PathBuf, error: MetadataError) -> Self {
        Self {
            source_path,
            timestamp: None,
            tag: None,
            metadata_error: Some(error),
        }
    }

    pub fn from_lookup(
        source_path: PathBuf,
        result: Result<CaptureMetadata, MetadataError>,
    ) -> Self {
        match result {
            Ok(meta) => Self::resolved(source_path, meta.timestamp, meta.tag),
            Err(err) => Self::failed(source_path, err),
        }
    }

    /// Timestamp when the record is usable for renaming, otherwise the reason it is not.
    pub fn usable_timestamp(&self) -> Result<NaiveDateTime, MetadataError> {
        if let Some(err) = &self.metadata_error {
            return Err(err.clone());
        }
        self.timestamp.ok_or(MetadataError::NoTimestampField)
    }
}

/// Runs `lookup` for every path; results keep the order of `paths`.
pub fn collect_records<L: MetadataLookup>(paths: &[PathBuf], lookup: &L) -> Vec<FileRecord> {
    paths
        .par_iter()
        .map(|path| FileRecord::from_lookup(path.clone(), lookup.lookup(path)))
        .collect()
}

fn truncate_to_second(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp.with_nanosecond(0).unwrap_or(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    struct MapLookup(HashMap<PathBuf, Result<CaptureMetadata, MetadataError>>);

    impl MetadataLookup for MapLookup {
        fn lookup(&self, path: &Path) -> Result<CaptureMetadata, MetadataError> {
            self.0
                .get(path)
                .cloned()
                .unwrap_or_else(|| Err(MetadataError::Unreadable("missing".to_string())))
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 1)
            .and_then(|d| d.and_hms_milli_opt(12, 0, 0, 750))
            .expect("valid timestamp")
    }

    #[test]
    fn resolved_record_drops_subseconds_and_blank_tag() {
        let record = FileRecord::resolved(PathBuf::from("/a.jpg"), noon(), Some("  ".to_string()));
        let ts = record.timestamp.expect("timestamp");
        assert_eq!(ts.nanosecond(), 0);
        assert_eq!(record.tag, None);
        assert!(record.metadata_error.is_none());
    }

    #[test]
    fn record_without_timestamp_is_not_usable() {
        let record = FileRecord {
            source_path: PathBuf::from("/a.jpg"),
            timestamp: None,
            tag: None,
            metadata_error: None,
        };
        assert_eq!(
            record.usable_timestamp(),
            Err(MetadataError::NoTimestampField)
        );
    }

    #[test]
    fn collect_records_keeps_input_order() {
        let paths: Vec<PathBuf> = (0..32).map(|i| PathBuf::from(format!("/p/{i}.jpg"))).collect();
        let mut map = HashMap::new();
        for (i, path) in paths.iter().enumerate() {
            let result = if i % 3 == 0 {
                Err(MetadataError::CorruptFormat("bad".to_string()))
            } else {
                Ok(CaptureMetadata {
                    timestamp: noon(),
                    tag: None,
                })
            };
            map.insert(path.clone(), result);
        }

        let records = collect_records(&paths, &MapLookup(map));
        let order: Vec<PathBuf> = records.iter().map(|r| r.source_path.clone()).collect();
        assert_eq!(order, paths);
        assert!(records[0].metadata_error.is_some());
        assert!(records[1].timestamp.is_some());
    }
}
