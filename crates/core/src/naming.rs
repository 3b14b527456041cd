use crate::sanitize::sanitize_tag;
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The `YYYYMMDD_HHMMSS` part of a generated name, shared by same-second captures.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BaseNameKey(String);

impl BaseNameKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BaseNameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn base_name_key(timestamp: &NaiveDateTime) -> BaseNameKey {
    BaseNameKey(format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        timestamp.year(),
        timestamp.month(),
        timestamp.day(),
        timestamp.hour(),
        timestamp.minute(),
        timestamp.second()
    ))
}

/// Renders `YYYYMMDD_HHMMSS_NNNN[_tag]`, without extension.
pub fn format_base_name(timestamp: &NaiveDateTime, tag: Option<&str>, sequence: u32) -> String {
    let key = base_name_key(timestamp);
    match tag.and_then(sanitize_tag) {
        Some(tag) => format!("{}_{:04}_{}", key, sequence, tag),
        None => format!("{}_{:04}", key, sequence),
    }
}

/// Appends the extension of `source_path` exactly as it is spelled on disk.
pub fn target_file_name(base: &str, source_path: &Path) -> String {
    match source_path.extension() {
        Some(ext) => format!("{}.{}", base, ext.to_string_lossy()),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, mi, s))
            .expect("valid timestamp")
    }

    #[test]
    fn key_pads_every_field() {
        let key = base_name_key(&ts(987, 3, 4, 5, 6, 7));
        assert_eq!(key.as_str(), "09870304_050607");
    }

    #[test]
    fn sequence_is_always_present() {
        let name = format_base_name(&ts(2019, 3, 30, 10, 0, 0), None, 0);
        assert_eq!(name, "20190330_100000_0000");
    }

    #[test]
    fn tag_is_sanitized_and_appended() {
        let name = format_base_name(&ts(2019, 3, 30, 10, 0, 0), Some("X-T5 / test"), 12);
        assert_eq!(name, "20190330_100000_0012_X-T5-_-test");
    }

    #[test]
    fn empty_tag_is_dropped() {
        let name = format_base_name(&ts(2019, 3, 30, 10, 0, 0), Some(" / "), 1);
        assert_eq!(name, "20190330_100000_0001");
    }

    #[test]
    fn extension_case_is_preserved() {
        assert_eq!(
            target_file_name("20190330_100000_0000", Path::new("/p/IMG_1.JPG")),
            "20190330_100000_0000.JPG"
        );
        assert_eq!(
            target_file_name("20190330_100000_0000", Path::new("/p/README")),
            "20190330_100000_0000"
        );
    }
}
