use crate::config::TagSource;
use crate::metadata::{CaptureMetadata, MetadataError, MetadataLookup};
use chrono::NaiveDateTime;
use exif::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const TIMESTAMP_FIELDS: &[&str] = &["DateTimeOriginal", "DateTimeDigitized", "DateTime"];

/// Reads capture metadata from the EXIF block embedded in an image.
#[derive(Debug, Clone, Default)]
pub struct ExifLookup {
    tag_source: TagSource,
    fixed_tag: Option<String>,
}

impl ExifLookup {
    pub fn new(tag_source: TagSource, fixed_tag: Option<String>) -> Self {
        Self {
            tag_source,
            fixed_tag,
        }
    }

    fn tag_for(&self, exif: &exif::Exif) -> Option<String> {
        match self.tag_source {
            TagSource::None => None,
            TagSource::Fixed => normalize(self.fixed_tag.clone()),
            TagSource::Model => {
                let make = normalize(find_field_value(exif, &["Make"]));
                let model = normalize(find_field_value(exif, &["Model"]))?;
                Some(strip_make_prefix(make.as_deref(), &model))
            }
        }
    }
}

impl MetadataLookup for ExifLookup {
    fn lookup(&self, path: &Path) -> Result<CaptureMetadata, MetadataError> {
        let exif = read_exif(path)?;
        let raw = find_field_value(&exif, TIMESTAMP_FIELDS).ok_or(MetadataError::NoTimestampField)?;
        let timestamp = parse_date(&raw).ok_or_else(|| {
            MetadataError::CorruptFormat(format!("unrecognized timestamp {raw:?}"))
        })?;

        Ok(CaptureMetadata {
            timestamp,
            tag: self.tag_for(&exif),
        })
    }
}

/// One EXIF field as `(ifd, tag name, display value)`, for the info dump.
pub fn dump_exif_fields(path: &Path) -> Result<Vec<(String, String, String)>, MetadataError> {
    let exif = read_exif(path)?;
    Ok(exif
        .fields()
        .map(|field| {
            (
                format!("{}", field.ifd_num),
                format!("{}", field.tag),
                field.display_value().with_unit(&exif).to_string(),
            )
        })
        .collect())
}

fn read_exif(path: &Path) -> Result<exif::Exif, MetadataError> {
    let file = File::open(path)
        .map_err(|err| MetadataError::Unreadable(format!("{}: {err}", path.display())))?;
    let mut buf = BufReader::new(file);
    Reader::new()
        .read_from_container(&mut buf)
        .map_err(|err| match err {
            exif::Error::Io(io) => MetadataError::Unreadable(format!("{}: {io}", path.display())),
            exif::Error::NotFound(_) => MetadataError::NoTimestampField,
            other => MetadataError::CorruptFormat(format!("{}: {other}", path.display())),
        })
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().trim_matches('"').trim().to_string())
        .filter(|v| !v.is_empty())
}

fn find_field_value(exif: &exif::Exif, names: &[&str]) -> Option<String> {
    // first match in priority order, not in file order
    names.iter().find_map(|name| {
        exif.fields().find_map(|field| {
            let tag_name = format!("{:?}", field.tag);
            if name.eq_ignore_ascii_case(&tag_name) {
                Some(field.display_value().to_string())
            } else {
                None
            }
        })
    })
}

/// "Canon" + "Canon EOS 5D" gives "EOS 5D".
fn strip_make_prefix(make: Option<&str>, model: &str) -> String {
    let Some(make) = make else {
        return model.to_string();
    };
    let first_word = make.split_whitespace().next().unwrap_or(make);
    let lowered = model.to_ascii_lowercase();
    for prefix in [make, first_word] {
        let prefix_lower = prefix.to_ascii_lowercase();
        if !lowered.starts_with(&prefix_lower) {
            continue;
        }
        // only a whole word counts: "Canonet" does not start with make "Canon"
        let Some(rest) = model.get(prefix.len()..) else {
            continue;
        };
        if rest.starts_with(char::is_whitespace) && !rest.trim().is_empty() {
            return rest.trim().to_string();
        }
    }
    model.to_string()
}

fn parse_date(input: &str) -> Option<NaiveDateTime> {
    let normalized = input.trim().trim_matches('"');

    let candidates = [
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y:%m:%d %H:%M:%S%.f",
    ];

    candidates
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(normalized, fmt).ok())
}
