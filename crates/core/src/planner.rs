use crate::collision::{resolve, NameGroup};
use crate::metadata::{collect_records, FileRecord, MetadataError, MetadataLookup};
use crate::naming::{base_name_key, BaseNameKey};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const METADATA_ERROR_REASON: &str = "metadata error";
pub const DUPLICATE_INPUT_REASON: &str = "duplicate input";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("two actions target the same path: {}", target.display())]
    Conflict { target: PathBuf },
    #[error("no free sequence number left for {key}")]
    SequenceExhausted { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ActionStatus {
    Planned,
    Skipped(String),
    Applied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameAction {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub sequence: u32,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RenameAction {
    pub fn is_noop(&self) -> bool {
        self.source_path == self.target_path
    }
}

/// An input that could not be planned. Kept so every input is accounted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub source_path: PathBuf,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MetadataError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PlanStats {
    pub inputs: usize,
    pub planned: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RenamePlan {
    pub actions: Vec<RenameAction>,
    pub skipped: Vec<SkippedRecord>,
    pub stats: PlanStats,
}

/// Turns the batch into a conflict-free plan.
///
/// `existing_on_disk` is the set of full paths currently present in the
/// target directories. Batch sources are added to it here, so a caller that
/// scanned the directories and one that did not get the same guarantees about
/// sibling sources.
pub fn build_plan(
    records: &[FileRecord],
    existing_on_disk: &HashSet<PathBuf>,
) -> Result<RenamePlan, PlanError> {
    let mut stats = PlanStats {
        inputs: records.len(),
        ..PlanStats::default()
    };
    let mut skipped = Vec::new();
    let mut valid = Vec::<&FileRecord>::with_capacity(records.len());
    let mut seen_sources = HashSet::<&Path>::new();

    for record in records {
        if !seen_sources.insert(record.source_path.as_path()) {
            warn!(path = %record.source_path.display(), "duplicate input ignored");
            skipped.push(SkippedRecord {
                source_path: record.source_path.clone(),
                reason: DUPLICATE_INPUT_REASON.to_string(),
                error: None,
            });
            continue;
        }
        match record.usable_timestamp() {
            Ok(_) => valid.push(record),
            Err(err) => {
                warn!(path = %record.source_path.display(), error = %err, "skipping file");
                skipped.push(SkippedRecord {
                    source_path: record.source_path.clone(),
                    reason: METADATA_ERROR_REASON.to_string(),
                    error: Some(err),
                });
            }
        }
    }

    let groups = group_by_key(&valid);

    let mut occupied = existing_on_disk.clone();
    occupied.extend(valid.iter().map(|r| r.source_path.clone()));

    let mut assignments = resolve(&groups, &occupied)?;

    let mut actions = Vec::with_capacity(valid.len());
    for record in valid {
        let Some(assignment) = assignments.remove(&record.source_path) else {
            continue;
        };
        let action = RenameAction {
            source_path: record.source_path.clone(),
            target_path: assignment.target_path,
            sequence: assignment.sequence,
            status: ActionStatus::Planned,
            note: None,
        };
        debug!(
            from = %action.source_path.display(),
            to = %action.target_path.display(),
            "planned"
        );
        if action.is_noop() {
            stats.unchanged += 1;
        }
        actions.push(action);
    }

    verify_distinct_targets(&actions)?;

    stats.planned = actions.len();
    stats.skipped = skipped.len();

    Ok(RenamePlan {
        actions,
        skipped,
        stats,
    })
}

/// Rejects plans where two actions share a target.
pub fn verify_distinct_targets(actions: &[RenameAction]) -> Result<(), PlanError> {
    let mut seen = HashSet::<&Path>::with_capacity(actions.len());
    for action in actions {
        if !seen.insert(action.target_path.as_path()) {
            return Err(PlanError::Conflict {
                target: action.target_path.clone(),
            });
        }
    }
    Ok(())
}

fn group_by_key<'a>(valid: &[&'a FileRecord]) -> Vec<NameGroup<'a>> {
    let mut groups = Vec::<NameGroup<'a>>::new();
    let mut index = HashMap::<(PathBuf, BaseNameKey), usize>::new();

    for record in valid {
        let Some(timestamp) = record.timestamp else {
            continue;
        };
        let directory = parent_dir(&record.source_path);
        let key = base_name_key(&timestamp);
        let slot = *index
            .entry((directory.clone(), key.clone()))
            .or_insert_with(|| {
                groups.push(NameGroup {
                    directory,
                    key,
                    timestamp,
                    members: Vec::new(),
                });
                groups.len() - 1
            });
        groups[slot].members.push(record);
    }

    groups
}

/// Parent as written in `path`; empty for a bare file name, so joined
/// targets keep the same shape as their sources.
fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Directory to hand to the OS: the empty parent of a bare name is the
/// working directory.
pub(crate) fn io_dir(dir: &Path) -> &Path {
    if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    }
}

/// Looks up every path, scans the directories involved and builds the plan.
///
/// Only directories holding at least one plannable file are scanned, so a
/// bad path argument is reported as a skipped record rather than failing
/// the whole batch.
pub fn plan_files<L: MetadataLookup>(paths: &[PathBuf], lookup: &L) -> Result<RenamePlan> {
    let records = collect_records(paths, lookup);
    let plannable: Vec<PathBuf> = records
        .iter()
        .filter(|r| r.usable_timestamp().is_ok())
        .map(|r| r.source_path.clone())
        .collect();
    let existing = scan_existing_names(&plannable)?;
    let plan = build_plan(&records, &existing)?;
    Ok(plan)
}

/// Lists every entry of each distinct parent directory of `sources`.
pub fn scan_existing_names(sources: &[PathBuf]) -> Result<HashSet<PathBuf>> {
    let dirs: BTreeSet<PathBuf> = sources.iter().map(|p| parent_dir(p)).collect();
    let mut out = HashSet::new();

    for dir in dirs {
        let listed = io_dir(&dir);
        for entry in fs::read_dir(listed)
            .with_context(|| format!("could not read directory: {}", listed.display()))?
        {
            let entry =
                entry.with_context(|| format!("could not read entry in: {}", dir.display()))?;
            out.insert(dir.join(entry.file_name()));
        }
    }

    Ok(out)
}

/// Expands directory arguments into image files; plain files are kept as given.
pub fn collect_input_files(
    inputs: &[PathBuf],
    recursive: bool,
    extensions: &[String],
) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();

    for input in inputs {
        if !input.is_dir() {
            out.push(input.clone());
            continue;
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        for entry in WalkDir::new(input).max_depth(max_depth).sort_by_file_name() {
            let entry =
                entry.with_context(|| format!("could not walk directory: {}", input.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || is_hidden(path) {
                continue;
            }
            if has_extension(path, extensions) {
                out.push(path.to_path_buf());
            }
        }
    }

    Ok(out)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
        })
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::CaptureMetadata;
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::tempdir;

    fn ts(y: i32, mo: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .expect("valid timestamp")
    }

    fn names(plan: &RenamePlan) -> Vec<String> {
        plan.actions
            .iter()
            .map(|a| {
                a.target_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            })
            .collect()
    }

    fn scenario_a(dir: &Path) -> Vec<FileRecord> {
        vec![
            FileRecord::resolved(dir.join("IMG_1.jpg"), ts(2019, 3, 30, 10), None),
            FileRecord::resolved(dir.join("IMG_2.jpg"), ts(2019, 3, 30, 10), None),
            FileRecord::resolved(dir.join("IMG_3.jpg"), ts(2019, 3, 30, 11), None),
        ]
    }

    #[test]
    fn same_second_files_are_sequenced_in_input_order() {
        let dir = PathBuf::from("/photos");
        let plan = build_plan(&scenario_a(&dir), &HashSet::new()).expect("plan");
        assert_eq!(
            names(&plan),
            vec![
                "20190330_100000_0000.jpg",
                "20190330_100000_0001.jpg",
                "20190330_110000_0000.jpg",
            ]
        );
        assert!(plan
            .actions
            .iter()
            .all(|a| a.status == ActionStatus::Planned));
    }

    #[test]
    fn foreign_file_pushes_sequence_up() {
        let dir = PathBuf::from("/photos");
        let records = vec![FileRecord::resolved(
            dir.join("DSC0001.jpg"),
            ts(2020, 1, 1, 0),
            None,
        )];
        let existing: HashSet<PathBuf> = [dir.join("20200101_000000_0000.jpg")]
            .into_iter()
            .collect();

        let plan = build_plan(&records, &existing).expect("plan");
        assert_eq!(names(&plan), vec!["20200101_000000_0001.jpg"]);
    }

    #[test]
    fn metadata_failures_are_recorded_not_dropped() {
        let dir = PathBuf::from("/photos");
        let mut records = scenario_a(&dir);
        records.insert(
            1,
            FileRecord::failed(
                dir.join("broken.jpg"),
                MetadataError::Unreadable("denied".to_string()),
            ),
        );

        let plan = build_plan(&records, &HashSet::new()).expect("plan");
        assert_eq!(plan.actions.len(), 3);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].reason, "metadata error");
        assert_eq!(plan.skipped[0].source_path, dir.join("broken.jpg"));
        assert_eq!(plan.stats.inputs, 4);
        assert_eq!(plan.stats.skipped, 1);
    }

    #[test]
    fn every_input_is_accounted_for_exactly_once() {
        let dir = PathBuf::from("/photos");
        let mut records = scenario_a(&dir);
        records.push(FileRecord::failed(
            dir.join("x.jpg"),
            MetadataError::NoTimestampField,
        ));
        records.push(records[0].clone());

        let plan = build_plan(&records, &HashSet::new()).expect("plan");
        let mut accounted: Vec<PathBuf> = plan
            .actions
            .iter()
            .map(|a| a.source_path.clone())
            .chain(plan.skipped.iter().map(|s| s.source_path.clone()))
            .collect();
        accounted.sort();
        let mut inputs: Vec<PathBuf> = records.iter().map(|r| r.source_path.clone()).collect();
        inputs.sort();
        assert_eq!(accounted, inputs);
        assert_eq!(plan.skipped.last().map(|s| s.reason.as_str()), Some("duplicate input"));
    }

    #[test]
    fn building_twice_gives_identical_plans() {
        let dir = PathBuf::from("/photos");
        let mut records = scenario_a(&dir);
        for i in 0..20 {
            records.push(FileRecord::resolved(
                dir.join(format!("burst_{i}.jpg")),
                ts(2021, 6, 1, 8),
                Some("burst".to_string()),
            ));
        }
        let existing: HashSet<PathBuf> = [dir.join("20210601_080000_0003_burst.jpg")]
            .into_iter()
            .collect();

        let first = build_plan(&records, &existing).expect("first");
        let second = build_plan(&records, &existing).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn targets_are_unique_and_avoid_foreign_names() {
        let dir = PathBuf::from("/photos");
        let records: Vec<FileRecord> = (0..10)
            .map(|i| FileRecord::resolved(dir.join(format!("{i}.jpg")), ts(2022, 2, 2, 2), None))
            .collect();
        let existing: HashSet<PathBuf> = (0..10)
            .step_by(2)
            .map(|seq| dir.join(format!("20220202_020000_{seq:04}.jpg")))
            .collect();

        let plan = build_plan(&records, &existing).expect("plan");
        let targets: HashSet<&PathBuf> = plan.actions.iter().map(|a| &a.target_path).collect();
        assert_eq!(targets.len(), plan.actions.len());
        for action in &plan.actions {
            assert!(!existing.contains(&action.target_path));
        }
    }

    #[test]
    fn correctly_named_file_is_a_noop_action() {
        let dir = PathBuf::from("/photos");
        let source = dir.join("20190330_100000_0000.jpg");
        let records = vec![FileRecord::resolved(source.clone(), ts(2019, 3, 30, 10), None)];
        let existing: HashSet<PathBuf> = [source.clone()].into_iter().collect();

        let plan = build_plan(&records, &existing).expect("plan");
        assert_eq!(plan.actions[0].target_path, source);
        assert!(plan.actions[0].is_noop());
        assert_eq!(plan.actions[0].status, ActionStatus::Planned);
        assert_eq!(plan.stats.unchanged, 1);
    }

    #[test]
    fn sequences_are_scoped_per_directory() {
        let records = vec![
            FileRecord::resolved(PathBuf::from("/a/1.jpg"), ts(2019, 3, 30, 10), None),
            FileRecord::resolved(PathBuf::from("/b/2.jpg"), ts(2019, 3, 30, 10), None),
        ];
        let plan = build_plan(&records, &HashSet::new()).expect("plan");
        assert_eq!(
            plan.actions[1].target_path,
            PathBuf::from("/b/20190330_100000_0000.jpg")
        );
    }

    #[test]
    fn verify_rejects_duplicate_targets() {
        let action = RenameAction {
            source_path: PathBuf::from("/p/a.jpg"),
            target_path: PathBuf::from("/p/t.jpg"),
            sequence: 0,
            status: ActionStatus::Planned,
            note: None,
        };
        let mut other = action.clone();
        other.source_path = PathBuf::from("/p/b.jpg");

        let err = verify_distinct_targets(&[action, other]).expect_err("conflict");
        assert!(matches!(err, PlanError::Conflict { .. }));
    }

    #[test]
    fn scan_lists_sibling_entries() {
        let temp = tempdir().expect("tempdir");
        let a = temp.path().join("a.jpg");
        fs::write(&a, b"a").expect("write a");
        fs::write(temp.path().join("20200101_000000_0000.jpg"), b"x").expect("write foreign");

        let existing = scan_existing_names(&[a.clone()]).expect("scan");
        assert!(existing.contains(&a));
        assert!(existing.contains(&temp.path().join("20200101_000000_0000.jpg")));
    }

    #[test]
    fn scan_reads_working_directory_for_bare_names() {
        // cargo runs tests from the package root
        let existing = scan_existing_names(&[PathBuf::from("Cargo.toml")]).expect("scan");
        assert!(existing.contains(&PathBuf::from("Cargo.toml")));
        assert!(existing.contains(&PathBuf::from("src")));
    }

    #[test]
    fn bare_names_get_bare_targets() {
        let records = vec![
            FileRecord::resolved(PathBuf::from("a.jpg"), ts(2019, 3, 30, 10), None),
            FileRecord::resolved(
                PathBuf::from("20190330_110000_0000.jpg"),
                ts(2019, 3, 30, 11),
                None,
            ),
        ];
        let existing: HashSet<PathBuf> = records.iter().map(|r| r.source_path.clone()).collect();

        let plan = build_plan(&records, &existing).expect("plan");
        assert_eq!(
            plan.actions[0].target_path,
            PathBuf::from("20190330_100000_0000.jpg")
        );
        assert!(plan.actions[1].is_noop());
        assert_eq!(io_dir(Path::new("")), Path::new("."));
        assert_eq!(io_dir(Path::new("/p")), Path::new("/p"));
    }

    #[test]
    fn scan_fails_for_missing_directory() {
        let temp = tempdir().expect("tempdir");
        let ghost = temp.path().join("gone").join("a.jpg");
        let err = scan_existing_names(&[ghost]).expect_err("missing dir");
        assert!(err.to_string().contains("could not read directory"));
    }

    struct FixedLookup;

    impl MetadataLookup for FixedLookup {
        fn lookup(&self, path: &Path) -> Result<CaptureMetadata, MetadataError> {
            if path.exists() {
                Ok(CaptureMetadata {
                    timestamp: ts(2020, 1, 1, 0),
                    tag: None,
                })
            } else {
                Err(MetadataError::Unreadable("missing".to_string()))
            }
        }
    }

    #[test]
    fn plan_files_skips_missing_paths_and_sees_foreign_names() {
        let temp = tempdir().expect("tempdir");
        let real = temp.path().join("DSC0001.jpg");
        fs::write(&real, b"x").expect("write");
        fs::write(temp.path().join("20200101_000000_0000.jpg"), b"x").expect("foreign");
        let ghost = temp.path().join("nowhere").join("x.jpg");

        let plan = plan_files(&[real.clone(), ghost.clone()], &FixedLookup).expect("plan");
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(
            plan.actions[0].target_path,
            temp.path().join("20200101_000000_0001.jpg")
        );
        assert_eq!(plan.skipped[0].source_path, ghost);
    }

    #[test]
    fn collect_input_files_expands_directories() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("nested")).expect("nested");
        fs::write(root.join("b.JPG"), b"x").expect("b");
        fs::write(root.join("a.jpg"), b"x").expect("a");
        fs::write(root.join("notes.txt"), b"x").expect("txt");
        fs::write(root.join(".hidden.jpg"), b"x").expect("hidden");
        fs::write(root.join("nested").join("c.jpg"), b"x").expect("c");
        let extensions = vec!["jpg".to_string()];

        let flat = collect_input_files(&[root.to_path_buf()], false, &extensions).expect("flat");
        assert_eq!(flat, vec![root.join("a.jpg"), root.join("b.JPG")]);

        let deep = collect_input_files(&[root.to_path_buf()], true, &extensions).expect("deep");
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&root.join("nested").join("c.jpg")));
    }
}
