use crate::metadata::FileRecord;
use crate::naming::{format_base_name, target_file_name, BaseNameKey};
use crate::planner::PlanError;
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Records sharing one capture second inside one directory, in batch order.
#[derive(Debug, Clone)]
pub struct NameGroup<'a> {
    pub directory: PathBuf,
    pub key: BaseNameKey,
    pub timestamp: NaiveDateTime,
    pub members: Vec<&'a FileRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub sequence: u32,
    pub file_name: String,
    pub target_path: PathBuf,
}

/// Assigns every group member a free `NNNN` sequence.
///
/// `existing_on_disk` holds full paths. A member may keep its own current
/// path; any other path in the set, or one already handed out in this call,
/// is skipped over by bumping the sequence. A candidate the filesystem itself
/// resolves to an entry is also taken, which covers case-insensitive volumes
/// where the spelling differs from the scanned name.
pub fn resolve(
    groups: &[NameGroup<'_>],
    existing_on_disk: &HashSet<PathBuf>,
) -> Result<HashMap<PathBuf, Assignment>, PlanError> {
    let mut assigned = HashSet::<PathBuf>::new();
    let mut out = HashMap::with_capacity(groups.iter().map(|g| g.members.len()).sum());

    for group in groups {
        let mut next = 0u32;
        for member in &group.members {
            let mut sequence = next;
            let assignment = loop {
                let base = format_base_name(&group.timestamp, member.tag.as_deref(), sequence);
                let file_name = target_file_name(&base, &member.source_path);
                let candidate = group.directory.join(&file_name);
                if is_available(&candidate, &member.source_path, &assigned, existing_on_disk) {
                    break Assignment {
                        sequence,
                        file_name,
                        target_path: candidate,
                    };
                }
                debug!(candidate = %candidate.display(), "name taken, bumping sequence");
                sequence = sequence
                    .checked_add(1)
                    .ok_or_else(|| PlanError::SequenceExhausted {
                        key: group.key.to_string(),
                    })?;
            };

            next = assignment.sequence.saturating_add(1);
            assigned.insert(assignment.target_path.clone());
            out.insert(member.source_path.clone(), assignment);
        }
    }

    Ok(out)
}

fn is_available(
    candidate: &Path,
    own_source: &Path,
    assigned: &HashSet<PathBuf>,
    existing_on_disk: &HashSet<PathBuf>,
) -> bool {
    if assigned.contains(candidate) {
        return false;
    }
    if candidate == own_source {
        return true;
    }
    !existing_on_disk.contains(candidate) && candidate.symlink_metadata().is_err()
}
