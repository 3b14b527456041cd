use crate::fs_atomic::{dir_writable, rename_no_replace};
use crate::planner::{
    io_dir, verify_distinct_targets, ActionStatus, PlanError, RenameAction, RenamePlan,
    SkippedRecord,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

pub const USER_DECLINED: &str = "user declined";
pub const USER_ABORTED: &str = "user aborted";
const NOTE_SIMULATED: &str = "simulated, no disk change";
const NOTE_ALREADY_NAMED: &str = "already named";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecuteMode {
    Simulate,
    Live,
}

/// Answer of the per-file confirmation callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Accept,
    Decline,
    /// Stop the batch; remaining actions stay planned.
    Abort,
}

impl From<bool> for Confirmation {
    fn from(value: bool) -> Self {
        if value {
            Self::Accept
        } else {
            Self::Decline
        }
    }
}

pub type ConfirmFn<'a> = dyn FnMut(&Path, &Path) -> Confirmation + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitOutcome {
    Success,
    PartialFailure,
    TotalFailure,
}

impl ExitOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::PartialFailure => 1,
            Self::TotalFailure => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    User,
    Environment(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub mode: ExecuteMode,
    pub actions: Vec<RenameAction>,
    pub skipped_records: Vec<SkippedRecord>,
    pub applied: usize,
    pub planned: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<AbortReason>,
}

impl ExecutionReport {
    pub fn outcome(&self) -> ExitOutcome {
        let env_abort = matches!(self.aborted, Some(AbortReason::Environment(_)));
        if self.failed > 0 || env_abort {
            ExitOutcome::PartialFailure
        } else {
            ExitOutcome::Success
        }
    }

    fn tally(&mut self) {
        self.applied = 0;
        self.planned = 0;
        self.failed = 0;
        self.skipped = self.skipped_records.len();
        for action in &self.actions {
            match action.status {
                ActionStatus::Planned => self.planned += 1,
                ActionStatus::Applied => self.applied += 1,
                ActionStatus::Skipped(_) => self.skipped += 1,
                ActionStatus::Failed(_) => self.failed += 1,
            }
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str(USER_ABORTED),
            Self::Environment(reason) => f.write_str(reason),
        }
    }
}

enum Step {
    Continue,
    Abort(AbortReason),
}

/// Applies `plan` in order. Per-action failures are recorded and never stop
/// the batch; only an inaccessible directory or a user abort does, and
/// renames already done are left in place.
pub fn execute_plan(
    plan: RenamePlan,
    mode: ExecuteMode,
    mut confirm: Option<&mut ConfirmFn<'_>>,
) -> Result<ExecutionReport, PlanError> {
    verify_distinct_targets(&plan.actions)?;

    let RenamePlan {
        mut actions,
        skipped,
        ..
    } = plan;
    let mut aborted = None;

    for action in actions.iter_mut() {
        if action.status != ActionStatus::Planned {
            continue;
        }

        let step = execute_one(action, mode, confirm.as_deref_mut());
        if let Step::Abort(reason) = step {
            warn!(%reason, "batch aborted, remaining actions left planned");
            aborted = Some(reason);
            break;
        }
    }

    let mut report = ExecutionReport {
        mode,
        actions,
        skipped_records: skipped,
        applied: 0,
        planned: 0,
        skipped: 0,
        failed: 0,
        aborted,
    };
    report.tally();
    Ok(report)
}

fn execute_one(
    action: &mut RenameAction,
    mode: ExecuteMode,
    confirm: Option<&mut ConfirmFn<'_>>,
) -> Step {
    // owned copies: `action` is updated while these are still in use
    let source_buf = action.source_path.clone();
    let target_buf = action.target_path.clone();
    let source = source_buf.as_path();
    let target = target_buf.as_path();
    let dir = io_dir(source.parent().unwrap_or_else(|| Path::new("")));

    if let Err(err) = fs::metadata(dir) {
        return Step::Abort(AbortReason::Environment(format!(
            "directory inaccessible: {}: {err}",
            dir.display()
        )));
    }

    if action.is_noop() {
        action.note = Some(NOTE_ALREADY_NAMED.to_string());
        if mode == ExecuteMode::Live {
            action.status = ActionStatus::Applied;
        }
        debug!(path = %source.display(), "already named");
        return Step::Continue;
    }

    if let Err(reason) = validate(source, target, dir) {
        warn!(from = %source.display(), to = %target.display(), %reason, "rename would fail");
        action.status = ActionStatus::Failed(reason);
        return Step::Continue;
    }

    if mode == ExecuteMode::Simulate {
        action.note = Some(NOTE_SIMULATED.to_string());
        info!(from = %source.display(), to = %target.display(), "simulated");
        return Step::Continue;
    }

    if let Some(confirm) = confirm {
        match confirm(source, target) {
            Confirmation::Accept => {}
            Confirmation::Decline => {
                action.status = ActionStatus::Skipped(USER_DECLINED.to_string());
                return Step::Continue;
            }
            Confirmation::Abort => return Step::Abort(AbortReason::User),
        }
    }

    match rename_no_replace(source, target) {
        Ok(()) => {
            info!(from = %source.display(), to = %target.display(), "renamed");
            action.status = ActionStatus::Applied;
        }
        Err(err) => {
            let reason = describe_io_error(&err);
            warn!(from = %source.display(), to = %target.display(), %reason, "rename failed");
            action.status = ActionStatus::Failed(reason);
        }
    }
    Step::Continue
}

fn validate(source: &Path, target: &Path, dir: &Path) -> Result<(), String> {
    match fs::symlink_metadata(source) {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err("source not found".to_string())
        }
        Err(err) => return Err(describe_io_error(&err)),
    }
    if fs::symlink_metadata(target).is_ok() {
        return Err("target already exists".to_string());
    }
    match dir_writable(dir) {
        Ok(true) => Ok(()),
        Ok(false) => Err("directory is read-only".to_string()),
        Err(err) => Err(describe_io_error(&err)),
    }
}

fn describe_io_error(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "source not found".to_string(),
        io::ErrorKind::AlreadyExists => "target already exists".to_string(),
        io::ErrorKind::PermissionDenied => format!("permission denied: {err}"),
        _ => err.to_string(),
    }
}
