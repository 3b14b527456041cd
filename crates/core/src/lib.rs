mod apply;
mod collision;
mod config;
mod exif_reader;
mod fs_atomic;
mod metadata;
mod naming;
mod planner;
mod sanitize;

pub use apply::{
    execute_plan, AbortReason, ConfirmFn, Confirmation, ExecuteMode, ExecutionReport, ExitOutcome,
};
pub use collision::{resolve, Assignment, NameGroup};
pub use config::{app_paths, load_config, load_config_from, AppConfig, AppPaths, TagSource};
pub use exif_reader::{dump_exif_fields, ExifLookup};
pub use metadata::{collect_records, CaptureMetadata, FileRecord, MetadataError, MetadataLookup};
pub use naming::{base_name_key, format_base_name, target_file_name, BaseNameKey};
pub use planner::{
    build_plan, collect_input_files, plan_files, scan_existing_names, verify_distinct_targets,
    ActionStatus, PlanError, PlanStats, RenameAction, RenamePlan, SkippedRecord,
};
pub use sanitize::sanitize_tag;
