//! Update planning: canonical tree vs installed tree, filtered through ownership.

pub mod manifest;
pub mod migrate;
pub mod planner;
pub mod tree;

pub use manifest::{InstalledFile, InstalledManifest, CURRENT_SCHEMA};
pub use planner::{
    plan, ApplyReport, ExecutedOp, OpKind, Operation, Plan, SkipReason, Updater, UPDATE_CONFLICT,
    UPDATE_CREATE, UPDATE_FAILED, UPDATE_REJECTED, UPDATE_UPDATE,
};
pub use tree::{FileEntry, SourceTree};
