//! Insert and delete policies, and the planner turning a root deletion into
//! statements plus the notifications they will cause.

mod planner;
pub use planner::*;
#[cfg(test)]
mod planner_test;

use serde::Deserialize;
use serde::Serialize;

/// What happens to dependents when their root entity is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeleteStrategy {
    /// Dependent rows are deleted, transitively
    Cascade,
    /// Dependents are left alone; dangling links are valid
    #[default]
    NoAction,
    /// Collections only: the link row or linking column is removed, the
    /// dependent entity survives
    Unlink,
}

/// How an insert treats a row that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsertStrategy {
    /// Existing column values are replaced
    #[default]
    OverwriteExisting,
    /// The insert is skipped when a row exists; existing values win
    PreferExisting,
}
