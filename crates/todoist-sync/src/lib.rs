//! todoist-sync: mirrors a Todoist project hierarchy into a markdown vault.
//!
//! This crate provides:
//! - Identity indexing of notes by their `TodoistId` frontmatter tag
//! - Canonical path resolution for nested projects
//! - Reconciliation (create / move / leave alone) and archiving of orphaned notes
//! - A single-flight scheduler for periodic passes
//! - FileSystem, TodoistApi and Clock trait abstractions with in-memory doubles

pub mod archiver;
pub mod clock;
pub mod engine;
pub mod error;
pub mod fs;
pub mod identity;
pub mod markdown;
pub mod project;
pub mod reconciler;
pub mod remote;
pub mod report;
pub mod resolver;
pub mod scheduler;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{SyncEngine, SyncSettings};
pub use error::{Result, SyncError};
pub use fs::{FileEntry, FileSystem, FsError, InMemoryFs};
pub use identity::{IdentityIndex, LocalNote};
pub use project::{ProjectTree, RemoteProject, TreeError};
pub use remote::{InMemoryTodoist, NewTask, RemoteError, Task, TodoistApi};
pub use report::PassReport;
pub use scheduler::{DeviceGate, PassState, Scheduler, TickOutcome};
