//! Hub domain model and route mapping.

pub mod endpoints;
pub mod types;

pub use types::{
    BranchRef, FileEntry, Identity, RepoDescriptor, RepoId, RepoKey, RepoKind, TreeKey,
    Visibility,
};
