//! Staging a whole local directory.

use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;

use crate::error::{HubError, Result};

/// Patterns skipped when no explicit list is configured.
pub const DEFAULT_IGNORE_PATTERNS: [&str; 5] =
    ["__pycache__/**", "*.pyc", ".git/**", ".DS_Store", "Thumbs.db"];

pub fn default_ignore_patterns() -> Vec<String> {
    DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect()
}

/// Every file under `local_dir` as `(path in repo, local path)`, sorted.
///
/// Patterns match at any depth. Hidden files are included unless a pattern
/// excludes them; `.gitignore` files are not consulted.
pub fn collect_folder(
    local_dir: &Path,
    path_in_repo: &str,
    ignore_patterns: &[String],
) -> Result<Vec<(String, PathBuf)>> {
    if !local_dir.is_dir() {
        return Err(HubError::Validation(format!(
            "'{}' is not a directory",
            local_dir.display()
        )));
    }

    let mut overrides = OverrideBuilder::new(local_dir);
    for pattern in ignore_patterns {
        let pattern = pattern.trim().trim_start_matches('/');
        if pattern.is_empty() {
            continue;
        }
        add_ignore(&mut overrides, pattern)?;
        if !pattern.starts_with("**/") {
            add_ignore(&mut overrides, &format!("**/{}", pattern))?;
        }
    }
    let overrides = overrides
        .build()
        .map_err(|e| HubError::Validation(format!("Invalid ignore pattern: {}", e)))?;

    let walker = WalkBuilder::new(local_dir)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .overrides(overrides)
        .build();

    let prefix = path_in_repo.trim_matches('/');
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| HubError::Io(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(local_dir)
            .map_err(|e| HubError::Validation(e.to_string()))?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let repo_path = if prefix.is_empty() {
            relative
        } else {
            format!("{}/{}", prefix, relative)
        };
        files.push((repo_path, entry.into_path()));
    }

    files.sort();
    Ok(files)
}

fn add_ignore(builder: &mut OverrideBuilder, pattern: &str) -> Result<()> {
    builder
        .add(&format!("!{}", pattern))
        .map_err(|e| HubError::Validation(format!("Invalid ignore pattern '{}': {}", pattern, e)))?;
    Ok(())
}
