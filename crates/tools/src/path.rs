//! Path validation — filesystem sandboxing for the file tools.
//!
//! Ensures file tools only touch paths within allowed roots and never
//! touch forbidden prefixes (e.g. ~/.ssh).

use std::path::{Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside allowed roots")]
    OutsideAllowedRoots { path: String },

    #[error("Path '{path}' matches forbidden prefix '{prefix}'")]
    ForbiddenPath { path: String, prefix: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Validate that a path is safe to access.
///
/// Checks, in order: no `..` traversal in the raw string, resolve the
/// path (canonicalizing the parent when the file does not exist yet,
/// e.g. for writes), not under a forbidden prefix, inside an allowed
/// root when roots are configured. Returns the resolved path.
pub fn validate_path(
    path: &str,
    allowed_roots: &[String],
    forbidden_paths: &[String],
) -> Result<PathBuf, PathValidationError> {
    let input_path = Path::new(path);

    let normalized = path.replace('\\', "/");
    if normalized.contains("../") || normalized.contains("/..") || normalized == ".." {
        return Err(PathValidationError::PathTraversal { path: path.into() });
    }

    // Resolve symlinks and relative components. For files that do not
    // exist yet, resolve through the parent directory.
    let canonical = if input_path.exists() {
        input_path
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: path.into(),
                reason: e.to_string(),
            })?
    } else if let Some(parent) = input_path.parent()
        && parent.exists()
    {
        let canonical_parent =
            parent
                .canonicalize()
                .map_err(|e| PathValidationError::CanonicalizeFailed {
                    path: path.into(),
                    reason: format!("parent dir: {e}"),
                })?;
        canonical_parent.join(input_path.file_name().unwrap_or_default())
    } else {
        input_path.to_path_buf()
    };

    let canonical_str = canonical.to_string_lossy().replace('\\', "/");

    for forbidden in forbidden_paths {
        let prefix = expand_tilde(forbidden).replace('\\', "/");
        if canonical_str.starts_with(&prefix) {
            return Err(PathValidationError::ForbiddenPath {
                path: path.into(),
                prefix: forbidden.clone(),
            });
        }
    }

    if !allowed_roots.is_empty() {
        let inside = allowed_roots.iter().any(|root| {
            let root = expand_tilde(root).replace('\\', "/");
            canonical_str.starts_with(&root)
        });
        if !inside {
            return Err(PathValidationError::OutsideAllowedRoots { path: path.into() });
        }
    }

    Ok(canonical)
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~") {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_default();
        if !home.is_empty() {
            return format!("{home}{rest}");
        }
    }
    path.to_string()
}
