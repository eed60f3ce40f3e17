// Certificate cache directory management

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::AutoHttpsError;

/// Validate that a cache entry name doesn't contain path traversal attempts
pub fn validate_entry_name(name: &str) -> Result<(), AutoHttpsError> {
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(AutoHttpsError::CertificateDirectoryCreationFailed {
            path: name.to_string(),
            message: "name contains path traversal characters".to_string(),
        });
    }

    if name.trim().is_empty() {
        return Err(AutoHttpsError::CertificateDirectoryCreationFailed {
            path: name.to_string(),
            message: "name is empty or whitespace-only".to_string(),
        });
    }

    Ok(())
}

/// Derives a filesystem-safe cache entry name from a group of subjects
pub fn entry_name_for(subjects: &[String]) -> String {
    let first = subjects.first().map(String::as_str).unwrap_or("default");
    let name = first.replace('*', "wildcard").replace([':', '/', '\\'], "_");

    if subjects.len() > 1 {
        format!("{name}+{}", subjects.len() - 1)
    } else {
        name
    }
}

/// Helper to get a safe display path for error messages (doesn't leak full absolute paths)
fn safe_display_path(full_path: &Path) -> String {
    if let Ok(cwd) = std::env::current_dir() {
        if let Ok(relative) = full_path.strip_prefix(&cwd) {
            return relative.display().to_string();
        }
    }

    full_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| full_path.display().to_string())
}

/// Create the cache directory for a certificate group
pub fn create_cert_directory(name: &str, cache_dir: &Path) -> Result<PathBuf, AutoHttpsError> {
    validate_entry_name(name)?;

    let entry_dir = cache_dir.join(name);

    fs::create_dir_all(&entry_dir).map_err(|e| {
        AutoHttpsError::CertificateDirectoryCreationFailed {
            path: safe_display_path(&entry_dir),
            message: e.to_string(),
        }
    })?;

    Ok(entry_dir)
}
