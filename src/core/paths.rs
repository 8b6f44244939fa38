// src/core/paths.rs

//! Where contexts and their files live on disk.

use crate::constants::{CONTEXT_STAMP_FILENAME, DEFAULT_WORK_DIR};
use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

/// Resolves the directory holding every context of a declaration.
///
/// The template may use `~` and `$VAR`/`${VAR}`; a relative result is taken
/// relative to the declaration root.
///
/// # Errors
/// Returns an error if the template references an undefined variable.
pub fn resolve_work_dir(root: &Path, template: Option<&str>) -> Result<PathBuf> {
    let template = template.unwrap_or(DEFAULT_WORK_DIR);
    let expanded = shellexpand::full(template)
        .map_err(|e| anyhow!("Failed to expand work_dir template '{}': {}", template, e))?;
    let path = PathBuf::from(expanded.into_owned());
    let absolute = if path.is_absolute() { path } else { root.join(path) };
    Ok(dunce::simplified(&absolute).to_path_buf())
}

/// The root directory of the context identified by `key`.
pub fn context_dir(work_dir: &Path, key: &str) -> PathBuf {
    work_dir.join(key)
}

/// The directory inside a context where installed tools live.
pub fn bin_dir(context_root: &Path) -> PathBuf {
    if cfg!(target_os = "windows") {
        context_root.join("Scripts")
    } else {
        context_root.join("bin")
    }
}

/// The stamp file recording how a context was built.
pub fn stamp_path(context_root: &Path) -> PathBuf {
    context_root.join(CONTEXT_STAMP_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_work_dir_is_under_root() {
        let root = Path::new("/project");
        assert_eq!(
            resolve_work_dir(root, None).unwrap(),
            PathBuf::from("/project").join(DEFAULT_WORK_DIR)
        );
    }

    #[test]
    fn test_absolute_work_dir_is_kept() {
        let root = Path::new("/project");
        assert_eq!(
            resolve_work_dir(root, Some("/var/cache/envs")).unwrap(),
            PathBuf::from("/var/cache/envs")
        );
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let result = resolve_work_dir(Path::new("/p"), Some("$TOXIDE_SURELY_UNDEFINED_VAR/x"));
        assert!(result.is_err());
    }

    #[test]
    fn test_context_layout() {
        let ctx = context_dir(Path::new("/w"), "lint");
        assert_eq!(ctx, PathBuf::from("/w/lint"));
        assert!(stamp_path(&ctx).ends_with(CONTEXT_STAMP_FILENAME));
        assert!(bin_dir(&ctx).starts_with(&ctx));
    }
}
