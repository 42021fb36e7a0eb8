// SPDX-License-Identifier: MIT OR Apache-2.0

use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};

// Computed once per process; the `tempdir` macro reports this path.
static CANONICAL_TEMP_DIR: Lazy<PathBuf> = Lazy::new(resolve_temp_dir);

fn resolve_temp_dir() -> PathBuf {
    match std::env::temp_dir().canonicalize() {
        Ok(path) => path,
        Err(e) => {
            let fallback = dirs::cache_dir()
                .map(|dir| dir.join("opflow"))
                .unwrap_or_else(|| PathBuf::from(".opflow-cache"));
            log::warn!(
                "Cannot canonicalize temp directory ({}), using {}",
                e,
                fallback.display()
            );
            fallback
        }
    }
}

/// Canonical temporary directory of this process.
pub fn canonical_temp_dir() -> &'static Path {
    CANONICAL_TEMP_DIR.as_path()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dir_is_stable() {
        let first = canonical_temp_dir();
        let second = canonical_temp_dir();
        assert_eq!(first, second);
        assert!(!first.as_os_str().is_empty());
    }
}
