//! Exclusion patterns
//!
//! Gitignore-syntax patterns matched against paths relative to the hot root.
//! Excluded directories are never watched and excluded paths never queued.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{DirsyncError, DirsyncResult};

/// Compiled exclusion patterns rooted at the hot directory.
#[derive(Debug, Clone)]
pub struct ExcludePatterns {
    matcher: Gitignore,
    pattern_count: usize,
}

impl ExcludePatterns {
    /// A pattern set that matches nothing.
    pub fn empty() -> Self {
        Self {
            matcher: Gitignore::empty(),
            pattern_count: 0,
        }
    }

    pub fn new<S: AsRef<str>>(root: &Path, patterns: &[S]) -> DirsyncResult<Self> {
        let mut builder = GitignoreBuilder::new(root);
        let mut pattern_count = 0;

        for pattern in patterns {
            let line = pattern.as_ref().trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            builder
                .add_line(None, line)
                .map_err(|e| DirsyncError::Validation(format!("invalid exclude pattern '{line}': {e}")))?;
            pattern_count += 1;
        }

        let matcher = builder
            .build()
            .map_err(|e| DirsyncError::Validation(format!("invalid exclude patterns: {e}")))?;

        Ok(Self {
            matcher,
            pattern_count,
        })
    }

    /// Whether `path` (absolute, under the root) is excluded.
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        if self.pattern_count == 0 {
            return false;
        }
        let Ok(relative) = path.strip_prefix(self.matcher.path()) else {
            return false;
        };
        if relative.as_os_str().is_empty() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern_count == 0
    }
}

impl Default for ExcludePatterns {
    fn default() -> Self {
        Self::empty()
    }
}
