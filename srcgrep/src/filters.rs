//! Directory pruning.
//!
//! Traversal never descends into directories whose base name is on the
//! exclusion list. The built-in list covers source-control and build
//! metadata directories; users extend it with `--ignore-dir`.

use std::collections::HashSet;

/// Directory base names that are never descended into by default.
const BUILTIN_DIR_EXCLUDES: &[&str] = &[
    ".bzr",
    ".git",
    ".hg",
    ".metadata",
    ".svn",
    "CMakeFiles",
    "CVS",
    "autom4te.cache",
    ".deps",
];

/// Decides whether a directory should be pruned, by exact base-name match.
#[derive(Debug, Default)]
pub struct DirFilter {
    excluded: HashSet<String>,
    compiled: bool,
}

impl DirFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds user-supplied directory names to the exclusion set.
    pub fn add_exclusions<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.excluded.insert(name.into());
        }
    }

    /// Folds the built-in exclusions into the set. Call once, after all
    /// user exclusions are known.
    pub fn compile(&mut self) {
        for name in BUILTIN_DIR_EXCLUDES {
            self.excluded.insert((*name).to_string());
        }
        self.compiled = true;
    }

    /// True if a directory with this base name must not be descended into.
    pub fn should_exclude(&self, base_name: &str) -> bool {
        debug_assert!(self.compiled, "DirFilter used before compile()");
        self.excluded.contains(base_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_exclusions() {
        let mut filter = DirFilter::new();
        filter.compile();

        assert!(filter.should_exclude(".git"));
        assert!(filter.should_exclude(".svn"));
        assert!(filter.should_exclude("CMakeFiles"));
        assert!(filter.should_exclude("autom4te.cache"));
        assert!(filter.should_exclude(".deps"));
        assert!(!filter.should_exclude("src"));
        assert!(!filter.should_exclude(".github"));
    }

    #[test]
    fn test_user_exclusions() {
        let mut filter = DirFilter::new();
        filter.add_exclusions(["node_modules", "target"]);
        filter.compile();

        assert!(filter.should_exclude("node_modules"));
        assert!(filter.should_exclude("target"));
        // Built-ins still apply alongside user additions.
        assert!(filter.should_exclude(".git"));
    }

    #[test]
    fn test_exact_match_only() {
        let mut filter = DirFilter::new();
        filter.compile();

        // Matching is exact string equality on the base name, not substring
        // or glob.
        assert!(!filter.should_exclude(".gitignore"));
        assert!(!filter.should_exclude("my.git"));
    }
}
