use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::warn;

use crate::config::Pattern;

/// Runtime filter compiled from include / exclude pattern lists.
#[derive(Debug, Clone)]
pub struct PathFilter {
    /// `None` means no include list was given, i.e. everything is included.
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl PathFilter {
    pub fn new(include: &[Pattern], exclude: &[Pattern]) -> Self {
        let include = if include.is_empty() {
            None
        } else {
            Some(compile(include))
        };
        Self {
            include,
            exclude: compile(exclude),
        }
    }

    /// Whether a given relative path takes part in the sync.
    pub fn allows<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        let included = match &self.include {
            None => true,
            Some(set) => set.is_match(path),
        };
        included && !self.exclude.is_match(path)
    }
}

fn compile(patterns: &[Pattern]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        match Glob::new(&pat.0) {
            Ok(g) => {
                builder.add(g);
            }
            Err(e) => warn!(pattern = %pat.0, "ignoring invalid glob: {e}"),
        }
    }
    builder
        .build()
        .unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_include_means_all() {
        let filter = PathFilter::new(&[], &[Pattern("*.tmp".into())]);
        assert!(filter.allows("notes.txt"));
        assert!(!filter.allows("scratch.tmp"));
    }

    #[test]
    fn include_narrows() {
        let include = vec![Pattern("**/*.md".into())];
        let exclude = vec![Pattern("drafts/**".into())];
        let filter = PathFilter::new(&include, &exclude);
        assert!(filter.allows("docs/readme.md"));
        assert!(!filter.allows("drafts/wip.md"));
        assert!(!filter.allows("src/lib.rs"));
    }
}
