use ignore::gitignore::{Gitignore, GitignoreBuilder};
use regex::Regex;
use std::path::Path;

/// Decides which files never reach the correlator.
///
/// Two layers: gitignore-style rules (the root's `.gitignore` and `.ignore`
/// plus build-output defaults) and user regex patterns matched against the
/// root-relative path with `/` separators. A pattern that fails to compile
/// is reported and skipped; the rest still apply.
pub struct FileExclusion {
    ignore: Gitignore,
    patterns: Vec<Regex>,
}

impl FileExclusion {
    pub fn new(root: &Path, patterns: &[String]) -> Self {
        let mut builder = GitignoreBuilder::new(root);
        builder.add(root.join(".gitignore"));
        builder.add(root.join(".ignore"));

        let defaults = [
            "node_modules/", ".next/", ".turbo/", ".vercel/", ".git/",
            "dist/", "build/", "out/", "coverage/", "storybook-static/",
            "*.d.ts", "*.min.js", "*.map",
        ];
        for pattern in defaults {
            builder.add_line(None, pattern).ok();
        }

        Self {
            ignore: builder.build().unwrap_or_else(|_| Gitignore::empty()),
            patterns: compile_patterns(patterns),
        }
    }

    /// Regex patterns only, without gitignore rules
    pub fn from_patterns(patterns: &[String]) -> Self {
        Self {
            ignore: Gitignore::empty(),
            patterns: compile_patterns(patterns),
        }
    }

    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        if self.ignore.matched(path, is_dir).is_ignore() {
            return true;
        }
        let normalized = normalize_path(path, self.ignore.path());
        self.patterns.iter().any(|p| p.is_match(&normalized))
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!("Ignoring invalid exclude pattern {:?}: {}", pattern, e);
                None
            }
        })
        .collect()
}

/// Root-relative path with `/` separators
fn normalize_path(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}
