use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern, PatternError};

/// Decides whether an absolute file path belongs to an input set.
///
/// Include and exclude globs are compiled once against a base directory and
/// matched against paths relative to it. Matching is pure, no I/O happens
/// here. Patterns support `**`, `*` and `?`; a single `*` never crosses a
/// directory separator.
#[derive(Debug)]
pub struct FileMatcher {
    basedir: Utf8PathBuf,
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
    options: MatchOptions,
}

impl FileMatcher {
    pub fn new(
        basedir: impl AsRef<Utf8Path>,
        includes: &[&str],
        excludes: &[&str],
    ) -> Result<Self, PatternError> {
        Ok(Self {
            basedir: basedir.as_ref().to_owned(),
            includes: compile(includes)?,
            excludes: compile(excludes)?,
            options: match_options(),
        })
    }

    /// True when `path` lies under the base directory, is selected by the
    /// include set (an empty set selects everything) and rejected by no
    /// exclude.
    pub fn matches(&self, path: impl AsRef<Utf8Path>) -> bool {
        let Ok(relative) = path.as_ref().strip_prefix(&self.basedir) else {
            return false;
        };
        let relative = relative.as_str();

        let included = self.includes.is_empty()
            || self
                .includes
                .iter()
                .any(|pattern| pattern.matches_with(relative, self.options));

        included
            && !self
                .excludes
                .iter()
                .any(|pattern| pattern.matches_with(relative, self.options))
    }
}

fn compile(patterns: &[&str]) -> Result<Vec<Pattern>, PatternError> {
    patterns.iter().map(|pattern| Pattern::new(pattern)).collect()
}

/// Filesystems on Windows and macOS are conventionally case-insensitive.
fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: !(cfg!(windows) || cfg!(target_os = "macos")),
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}
