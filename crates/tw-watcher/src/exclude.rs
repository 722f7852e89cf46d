//! Glob-based path exclusion.
//!
//! [`ExclusionMatcher`] holds the exclusion patterns a watcher was built
//! with. Every registration attempt and every inbound event is checked
//! against it; an excluded path is never handed to the backend and never
//! reaches the callback.
//!
//! # Pattern Syntax
//!
//! Patterns use shell-style globs matched against the whole absolute path:
//!
//! | Pattern | Matches |
//! |---------|---------|
//! | `*`     | Any run of characters except `/` |
//! | `?`     | Any single character except `/` |
//! | `[abc]` | Any character in the set |
//! | `[!a-z]`| Any character outside the range |
//!
//! A leading `*` covers a single component: `*/target` matches `/target`
//! but not `/srv/app/target`. Spell out the prefix (`/srv/*/target`).
//!
//! Recursive `**` is not supported: patterns containing it are rejected
//! like any other malformed pattern (logged, then never matched).
//!
//! # Examples
//!
//! ```
//! use camino::Utf8Path;
//! use tw_watcher::ExclusionMatcher;
//!
//! let matcher = ExclusionMatcher::new(["/srv/*/node_modules", "/srv/app/*.tmp"]);
//!
//! assert!(matcher.is_excluded(Utf8Path::new("/srv/app/node_modules")));
//! assert!(matcher.is_excluded(Utf8Path::new("/srv/app/build.tmp")));
//! assert!(!matcher.is_excluded(Utf8Path::new("/srv/app/lib")));
//! ```

use camino::Utf8Path;
use glob::{MatchOptions, Pattern};
use smallvec::SmallVec;

/// Separator-aware matching: wildcards never cross a `/`.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// An immutable, ordered set of exclusion globs.
#[derive(Debug, Clone, Default)]
pub struct ExclusionMatcher {
    patterns: SmallVec<[Pattern; 4]>,
}

impl ExclusionMatcher {
    /// Compiles the given patterns.
    ///
    /// Malformed patterns are logged and skipped, so they never match.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .filter_map(|raw| compile(raw.as_ref()))
            .collect();
        Self { patterns }
    }

    /// Returns `true` if `path` matches at least one pattern.
    pub fn is_excluded(&self, path: &Utf8Path) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_with(path.as_str(), MATCH_OPTIONS))
    }

    /// Returns the number of usable patterns.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns `true` if no usable pattern was configured.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn compile(raw: &str) -> Option<Pattern> {
    if raw.contains("**") {
        tracing::warn!(pattern = raw, "Ignoring exclusion pattern: recursive '**' is not supported");
        return None;
    }
    match Pattern::new(raw) {
        Ok(pattern) => Some(pattern),
        Err(err) => {
            tracing::warn!(pattern = raw, error = %err, "Ignoring malformed exclusion pattern");
            None
        }
    }
}
