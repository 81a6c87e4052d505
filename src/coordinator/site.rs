// Host-site pattern matching
//
// Config broadcasts only go to pages on the target site. Patterns use the
// browser match-pattern glob form, compiled to an anchored regex once at
// coordinator construction.

use regex::Regex;

/// Match pattern for the host site the filter targets.
pub const DEFAULT_SITE_PATTERN: &str = "*://github.com/*";

/// Compiled host-site URL filter.
///
/// `*` matches any run of characters (including none); everything else is
/// literal. The whole URL must match.
#[derive(Debug, Clone)]
pub struct SitePattern {
    pattern: String,
    regex: Regex,
}

impl SitePattern {
    /// Compile a glob pattern.
    ///
    /// # Arguments
    /// * `pattern` - Glob form such as `*://github.com/*`
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let escaped = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{escaped}$"))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// The default pattern targeting github.com on any scheme.
    pub fn github() -> Self {
        Self::new(DEFAULT_SITE_PATTERN).expect("Invalid default site pattern")
    }

    /// Check whether a page URL belongs to the target site.
    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    /// The glob form this pattern was compiled from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Default for SitePattern {
    fn default() -> Self {
        Self::github()
    }
}
