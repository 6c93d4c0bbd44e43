//! SQL `LIKE` style name patterns.

use regex::Regex;

use extreg_protocols::ExtensionError;

/// Case-insensitive pattern where `%` matches any run of characters and `_`
/// matches exactly one. Everything else is literal.
#[derive(Debug, Clone)]
pub struct LikePattern {
    source: String,
    regex: Regex,
}

impl LikePattern {
    pub fn new(pattern: &str) -> Result<Self, ExtensionError> {
        let mut translated = String::with_capacity(pattern.len() + 8);
        translated.push_str("(?is)^");
        for c in pattern.chars() {
            match c {
                '%' => translated.push_str(".*"),
                '_' => translated.push('.'),
                other => translated.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        translated.push('$');

        let regex = Regex::new(&translated).map_err(|e| {
            ExtensionError::InvalidReference(format!("bad pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Compile an optional pattern; `None` and `%` both match everything.
    pub fn optional(pattern: Option<&str>) -> Result<Option<Self>, ExtensionError> {
        match pattern {
            None | Some("%") => Ok(None),
            Some(p) => Self::new(p).map(Some),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// True when `pattern` is absent or matches `value`.
pub fn matches_opt(pattern: Option<&LikePattern>, value: &str) -> bool {
    pattern.is_none_or(|p| p.matches(value))
}
