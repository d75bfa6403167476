//! Build variable templating for pipeline definitions.
//!
//! A pipeline template references the build's commit facts with
//! `${...}` variables:
//! - `${git.sha}` - Full commit SHA of the triggering push
//! - `${git.short_sha}` - Short (7 char) commit SHA
//! - `${git.clone_url}` - Clone URL of the source repository
//!
//! Rendering is strict: a reference to any name outside this set fails
//! with [`ConfigError::UnknownVariable`] before the document is parsed.

use regex::Regex;
use std::sync::LazyLock;

use crate::{ConfigError, ConfigResult};

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

/// The identifying facts of one build, fixed at trigger time.
///
/// Constructed once per build and read-only afterwards. The field set is
/// closed: there is no way to attach a variable this type does not name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildVars {
    /// Full commit SHA.
    pub sha: String,
    /// First 7 characters of the SHA.
    pub short_sha: String,
    /// Clone URL of the source repository.
    pub clone_url: String,
}

impl BuildVars {
    pub fn new(sha: impl Into<String>, clone_url: impl Into<String>) -> Self {
        let sha = sha.into();
        let short_sha = sha.chars().take(7).collect();
        Self {
            sha,
            short_sha,
            clone_url: clone_url.into(),
        }
    }

    /// Resolve a variable name to its value.
    fn resolve(&self, var_name: &str) -> Option<&str> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["git", "sha"] => Some(&self.sha),
            ["git", "short_sha"] => Some(&self.short_sha),
            ["git", "clone_url"] => Some(&self.clone_url),
            _ => None,
        }
    }
}

/// Substitute every `${...}` reference in `template` with its value from
/// `vars`.
///
/// Fails if the template references a variable the context does not
/// carry. Performs no schema validation of the result; that is the
/// pipeline parser's job.
pub fn render(template: &str, vars: &BuildVars) -> ConfigResult<String> {
    if let Some(unknown) = VAR_REGEX
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .find(|name| vars.resolve(name).is_none())
    {
        return Err(ConfigError::UnknownVariable(unknown));
    }

    Ok(VAR_REGEX
        .replace_all(template, |caps: &regex::Captures| {
            // Checked above, every reference resolves.
            vars.resolve(&caps[1]).unwrap_or_default().to_string()
        })
        .to_string())
}
