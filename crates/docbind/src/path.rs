//! Path templates with `$name` placeholders and their resolution against a
//! [`VariableMap`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigError;
use crate::reactive::VariableMap;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder pattern"));

/// A parsed path such as `users/$uid/posts`.
///
/// A `$` that is not followed by a name character is kept literally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    placeholders: Vec<String>,
}

impl PathTemplate {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let mut placeholders: Vec<String> = Vec::new();
        for caps in PLACEHOLDER.captures_iter(&raw) {
            let name = &caps[1];
            if !placeholders.iter().any(|p| p == name) {
                placeholders.push(name.to_string());
            }
        }
        Self { raw, placeholders }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Distinct placeholder names, in order of first appearance.
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    pub fn is_static(&self) -> bool {
        self.placeholders.is_empty()
    }
}

impl std::fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Fail with [`ConfigError::MissingVariable`] for the first placeholder that
/// `variables` does not cover.
pub fn check_variables(template: &PathTemplate, variables: &VariableMap) -> Result<(), ConfigError> {
    match template
        .placeholders()
        .iter()
        .find(|name| !variables.contains(name))
    {
        Some(name) => Err(ConfigError::MissingVariable { name: name.clone() }),
        None => Ok(()),
    }
}

/// Substitute every `$name` in `template` with the current value of the
/// matching cell.
///
/// Substituted values are not re-scanned, so a value that itself contains
/// `$x` is inserted verbatim.
pub fn resolve_path(template: &PathTemplate, variables: &VariableMap) -> Result<String, ConfigError> {
    check_variables(template, variables)?;
    if template.is_static() {
        return Ok(template.raw.clone());
    }

    let raw = template.as_str();
    let mut out = String::with_capacity(raw.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(raw) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let cell = variables
            .get(name.as_str())
            .ok_or_else(|| ConfigError::MissingVariable {
                name: name.as_str().to_string(),
            })?;
        out.push_str(&raw[last..whole.start()]);
        out.push_str(&cell.value().to_string());
        last = whole.end();
    }
    out.push_str(&raw[last..]);
    Ok(out)
}
