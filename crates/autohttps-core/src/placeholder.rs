// Placeholder substitution for configuration values
//
// Placeholders look like `{key}`. Keys prefixed with `env.` are read from the process
// environment; every other key must be set on the replacer. A backslash before an opening
// brace keeps the brace literal.

use std::collections::HashMap;

use crate::error::AutoHttpsError;

const ENV_PREFIX: &str = "env.";

#[derive(Debug, Default, Clone)]
pub struct Replacer {
    values: HashMap<String, String>,
}

impl Replacer {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Sets a static value for a placeholder key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`Replacer::set`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Looks up a key, returning `None` when no provider knows about it
    fn lookup(&self, key: &str) -> Option<String> {
        if let Some(name) = key.strip_prefix(ENV_PREFIX) {
            // the environment provider knows every variable; unset ones resolve to nothing
            return Some(std::env::var(name).unwrap_or_default());
        }

        self.values.get(key).cloned()
    }

    /// Replaces every placeholder in `input`.
    ///
    /// Unknown placeholders are kept verbatim unless `err_on_unknown` is set, and placeholders
    /// that resolve to an empty value are removed unless `err_on_empty` is set.
    pub fn replace_or_err(
        &self,
        input: &str,
        err_on_empty: bool,
        err_on_unknown: bool,
    ) -> Result<String, AutoHttpsError> {
        let mut output = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(idx) = rest.find(['{', '\\']) {
            output.push_str(&rest[..idx]);
            let tail = &rest[idx..];

            if let Some(escaped) = tail.strip_prefix("\\{") {
                output.push('{');
                rest = escaped;
                continue;
            }

            if tail.starts_with('\\') {
                output.push('\\');
                rest = &tail[1..];
                continue;
            }

            let Some(end) = tail.find('}') else {
                output.push_str(tail);
                return Ok(output);
            };

            let key = &tail[1..end];
            if key.is_empty() || key.contains(char::is_whitespace) {
                output.push_str(&tail[..=end]);
                rest = &tail[end + 1..];
                continue;
            }

            match self.lookup(key) {
                Some(value) if value.is_empty() && err_on_empty => {
                    return Err(AutoHttpsError::Replacement {
                        input: input.to_string(),
                        message: format!("evaluated placeholder {{{key}}} is empty"),
                    });
                }
                Some(value) => output.push_str(&value),
                None if err_on_unknown => {
                    return Err(AutoHttpsError::Replacement {
                        input: input.to_string(),
                        message: format!("unrecognized placeholder {{{key}}}"),
                    });
                }
                None => output.push_str(&tail[..=end]),
            }

            rest = &tail[end + 1..];
        }

        output.push_str(rest);
        Ok(output)
    }

    /// Replaces every known placeholder and keeps the rest as-is
    pub fn replace_known(&self, input: &str) -> String {
        // cannot fail when neither error flag is set
        self.replace_or_err(input, false, false)
            .unwrap_or_else(|_| input.to_string())
    }
}
