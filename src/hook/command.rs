//! Hook command templates.
//!
//! A template is split into words like a shell would, then every word of
//! the form `{name}` is replaced by the string form of a placeholder and
//! every word of the form `{*name}` by one argument per element of a list
//! placeholder. Nothing here spawns processes.

use std::collections::BTreeMap;
use std::fmt;

use super::HookError;

/// A list placeholder value.
///
/// The joiner is only used when the list is substituted as a single word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListValue {
    pub values: Vec<String>,
    pub joiner: String,
}

impl ListValue {
    /// A list joined by single spaces.
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            joiner: " ".to_string(),
        }
    }

    pub fn with_joiner(mut self, joiner: impl Into<String>) -> Self {
        self.joiner = joiner.into();
        self
    }
}

impl fmt::Display for ListValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.values.join(&self.joiner))
    }
}

/// Value bound to a placeholder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookValue {
    Scalar(String),
    List(ListValue),
}

impl fmt::Display for HookValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookValue::Scalar(value) => f.write_str(value),
            HookValue::List(list) => list.fmt(f),
        }
    }
}

/// Named placeholder values for one hook invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders(BTreeMap<String, HookValue>);

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a scalar value.
    pub fn scalar(mut self, name: &str, value: impl Into<String>) -> Self {
        self.0
            .insert(name.to_string(), HookValue::Scalar(value.into()));
        self
    }

    /// Bind an optional scalar value; absent values become empty strings.
    pub fn optional(self, name: &str, value: Option<&str>) -> Self {
        self.scalar(name, value.unwrap_or_default())
    }

    /// Bind a list value.
    pub fn list(mut self, name: &str, value: ListValue) -> Self {
        self.0.insert(name.to_string(), HookValue::List(value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&HookValue> {
        self.0.get(name)
    }
}

/// Split a command line into words using the platform's quoting rules.
pub fn tokenize(hook: &str, command: &str) -> Result<Vec<String>, HookError> {
    #[cfg(windows)]
    let words = split_windows_command(command);
    #[cfg(not(windows))]
    let words = shlex::split(command);

    words.ok_or_else(|| HookError::InvalidCommand {
        hook: hook.to_string(),
        reason: "unbalanced quotes".to_string(),
    })
}

/// Build the argument vector for a hook command template.
pub fn build_command(
    hook: &str,
    template: &str,
    placeholders: &Placeholders,
) -> Result<Vec<String>, HookError> {
    let mut argv = Vec::new();

    for word in tokenize(hook, template)? {
        let Some(inner) = placeholder_name(&word) else {
            argv.push(word);
            continue;
        };

        let (name, expand) = match inner.strip_prefix('*') {
            Some(name) => (name, true),
            None => (inner, false),
        };

        let value = placeholders
            .get(name)
            .ok_or_else(|| HookError::UnknownPlaceholder {
                hook: hook.to_string(),
                placeholder: name.to_string(),
            })?;

        match (value, expand) {
            (HookValue::List(list), true) => argv.extend(list.values.iter().cloned()),
            (HookValue::Scalar(_), true) => {
                return Err(HookError::NotExpandable {
                    hook: hook.to_string(),
                    placeholder: name.to_string(),
                })
            }
            (value, false) => argv.push(value.to_string()),
        }
    }

    Ok(argv)
}

fn placeholder_name(word: &str) -> Option<&str> {
    if word.len() >= 2 && word.starts_with('{') && word.ends_with('}') {
        Some(&word[1..word.len() - 1])
    } else {
        None
    }
}

/// Split a command line following the Windows `CommandLineToArgvW` rules.
///
/// Returns `None` when a quoted section is left open.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn split_windows_command(command: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut in_quotes = false;
    let mut backslashes = 0usize;

    for c in command.chars() {
        match c {
            '\\' => {
                backslashes += 1;
                in_word = true;
            }
            '"' => {
                current.extend(std::iter::repeat('\\').take(backslashes / 2));
                if backslashes % 2 == 1 {
                    current.push('"');
                } else {
                    in_quotes = !in_quotes;
                }
                backslashes = 0;
                in_word = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                current.extend(std::iter::repeat('\\').take(backslashes));
                backslashes = 0;
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.extend(std::iter::repeat('\\').take(backslashes));
                backslashes = 0;
                current.push(c);
                in_word = true;
            }
        }
    }

    if in_quotes {
        return None;
    }
    current.extend(std::iter::repeat('\\').take(backslashes));
    if in_word {
        words.push(current);
    }
    Some(words)
}
