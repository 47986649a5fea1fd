//! Editing-session scripts.
//!
//! A script is a plain text file with one step per line:
//!
//! ```text
//! # comments and blank lines are ignored
//! edit Hello, world\n      append text as a local edit
//! remote Hi from Bob      merge text from a collaborator
//! wait 61s                let time pass (ms, s or m)
//! navigate /settings      in-app navigation is about to start
//! unload                  the page is about to be discarded
//! eligible false          toggle save eligibility
//! flush                   request a save now
//! ```

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// One action in an editing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Edit(String),
    Remote(String),
    Wait(Duration),
    Navigate(String),
    Unload,
    Eligible(bool),
    Flush,
}

/// A step and the line it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStep {
    pub line: usize,
    pub step: Step,
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to read script {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: unknown step '{keyword}'")]
    UnknownStep { line: usize, keyword: String },

    #[error("line {line}: '{keyword}' requires an argument")]
    MissingArgument { line: usize, keyword: &'static str },

    #[error("line {line}: '{keyword}' takes no argument")]
    UnexpectedArgument { line: usize, keyword: &'static str },

    #[error("line {line}: invalid duration '{value}' (expected e.g. 500ms, 2s, 1m)")]
    InvalidDuration { line: usize, value: String },

    #[error("line {line}: expected true or false, got '{value}'")]
    InvalidBool { line: usize, value: String },
}

pub fn read_script(path: &Path) -> Result<Vec<ScriptStep>, ScriptError> {
    let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_script(&source)
}

pub fn parse_script(source: &str) -> Result<Vec<ScriptStep>, ScriptError> {
    let mut steps = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (keyword, argument) = match trimmed.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, Some(rest.trim()).filter(|rest| !rest.is_empty())),
            None => (trimmed, None),
        };
        let step = match keyword.to_ascii_lowercase().as_str() {
            "edit" => Step::Edit(unescape(require(line, "edit", argument)?)),
            "remote" => Step::Remote(unescape(require(line, "remote", argument)?)),
            "wait" => {
                let value = require(line, "wait", argument)?;
                let duration = parse_duration(value).ok_or_else(|| ScriptError::InvalidDuration {
                    line,
                    value: value.to_string(),
                })?;
                Step::Wait(duration)
            }
            "navigate" => Step::Navigate(require(line, "navigate", argument)?.to_string()),
            "unload" => {
                reject(line, "unload", argument)?;
                Step::Unload
            }
            "eligible" => {
                let value = require(line, "eligible", argument)?;
                let eligible = match value.to_ascii_lowercase().as_str() {
                    "true" | "yes" | "on" => true,
                    "false" | "no" | "off" => false,
                    _ => {
                        return Err(ScriptError::InvalidBool {
                            line,
                            value: value.to_string(),
                        });
                    }
                };
                Step::Eligible(eligible)
            }
            "flush" => {
                reject(line, "flush", argument)?;
                Step::Flush
            }
            _ => {
                return Err(ScriptError::UnknownStep {
                    line,
                    keyword: keyword.to_string(),
                });
            }
        };
        steps.push(ScriptStep { line, step });
    }
    Ok(steps)
}

/// Parse `500ms`, `2s` or `1m`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(amount)),
        "s" => Some(Duration::from_secs(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        _ => None,
    }
}

fn require<'a>(
    line: usize,
    keyword: &'static str,
    argument: Option<&'a str>,
) -> Result<&'a str, ScriptError> {
    argument.ok_or(ScriptError::MissingArgument { line, keyword })
}

fn reject(line: usize, keyword: &'static str, argument: Option<&str>) -> Result<(), ScriptError> {
    match argument {
        Some(_) => Err(ScriptError::UnexpectedArgument { line, keyword }),
        None => Ok(()),
    }
}

fn unescape(text: &str) -> String {
    text.replace("\\n", "\n").replace("\\t", "\t")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration("1m"), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_duration_rejects_bare_numbers() {
        assert_eq!(parse_duration("60"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("3h"), None);
    }

    #[test]
    fn test_edit_keeps_inner_whitespace() {
        let steps = parse_script("edit   Hello,  world\\n").unwrap();
        assert_eq!(steps[0].step, Step::Edit("Hello,  world\n".into()));
    }

    #[test]
    fn test_unknown_step_reports_line() {
        let err = parse_script("# header\n\nedit a\nsave now").unwrap_err();
        assert!(matches!(err, ScriptError::UnknownStep { line: 4, .. }));
    }

    #[test]
    fn test_unload_takes_no_argument() {
        let err = parse_script("unload now").unwrap_err();
        assert!(matches!(
            err,
            ScriptError::UnexpectedArgument {
                line: 1,
                keyword: "unload"
            }
        ));
    }
}
