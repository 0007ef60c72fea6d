//! Single-segment glob matching.
//!
//! A pattern segment such as `user-{id:\d+}.json` is compiled once into an
//! anchored regex:
//! - `?` matches exactly one character
//! - `*` matches zero or more characters
//! - `{name}` captures the segment portion under `name`
//! - `{name:regex}` captures under `name`, constrained by the inline regex
//!
//! Segments without any glob syntax are compared as plain strings.

use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::PatternError;

/// Glob syntax inside a segment: `?`, `*`, or a `{...}` template (which may
/// itself contain `{n}` quantifiers or escaped braces).
const GLOB_SYNTAX: &str = r"\?|\*|\{((?:\{[^/]+?\}|[^/{}]|\\[{}])+?)\}";

/// Regex used for `{name}` without an explicit constraint.
const DEFAULT_VARIABLE_PATTERN: &str = "((?s).*)";

fn glob_syntax() -> &'static Regex {
    static GLOB: OnceLock<Regex> = OnceLock::new();
    GLOB.get_or_init(|| Regex::new(GLOB_SYNTAX).expect("glob syntax regex is valid"))
}

/// A compiled pattern segment.
#[derive(Debug)]
pub enum SegmentMatcher {
    /// No glob syntax: plain string equality.
    Exact(String),
    /// Glob or template syntax compiled to an anchored regex.
    Template {
        regex: Regex,
        variables: Vec<String>,
    },
}

impl SegmentMatcher {
    /// Compile a pattern segment.
    ///
    /// Fails on a malformed inline regex, or when the compiled regex exposes a
    /// different number of capture groups than the variables it declares.
    pub fn compile(segment: &str) -> Result<Self, PatternError> {
        let mut pattern = String::with_capacity(segment.len() + 16);
        let mut variables = Vec::new();
        let mut end = 0;
        let mut has_glob = false;

        pattern.push('^');
        for caps in glob_syntax().captures_iter(segment) {
            let Some(whole) = caps.get(0) else { continue };
            has_glob = true;
            pattern.push_str(&regex::escape(&segment[end..whole.start()]));
            match whole.as_str() {
                "?" => pattern.push('.'),
                "*" => pattern.push_str(".*"),
                template => {
                    let inner = &template[1..template.len() - 1];
                    match inner.find(':') {
                        None => {
                            pattern.push_str(DEFAULT_VARIABLE_PATTERN);
                            variables.push(inner.to_string());
                        }
                        Some(colon) => {
                            pattern.push('(');
                            pattern.push_str(&inner[colon + 1..]);
                            pattern.push(')');
                            variables.push(inner[..colon].to_string());
                        }
                    }
                }
            }
            end = whole.end();
        }

        if !has_glob {
            return Ok(SegmentMatcher::Exact(segment.to_string()));
        }

        pattern.push_str(&regex::escape(&segment[end..]));
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| PatternError::InvalidRegex {
            segment: segment.to_string(),
            reason: e.to_string(),
        })?;

        let groups = regex.captures_len() - 1;
        if groups != variables.len() {
            return Err(PatternError::CaptureMismatch {
                segment: segment.to_string(),
                declared: variables.len(),
                groups,
            });
        }

        Ok(SegmentMatcher::Template { regex, variables })
    }

    /// Match a whole path segment, recording captured variables when asked.
    pub fn matches(&self, text: &str, variables: Option<&mut IndexMap<String, String>>) -> bool {
        match self {
            SegmentMatcher::Exact(expected) => expected == text,
            SegmentMatcher::Template {
                regex,
                variables: names,
            } => {
                let Some(caps) = regex.captures(text) else {
                    return false;
                };
                if let Some(out) = variables {
                    for (index, name) in names.iter().enumerate() {
                        if let Some(value) = caps.get(index + 1) {
                            out.insert(name.clone(), value.as_str().to_string());
                        }
                    }
                }
                true
            }
        }
    }

    /// Names of the template variables this segment declares, in order.
    pub fn variables(&self) -> &[String] {
        match self {
            SegmentMatcher::Exact(_) => &[],
            SegmentMatcher::Template { variables, .. } => variables,
        }
    }
}
