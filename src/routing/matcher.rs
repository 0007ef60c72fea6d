//! Ant-style path pattern matching.
//!
//! # Responsibilities
//! - Decide whether a string is a pattern at all
//! - Match a pattern against a concrete request path
//! - Extract named template variables from a matched path
//!
//! # Pattern Syntax
//! - `?` one character, `*` zero or more characters within a segment
//! - `**` zero or more whole segments
//! - `{name}` / `{name:regex}` captured template variables
//!
//! # Design Decisions
//! - Literal patterns short-circuit to string equality
//! - Tokenized patterns and compiled segments are memoized in bounded caches
//! - A cheap literal-prefix pre-check rejects most misses before tokenizing
//! - Interior `**` runs are placed first-fit, left to right (no backtracking)

use indexmap::IndexMap;
use std::sync::Arc;

use crate::error::PatternError;
use crate::routing::cache::BoundedCache;
use crate::routing::segment::SegmentMatcher;

/// Default path separator.
pub const DEFAULT_SEPARATOR: char = '/';

/// Default number of cached tokenizations / compiled segments before a reset.
pub const DEFAULT_CACHE_LIMIT: usize = 65_536;

const DOUBLE_WILDCARD: &str = "**";

/// Ordered map of extracted template variables.
pub type UriVariables = IndexMap<String, String>;

/// Ant-style path matcher with memoized tokenization and segment compilation.
#[derive(Debug)]
pub struct PathMatcher {
    separator: char,
    tokens: BoundedCache<Vec<String>>,
    segments: BoundedCache<SegmentMatcher>,
}

impl Default for PathMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATOR, DEFAULT_CACHE_LIMIT)
    }
}

impl PathMatcher {
    /// Create a matcher with a custom separator and cache bound.
    pub fn new(separator: char, cache_limit: usize) -> Self {
        Self {
            separator,
            tokens: BoundedCache::new(cache_limit),
            segments: BoundedCache::new(cache_limit),
        }
    }

    /// The path separator this matcher tokenizes on.
    pub fn separator(&self) -> char {
        self.separator
    }

    /// True iff `path` contains any wildcard or template character.
    pub fn is_pattern(&self, path: &str) -> bool {
        path.contains(is_wildcard_char)
    }

    /// Match `pattern` against `path`.
    ///
    /// Only fails if a pattern segment does not compile.
    pub fn matches(&self, pattern: &str, path: &str) -> Result<bool, PatternError> {
        if !self.is_pattern(pattern) {
            return Ok(pattern == path);
        }
        self.do_match(pattern, path, None)
    }

    /// Extract template variables from a path the pattern is known to match.
    ///
    /// Returns [`PatternError::Unmatched`] if the pattern does not match.
    pub fn extract_variables(&self, pattern: &str, path: &str) -> Result<UriVariables, PatternError> {
        let mut variables = UriVariables::new();
        let matched = if self.is_pattern(pattern) {
            self.do_match(pattern, path, Some(&mut variables))?
        } else {
            pattern == path
        };

        if !matched {
            return Err(PatternError::Unmatched {
                pattern: pattern.to_string(),
                path: path.to_string(),
            });
        }
        Ok(variables)
    }

    /// Compile every segment of `pattern`, surfacing configuration errors
    /// before the pattern is ever used to serve traffic.
    pub fn validate(&self, pattern: &str) -> Result<(), PatternError> {
        if !self.is_pattern(pattern) {
            return Ok(());
        }
        for token in self.tokenize(pattern).iter() {
            if token != DOUBLE_WILDCARD {
                self.segment(token)?;
            }
        }
        Ok(())
    }

    /// The literal portion of `pattern` up to (excluding) the separator that
    /// precedes its first wildcard character. Root separator when there is none.
    pub fn constant_prefix<'a>(&self, pattern: &'a str) -> &'a str {
        let Some(wildcard) = pattern.find(is_wildcard_char) else {
            return pattern;
        };
        match pattern[..wildcard].rfind(self.separator) {
            Some(0) | None => root(self.separator, pattern),
            Some(idx) => &pattern[..idx],
        }
    }

    fn do_match(
        &self,
        pattern: &str,
        path: &str,
        mut variables: Option<&mut UriVariables>,
    ) -> Result<bool, PatternError> {
        let sep = self.separator;
        if path.starts_with(sep) != pattern.starts_with(sep) {
            return Ok(false);
        }

        let patt = self.tokenize(pattern);
        if !self.is_potential_match(path, &patt) {
            return Ok(false);
        }
        let dirs = self.tokenize(path);

        let mut patt_start = 0isize;
        let mut patt_end = patt.len() as isize - 1;
        let mut path_start = 0isize;
        let mut path_end = dirs.len() as isize - 1;

        // Head: up to the first `**`.
        while patt_start <= patt_end && path_start <= path_end {
            let token = &patt[patt_start as usize];
            if token == DOUBLE_WILDCARD {
                break;
            }
            if !self.match_segment(token, &dirs[path_start as usize], variables.as_deref_mut())? {
                return Ok(false);
            }
            patt_start += 1;
            path_start += 1;
        }

        if path_start > path_end {
            // Path exhausted: the rest of the pattern must be able to match nothing.
            if patt_start > patt_end {
                return Ok(pattern.ends_with(sep) == path.ends_with(sep));
            }
            if patt_start == patt_end && patt[patt_start as usize] == "*" && path.ends_with(sep) {
                return Ok(true);
            }
            return Ok(only_double_wildcards(&patt[patt_start as usize..=patt_end as usize]));
        } else if patt_start > patt_end {
            // Pattern exhausted with path segments left over.
            return Ok(false);
        }

        // Tail: back to the last `**`.
        while patt_start <= patt_end && path_start <= path_end {
            let token = &patt[patt_end as usize];
            if token == DOUBLE_WILDCARD {
                break;
            }
            if !self.match_segment(token, &dirs[path_end as usize], variables.as_deref_mut())? {
                return Ok(false);
            }
            if patt_end as usize == patt.len() - 1 && pattern.ends_with(sep) != path.ends_with(sep) {
                return Ok(false);
            }
            patt_end -= 1;
            path_end -= 1;
        }

        if path_start > path_end {
            return Ok(only_double_wildcards(&patt[patt_start as usize..=patt_end as usize]));
        }

        // Middle: place each literal run between `**`s first-fit.
        while patt_start != patt_end && path_start <= path_end {
            let next_double = ((patt_start + 1)..=patt_end)
                .find(|&i| patt[i as usize] == DOUBLE_WILDCARD)
                .unwrap_or(-1);

            if next_double == patt_start + 1 {
                // `**/**` collapses
                patt_start += 1;
                continue;
            }

            let run_len = next_double - patt_start - 1;
            let remaining = path_end - path_start + 1;
            let mut found = None;

            'search: for offset in 0..=(remaining - run_len) {
                for j in 0..run_len {
                    let token = &patt[(patt_start + j + 1) as usize];
                    let dir = &dirs[(path_start + offset + j) as usize];
                    if !self.match_segment(token, dir, variables.as_deref_mut())? {
                        continue 'search;
                    }
                }
                found = Some(path_start + offset);
                break;
            }

            let Some(found) = found else {
                return Ok(false);
            };
            patt_start = next_double;
            path_start = found + run_len;
        }

        Ok(only_double_wildcards(&patt[patt_start as usize..=patt_end as usize]))
    }

    /// Walk the literal prefix of each pattern token against the raw path,
    /// bailing out as soon as a literal provably cannot line up.
    fn is_potential_match(&self, path: &str, patt: &[String]) -> bool {
        let bytes = path.as_bytes();
        let mut sep_buf = [0u8; 4];
        let sep = self.separator.encode_utf8(&mut sep_buf).as_bytes();
        let mut pos = 0;

        for token in patt {
            while bytes[pos..].starts_with(sep) {
                pos += sep.len();
            }
            let skipped = skip_literal(bytes, pos, token.as_bytes());
            if skipped < token.len() {
                return skipped > 0 || token.starts_with(is_wildcard_char);
            }
            pos += skipped;
        }
        true
    }

    fn match_segment(
        &self,
        token: &str,
        dir: &str,
        variables: Option<&mut UriVariables>,
    ) -> Result<bool, PatternError> {
        Ok(self.segment(token)?.matches(dir, variables))
    }

    fn segment(&self, token: &str) -> Result<Arc<SegmentMatcher>, PatternError> {
        self.segments.get_or_try_insert(token, || SegmentMatcher::compile(token))
    }

    fn tokenize(&self, path: &str) -> Arc<Vec<String>> {
        let sep = self.separator;
        self.tokens.get_or_insert(path, || {
            path.split(sep)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

fn is_wildcard_char(c: char) -> bool {
    matches!(c, '*' | '?' | '{' | '}')
}

fn only_double_wildcards(tokens: &[String]) -> bool {
    tokens.iter().all(|t| t == DOUBLE_WILDCARD)
}

fn root(separator: char, pattern: &str) -> &str {
    let len = separator.len_utf8();
    if pattern.starts_with(separator) {
        &pattern[..len]
    } else {
        ""
    }
}

/// Count how many bytes of `literal` (up to its first wildcard) line up with
/// `path` starting at `pos`. Returns 0 when the path runs out.
fn skip_literal(path: &[u8], pos: usize, literal: &[u8]) -> usize {
    let mut skipped = 0;
    for &c in literal {
        if is_wildcard_char(c as char) {
            return skipped;
        }
        let current = pos + skipped;
        if current >= path.len() {
            return 0;
        }
        if c == path[current] {
            skipped += 1;
        }
    }
    skipped
}
