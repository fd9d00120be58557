//! Path pattern compilation and matching.
//!
//! # Responsibilities
//! - Compile a pattern string into segments (literal, single wildcard, trailing wildcard)
//! - Match a request path against a compiled pattern
//! - Order matching patterns by specificity
//!
//! # Design Decisions
//! - Empty segments are ignored on both sides (`/a//b` == `/a/b`)
//! - Literal matching is case-sensitive
//! - Invalid patterns are rejected when compiled, never at match time
//! - No regex to guarantee O(segments) matching

use std::cmp::Ordering;
use thiserror::Error;

/// Errors raised when compiling a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern must start with '/': {0}")]
    NotAbsolute(String),

    #[error("pattern has no segments: {0}")]
    Empty(String),

    #[error("trailing wildcard must be the last segment: {0}")]
    MisplacedWildcard(String),

    #[error("malformed wildcard segment '{segment}' in {pattern}")]
    MalformedSegment { pattern: String, segment: String },
}

/// A single compiled pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches exactly this text.
    Literal(String),
    /// `{name}`: matches exactly one segment.
    Param(String),
    /// `*` or `{*name}`: matches one or more remaining segments.
    Rest(String),
}

impl Segment {
    fn parse(pattern: &str, raw: &str) -> Result<Self, PatternError> {
        if raw == "*" {
            return Ok(Segment::Rest(String::new()));
        }
        if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            let malformed = || PatternError::MalformedSegment {
                pattern: pattern.to_string(),
                segment: raw.to_string(),
            };
            if let Some(name) = inner.strip_prefix('*') {
                if name.contains(['{', '}', '*']) {
                    return Err(malformed());
                }
                return Ok(Segment::Rest(name.to_string()));
            }
            if inner.is_empty() || inner.contains(['{', '}', '*']) {
                return Err(malformed());
            }
            return Ok(Segment::Param(inner.to_string()));
        }
        if raw.contains(['{', '}']) {
            return Err(PatternError::MalformedSegment {
                pattern: pattern.to_string(),
                segment: raw.to_string(),
            });
        }
        Ok(Segment::Literal(raw.to_string()))
    }

    fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compile a pattern string.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if !raw.starts_with('/') {
            return Err(PatternError::NotAbsolute(raw.to_string()));
        }

        let segments = split_path(raw)
            .map(|s| Segment::parse(raw, s))
            .collect::<Result<Vec<_>, _>>()?;

        if segments.is_empty() {
            return Err(PatternError::Empty(raw.to_string()));
        }

        let last = segments.len() - 1;
        if segments[..last].iter().any(|s| matches!(s, Segment::Rest(_))) {
            return Err(PatternError::MisplacedWildcard(raw.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The pattern as it was registered.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns true if the path matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        let path: Vec<&str> = split_path(path).collect();
        self.matches_segments(&path)
    }

    /// Match against a path that has already been split.
    pub fn matches_segments(&self, path: &[&str]) -> bool {
        let mut idx = 0;
        for segment in &self.segments {
            match segment {
                Segment::Rest(_) => return idx < path.len(),
                Segment::Param(_) => {
                    if idx >= path.len() {
                        return false;
                    }
                }
                Segment::Literal(lit) => {
                    if path.get(idx) != Some(&lit.as_str()) {
                        return false;
                    }
                }
            }
            idx += 1;
        }
        idx == path.len()
    }

    /// Literal segments before the first wildcard.
    pub fn literal_prefix(&self) -> &[Segment] {
        let end = self
            .segments
            .iter()
            .position(|s| !s.is_literal())
            .unwrap_or(self.segments.len());
        &self.segments[..end]
    }

    /// Returns true if this pattern's literal prefix is contained in `other`'s,
    /// i.e. `other` is at least as narrow as `self`.
    pub fn prefix_contained_in(&self, other: &Pattern) -> bool {
        let mine = self.literal_prefix();
        let theirs = other.literal_prefix();
        theirs.len() >= mine.len() && theirs[..mine.len()] == *mine
    }

    fn has_rest(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Rest(_)))
    }

    /// Total specificity order. `Greater` means `self` is the more specific pattern.
    ///
    /// Longer literal prefix wins, then more literal segments, then a pattern
    /// without a trailing wildcard, then more segments. Patterns that tie are
    /// `Equal` and the caller keeps whichever it saw first.
    pub fn specificity(&self, other: &Pattern) -> Ordering {
        let literals = |p: &Pattern| p.segments.iter().filter(|s| s.is_literal()).count();

        self.literal_prefix()
            .len()
            .cmp(&other.literal_prefix().len())
            .then_with(|| literals(self).cmp(&literals(other)))
            .then_with(|| other.has_rest().cmp(&self.has_rest()))
            .then_with(|| self.segments.len().cmp(&other.segments.len()))
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split a path into its non-empty segments, ignoring any query string.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    path.split('/').filter(|s| !s.is_empty())
}

/// Pick the single most specific pattern out of the matching candidates.
///
/// Candidates are evaluated in iteration order; on a specificity tie the
/// earlier candidate is kept.
pub fn most_specific<'a, I>(candidates: I) -> Option<&'a Pattern>
where
    I: IntoIterator<Item = &'a Pattern>,
{
    let mut best: Option<&Pattern> = None;
    for candidate in candidates {
        best = match best {
            Some(current) if candidate.specificity(current) != Ordering::Greater => Some(current),
            _ => Some(candidate),
        };
    }
    best
}
