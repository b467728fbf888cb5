//! Route matching logic.
//!
//! # Responsibilities
//! - Parse route patterns (exact path or trailing-slash prefix)
//! - Match request methods against a route's method filter
//! - Rank matching patterns by specificity
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - No regex or path parameters: exact and prefix patterns only
//! - Specificity is a total order so dispatch is deterministic
//! - Request paths are matched in canonical form only (see [`canonical_path`])

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use axum::http::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::router::RouteError;

/// Method condition of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MethodFilter {
    Get,
    Post,
    Put,
    Delete,
    Any,
}

impl MethodFilter {
    /// Returns true if a request with `method` satisfies this filter.
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Get => method == Method::GET,
            MethodFilter::Post => method == Method::POST,
            MethodFilter::Put => method == Method::PUT,
            MethodFilter::Delete => method == Method::DELETE,
        }
    }

    /// The specific filter for a request method, if it has one.
    pub fn for_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(MethodFilter::Get),
            Method::POST => Some(MethodFilter::Post),
            Method::PUT => Some(MethodFilter::Put),
            Method::DELETE => Some(MethodFilter::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MethodFilter::Get => "GET",
            MethodFilter::Post => "POST",
            MethodFilter::Put => "PUT",
            MethodFilter::Delete => "DELETE",
            MethodFilter::Any => "ANY",
        }
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodFilter {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(MethodFilter::Get),
            "POST" => Ok(MethodFilter::Post),
            "PUT" => Ok(MethodFilter::Put),
            "DELETE" => Ok(MethodFilter::Delete),
            "ANY" | "*" => Ok(MethodFilter::Any),
            other => Err(RouteError::UnknownMethod(other.to_string())),
        }
    }
}

/// A compiled path pattern.
///
/// A trailing `/` denotes "this path and everything under it"; anything
/// else must match the request path exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
}

/// Rank of a pattern. Exact beats prefix, then longer literal wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    exact: bool,
    literal_len: usize,
}

impl PathPattern {
    /// Parse a route pattern, rejecting anything the matcher cannot honor.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        if raw.is_empty() {
            return Err(RouteError::EmptyPattern);
        }
        if !raw.starts_with('/') {
            return Err(RouteError::MissingLeadingSlash(raw.to_string()));
        }
        if let Some(c) = raw
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '*' | '{' | '}' | '?' | '#'))
        {
            return Err(RouteError::UnsupportedCharacter(raw.to_string(), c));
        }
        match canonical_path(raw) {
            Ok(canonical) if canonical == raw => {}
            Err(PathError::DotSegment) => return Err(RouteError::DotSegment(raw.to_string())),
            _ => return Err(RouteError::NonCanonical(raw.to_string())),
        }

        if raw.ends_with('/') {
            Ok(PathPattern::Prefix(raw.to_string()))
        } else {
            Ok(PathPattern::Exact(raw.to_string()))
        }
    }

    /// Returns true if the request path falls under this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(p) => path == p,
            PathPattern::Prefix(p) => path.starts_with(p.as_str()) || path == &p[..p.len() - 1],
        }
    }

    pub fn specificity(&self) -> Specificity {
        match self {
            PathPattern::Exact(p) => Specificity { exact: true, literal_len: p.len() },
            PathPattern::Prefix(p) => Specificity { exact: false, literal_len: p.len() },
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PathPattern::Exact(p) | PathPattern::Prefix(p) => p,
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request path has no canonical form.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("empty path segment")]
    EmptySegment,

    #[error("`.` or `..` segment")]
    DotSegment,

    #[error("encoded or backslash path separator")]
    Separator,

    #[error("malformed percent-encoding")]
    InvalidEscape,
}

/// The canonical spelling of a request path.
///
/// Percent-encoded unreserved characters are decoded and the remaining
/// escapes are upper-cased, so one resource has exactly one spelling. Paths
/// that an upstream could resolve differently from the router are refused:
/// empty interior segments, `.`/`..` segments (plain or encoded), `%2F`,
/// `%5C` and literal backslashes.
pub fn canonical_path(path: &str) -> Result<Cow<'_, str>, PathError> {
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len() - 1;
    let mut canonical = String::with_capacity(path.len());
    let mut changed = false;

    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            canonical.push('/');
        }
        if segment.is_empty() {
            if i == 0 || i == last {
                continue;
            }
            return Err(PathError::EmptySegment);
        }

        let decoded = decode_segment(segment)?;
        if decoded == "." || decoded == ".." {
            return Err(PathError::DotSegment);
        }
        changed |= decoded != *segment;
        canonical.push_str(&decoded);
    }

    Ok(if changed {
        Cow::Owned(canonical)
    } else {
        Cow::Borrowed(path)
    })
}

fn decode_segment(segment: &str) -> Result<Cow<'_, str>, PathError> {
    if segment.contains('\\') {
        return Err(PathError::Separator);
    }
    if !segment.contains('%') {
        return Ok(Cow::Borrowed(segment));
    }

    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let byte = match bytes.get(i + 1..i + 3) {
            Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                (hex_value(*hi) << 4) | hex_value(*lo)
            }
            _ => return Err(PathError::InvalidEscape),
        };
        match byte {
            b'/' | b'\\' => return Err(PathError::Separator),
            b if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') => out.push(b),
            b => out.extend_from_slice(format!("%{b:02X}").as_bytes()),
        }
        i += 3;
    }

    String::from_utf8(out)
        .map(Cow::Owned)
        .map_err(|_| PathError::InvalidEscape)
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}
