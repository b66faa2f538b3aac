//! URI template matching for resource templates.
//!
//! Supports the RFC 6570 subset resource templates actually use: simple
//! expressions `{var}` (match stops at `/`) and reserved expansion `{+var}`
//! (match may span `/`). Captured variables become the params handed to the
//! read handler.

use crate::core::error::{McpError, McpResult};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    /// `{var}` — greedy up to the next literal, never across `/`.
    Simple(String),
    /// `{+var}` — greedy up to the next literal, `/` allowed.
    Reserved(String),
}

/// A parsed URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    /// Parse a template string. Fails on unbalanced braces or empty
    /// variable names.
    pub fn parse(raw: &str) -> McpResult<Self> {
        let mut segments = Vec::new();
        let mut rest = raw;

        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let close = rest[open..]
                .find('}')
                .map(|i| open + i)
                .ok_or_else(|| McpError::invalid_params(format!("unbalanced brace in {raw}")))?;
            let expr = &rest[open + 1..close];
            let segment = match expr.strip_prefix('+') {
                Some(name) => Segment::Reserved(name.to_string()),
                None => Segment::Simple(expr.to_string()),
            };
            let name = match &segment {
                Segment::Simple(n) | Segment::Reserved(n) => n,
                Segment::Literal(_) => unreachable!(),
            };
            if name.is_empty() {
                return Err(McpError::invalid_params(format!(
                    "empty template variable in {raw}"
                )));
            }
            segments.push(segment);
            rest = &rest[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a concrete URI, returning the captured variables.
    ///
    /// Each variable consumes up to the next literal segment; a `{var}`
    /// capture containing `/` rejects the match while `{+var}` accepts it.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut captured = HashMap::new();
        let mut rest = uri;
        let mut i = 0;

        while i < self.segments.len() {
            match &self.segments[i] {
                Segment::Literal(lit) => {
                    rest = rest.strip_prefix(lit.as_str())?;
                    i += 1;
                }
                Segment::Simple(name) | Segment::Reserved(name) => {
                    let allow_slash = matches!(&self.segments[i], Segment::Reserved(_));
                    // The capture runs until the next literal, or to the end
                    // of the URI when the variable is trailing.
                    let value = match self.segments.get(i + 1) {
                        Some(Segment::Literal(next)) => {
                            let at = rest.find(next.as_str())?;
                            let (value, remainder) = rest.split_at(at);
                            rest = remainder;
                            value
                        }
                        _ => {
                            let value = rest;
                            rest = "";
                            value
                        }
                    };
                    if value.is_empty() {
                        return None;
                    }
                    if !allow_slash && value.contains('/') {
                        return None;
                    }
                    captured.insert(name.clone(), value.to_string());
                    i += 1;
                }
            }
        }

        if rest.is_empty() {
            Some(captured)
        } else {
            None
        }
    }

    /// Expand the template with the given variables. Missing variables
    /// expand to the empty string.
    pub fn expand(&self, vars: &HashMap<String, String>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Simple(name) | Segment::Reserved(name) => {
                    if let Some(value) = vars.get(name) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_variable_captures_one_segment() {
        let template = UriTemplate::parse("file:///logs/{name}.txt").unwrap();
        let vars = template.matches("file:///logs/app.txt").unwrap();
        assert_eq!(vars["name"], "app");
        assert!(template.matches("file:///logs/a/b.txt").is_none());
    }

    #[test]
    fn reserved_variable_spans_slashes() {
        let template = UriTemplate::parse("repo://{owner}/{+path}").unwrap();
        let vars = template.matches("repo://acme/src/main.rs").unwrap();
        assert_eq!(vars["owner"], "acme");
        assert_eq!(vars["path"], "src/main.rs");
    }

    #[test]
    fn trailing_literal_must_match() {
        let template = UriTemplate::parse("db://{table}/schema").unwrap();
        assert!(template.matches("db://users/schema").is_some());
        assert!(template.matches("db://users/data").is_none());
    }

    #[test]
    fn expansion_round_trips_a_match() {
        let template = UriTemplate::parse("repo://{owner}/{+path}").unwrap();
        let vars = template.matches("repo://acme/a/b").unwrap();
        assert_eq!(template.expand(&vars), "repo://acme/a/b");
    }

    #[test]
    fn unbalanced_braces_fail_parse() {
        assert!(UriTemplate::parse("x://{broken").is_err());
        assert!(UriTemplate::parse("x://{}").is_err());
    }
}
