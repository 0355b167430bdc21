//! Path template compilation and matching.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// One `/`-separated segment of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Variable(String),
    /// Matches the rest of the path; only valid as the last part
    Wildcard,
}

impl TemplatePart {
    /// Lower weights are more specific and sort first in a route table.
    pub fn weight(&self) -> u8 {
        match self {
            TemplatePart::Literal(_) => 1,
            TemplatePart::Variable(_) => 2,
            TemplatePart::Wildcard => 3,
        }
    }
}

impl fmt::Display for TemplatePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplatePart::Literal(value) => write!(f, "Literal({value})"),
            TemplatePart::Variable(name) => write!(f, "Variable({name})"),
            TemplatePart::Wildcard => f.write_str("Wildcard"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("`*` must be the last segment of `{0}`")]
    WildcardNotLast(String),
    #[error("malformed variable segment `{segment}` in `{template}`")]
    InvalidVariable { template: String, segment: String },
    #[error("variable `{name}` appears twice in `{template}`")]
    DuplicateVariable { template: String, name: String },
}

/// Captures produced by a successful [`Route::matches`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    pub variables: HashMap<String, String>,
    /// Remainder matched by a trailing wildcard, segments joined by `/`
    pub remainder: Option<String>,
}

/// A compiled path template.
///
/// Empty segments are ignored on both sides, so `/accounts/` and `/accounts`
/// compile to the same parts and `/` compiles to none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    template: String,
    parts: Vec<TemplatePart>,
}

impl Route {
    pub fn parse(template: &str) -> Result<Self, RouteError> {
        let segments: Vec<&str> = split_segments(template).collect();
        let mut parts = Vec::with_capacity(segments.len());

        for (i, segment) in segments.iter().enumerate() {
            let part = if *segment == "*" {
                if i + 1 != segments.len() {
                    return Err(RouteError::WildcardNotLast(template.to_string()));
                }
                TemplatePart::Wildcard
            } else if let Some(inner) = segment.strip_prefix('{') {
                let name = inner
                    .strip_suffix('}')
                    .filter(|n| !n.is_empty() && !n.contains(['{', '}']))
                    .ok_or_else(|| RouteError::InvalidVariable {
                        template: template.to_string(),
                        segment: segment.to_string(),
                    })?;

                if parts
                    .iter()
                    .any(|p| matches!(p, TemplatePart::Variable(n) if n == name))
                {
                    return Err(RouteError::DuplicateVariable {
                        template: template.to_string(),
                        name: name.to_string(),
                    });
                }
                TemplatePart::Variable(name.to_string())
            } else {
                TemplatePart::Literal(segment.to_string())
            };
            parts.push(part);
        }

        Ok(Self {
            template: template.to_string(),
            parts,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn parts(&self) -> &[TemplatePart] {
        &self.parts
    }

    fn ends_with_wildcard(&self) -> bool {
        matches!(self.parts.last(), Some(TemplatePart::Wildcard))
    }

    /// Orders routes so the more specific one comes first: part weights are
    /// compared left to right, and a route that runs out of parts first wins.
    pub fn specificity_cmp(&self, other: &Route) -> Ordering {
        self.parts
            .iter()
            .map(TemplatePart::weight)
            .cmp(other.parts.iter().map(TemplatePart::weight))
    }

    /// Matches pre-split path segments against this route.
    pub fn matches(&self, segments: &[&str]) -> Option<Captures> {
        let fixed = if self.ends_with_wildcard() {
            let fixed = self.parts.len() - 1;
            if segments.len() < fixed {
                return None;
            }
            fixed
        } else {
            if segments.len() != self.parts.len() {
                return None;
            }
            self.parts.len()
        };

        let mut captures = Captures::default();

        for (part, segment) in self.parts[..fixed].iter().zip(segments) {
            match part {
                TemplatePart::Literal(value) if value == segment => {}
                TemplatePart::Literal(_) => return None,
                TemplatePart::Variable(name) => {
                    captures.variables.insert(name.clone(), segment.to_string());
                }
                TemplatePart::Wildcard => break,
            }
        }

        if fixed < self.parts.len() {
            captures.remainder = Some(segments[fixed..].join("/"));
        }

        Some(captures)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Non-empty `/`-separated segments of a path or template.
pub fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_each_part_kind() {
        let route = Route::parse("/files/{id}/*").unwrap();
        assert_eq!(
            route.parts(),
            &[
                TemplatePart::Literal("files".into()),
                TemplatePart::Variable("id".into()),
                TemplatePart::Wildcard,
            ]
        );
    }

    #[test]
    fn literal_sorts_before_variable() {
        let literal = Route::parse("/accounts/222").unwrap();
        let variable = Route::parse("/accounts/{id}").unwrap();
        assert_eq!(literal.specificity_cmp(&variable), Ordering::Less);
    }
}
