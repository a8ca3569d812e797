//! Absolute path queries over a parsed [`Document`].
//!
//! Grammar: `/step/step/.../step[/@attribute]`, where a step is a local
//! element name or `*`. The first step must match the root element.

use super::{Document, Element};
use crate::error::{JanusError, Result};
use std::fmt;

/// A compiled path query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    steps: Vec<String>,
    attribute: Option<String>,
}

/// One element selected by a query, plus the attribute value when the query
/// ends in `@attribute`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryMatch<'a> {
    pub element: &'a Element,
    pub value: Option<&'a str>,
}

impl PathQuery {
    pub fn compile(expr: &str) -> Result<Self> {
        let invalid = |why: &str| JanusError::Parse(format!("invalid path query '{expr}': {why}"));

        let rest = expr
            .strip_prefix('/')
            .ok_or_else(|| invalid("must be absolute"))?;

        let mut steps = Vec::new();
        let mut attribute = None;
        let segments: Vec<&str> = rest.split('/').collect();
        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(invalid("empty step"));
            }
            if let Some(attr) = segment.strip_prefix('@') {
                if i != segments.len() - 1 {
                    return Err(invalid("attribute step must be last"));
                }
                if attr.is_empty() {
                    return Err(invalid("empty attribute name"));
                }
                attribute = Some(attr.to_string());
            } else {
                steps.push(segment.to_string());
            }
        }
        if steps.is_empty() {
            return Err(invalid("no element steps"));
        }

        Ok(Self { steps, attribute })
    }

    /// Returns matches in document order
    pub fn evaluate<'a>(&self, doc: &'a Document) -> Vec<QueryMatch<'a>> {
        let (first, rest) = match self.steps.split_first() {
            Some(split) => split,
            None => return Vec::new(),
        };
        if first != "*" && *first != doc.root.name {
            return Vec::new();
        }

        let mut current: Vec<&'a Element> = vec![&doc.root];
        for step in rest {
            current = current
                .into_iter()
                .flat_map(|el| {
                    el.children
                        .iter()
                        .filter(move |child| step == "*" || child.name == *step)
                })
                .collect();
        }

        match self.attribute {
            Some(ref attr) => current
                .into_iter()
                .filter_map(|element| {
                    element.attribute(attr).map(|value| QueryMatch {
                        element,
                        value: Some(value),
                    })
                })
                .collect(),
            None => current
                .into_iter()
                .map(|element| QueryMatch {
                    element,
                    value: None,
                })
                .collect(),
        }
    }
}

impl fmt::Display for PathQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        if let Some(ref attr) = self.attribute {
            write!(f, "/@{attr}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::SafeXmlParser;

    const SILVERLIGHT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<access-policy>
  <cross-domain-access>
    <policy>
      <allow-from http-request-headers="*">
        <domain uri="https://partner.example.com"/>
        <domain uri="*"/>
      </allow-from>
      <grant-to>
        <resource path="/" include-subpaths="true"/>
      </grant-to>
    </policy>
  </cross-domain-access>
</access-policy>"#;

    #[test]
    fn compile_rejects_bad_expressions() {
        for expr in ["a/b", "/", "//a", "/a/@b/c", "/@b", "/a/@"] {
            assert!(PathQuery::compile(expr).is_err(), "{expr}");
        }
    }

    #[test]
    fn display_round_trips_expression() {
        let expr = "/access-policy/cross-domain-access/policy/allow-from/domain/@uri";
        assert_eq!(PathQuery::compile(expr).unwrap().to_string(), expr);
    }

    #[test]
    fn selects_attribute_values_in_document_order() {
        let doc = SafeXmlParser::new().unwrap().parse(SILVERLIGHT).unwrap();
        let query =
            PathQuery::compile("/access-policy/cross-domain-access/policy/allow-from/domain/@uri")
                .unwrap();

        let values: Vec<&str> = doc.select(&query).iter().filter_map(|m| m.value).collect();
        assert_eq!(values, vec!["https://partner.example.com", "*"]);
    }

    #[test]
    fn elements_without_the_attribute_are_skipped() {
        let doc = SafeXmlParser::new()
            .unwrap()
            .parse(r#"<r><g a="1"/><g/><g a="2"/></r>"#)
            .unwrap();
        let query = PathQuery::compile("/r/g/@a").unwrap();
        assert_eq!(doc.select(&query).len(), 2);

        let query = PathQuery::compile("/r/g").unwrap();
        assert_eq!(doc.select(&query).len(), 3);
    }

    #[test]
    fn wrong_root_matches_nothing() {
        let doc = SafeXmlParser::new().unwrap().parse(SILVERLIGHT).unwrap();
        let query = PathQuery::compile("/cross-domain-policy/allow-access-from/@domain").unwrap();
        assert!(doc.select(&query).is_empty());
    }

    #[test]
    fn wildcard_steps() {
        let doc = SafeXmlParser::new().unwrap().parse(SILVERLIGHT).unwrap();
        let query = PathQuery::compile("/*/*/policy/*/domain/@uri").unwrap();
        assert_eq!(doc.select(&query).len(), 2);
    }
}
