//! Minimal text templates for URLs, header values and bodies.
//!
//! Supported actions:
//! - `{{ .RequestID }}` - the 1-based id of the request being generated
//! - `{{ .Data.field }}` - a field of the current data record
//! - `{{ index .Data "field name" }}` - same, for field names with spaces or dots
//! - `{{/* comment */}}` - ignored
//!
//! Templates are parsed once. Rendering cannot fail: a field missing from the
//! record renders as an empty string.

use regex::Regex;

use crate::data_source::DataRecord;
use crate::template::TemplateError;

lazy_static::lazy_static! {
    static ref REQUEST_ID_ACTION: Regex = Regex::new(r"^\.?RequestID$").unwrap();
    static ref DATA_FIELD_ACTION: Regex = Regex::new(r"^\.?Data\.(\S+)$").unwrap();
    static ref INDEX_ACTION: Regex =
        Regex::new(r#"^index\s+\.?Data\s+"((?:[^"\\]|\\.)*)"$"#).unwrap();
    static ref COMMENT_ACTION: Regex = Regex::new(r"^/\*(?s:.*)\*/$").unwrap();
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Values visible to template actions.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub request_id: u64,
    pub data: &'a DataRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    RequestId,
    DataField(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTemplate {
    segments: Vec<Segment>,
}

impl TextTemplate {
    /// Parse `source`. `name` identifies the template in error messages.
    ///
    /// # Errors
    /// Unterminated actions, empty actions and unknown expressions.
    pub fn parse(name: &str, source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }

            let after_open = &rest[start + OPEN.len()..];
            let end = after_open
                .find(CLOSE)
                .ok_or_else(|| TemplateError::Unterminated {
                    template: name.to_string(),
                    offset: offset + start,
                })?;

            let action = after_open[..end].trim();
            if let Some(segment) = parse_action(name, action)? {
                segments.push(segment);
            }

            let consumed = start + OPEN.len() + end + CLOSE.len();
            offset += consumed;
            rest = &rest[consumed..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// True when the output depends on the request id.
    pub fn uses_request_id(&self) -> bool {
        self.segments.contains(&Segment::RequestId)
    }

    /// True when the output depends on the data record.
    pub fn uses_data(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::DataField(_)))
    }

    pub fn render(&self, ctx: &TemplateContext<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::RequestId => out.push_str(&ctx.request_id.to_string()),
                Segment::DataField(field) => out.push_str(ctx.data.get(field).unwrap_or("")),
            }
        }
        out
    }
}

fn parse_action(name: &str, action: &str) -> Result<Option<Segment>, TemplateError> {
    if action.is_empty() {
        return Err(TemplateError::EmptyAction {
            template: name.to_string(),
        });
    }

    if COMMENT_ACTION.is_match(action) {
        return Ok(None);
    }

    if REQUEST_ID_ACTION.is_match(action) {
        return Ok(Some(Segment::RequestId));
    }

    if let Some(caps) = DATA_FIELD_ACTION.captures(action) {
        return Ok(Some(Segment::DataField(caps[1].to_string())));
    }

    if let Some(caps) = INDEX_ACTION.captures(action) {
        let field = caps[1].replace("\\\"", "\"").replace("\\\\", "\\");
        return Ok(Some(Segment::DataField(field)));
    }

    Err(TemplateError::UnknownExpression {
        template: name.to_string(),
        expression: action.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DataRecord {
        DataRecord::from_pairs([("A", "a1"), ("B", "b1"), ("full name", "Ann Lee")])
    }

    fn render(source: &str, request_id: u64) -> String {
        let data = record();
        TextTemplate::parse("test", source)
            .unwrap()
            .render(&TemplateContext {
                request_id,
                data: &data,
            })
    }

    #[test]
    fn test_literal_only() {
        let tmpl = TextTemplate::parse("endpoint", "http://localhost/items").unwrap();
        assert!(!tmpl.uses_request_id());
        assert!(!tmpl.uses_data());
        assert_eq!(render("http://localhost/items", 1), "http://localhost/items");
    }

    #[test]
    fn test_request_id() {
        assert_eq!(render("http://h/{{.RequestID}}", 7), "http://h/7");
        assert_eq!(render("http://h/{{ RequestID }}", 8), "http://h/8");
    }

    #[test]
    fn test_data_field() {
        assert_eq!(
            render("{\"id\": {{ .RequestID }}, \"value\": \"{{.Data.A}}\"}", 1),
            "{\"id\": 1, \"value\": \"a1\"}"
        );
    }

    #[test]
    fn test_index_action() {
        assert_eq!(render("{{ index .Data \"full name\" }}", 1), "Ann Lee");
    }

    #[test]
    fn test_missing_field_renders_empty() {
        assert_eq!(render("[{{ .Data.missing }}]", 1), "[]");
    }

    #[test]
    fn test_empty_record() {
        let empty = DataRecord::empty();
        let tmpl = TextTemplate::parse("body", "{{.Data.A}}-{{.RequestID}}").unwrap();
        let out = tmpl.render(&TemplateContext {
            request_id: 3,
            data: &empty,
        });
        assert_eq!(out, "-3");
    }

    #[test]
    fn test_comment_is_dropped() {
        assert_eq!(render("a{{/* note */}}b", 1), "ab");
    }

    #[test]
    fn test_single_braces_are_literal() {
        assert_eq!(render("{\"a\": {\"b\": 1}}", 1), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn test_dependencies() {
        let tmpl = TextTemplate::parse("t", "{{.RequestID}}").unwrap();
        assert!(tmpl.uses_request_id());
        assert!(!tmpl.uses_data());

        let tmpl = TextTemplate::parse("t", "{{.Data.A}}").unwrap();
        assert!(!tmpl.uses_request_id());
        assert!(tmpl.uses_data());
    }

    #[test]
    fn test_unterminated_action() {
        let err = TextTemplate::parse("endpoint", "http://h/{{.RequestID").unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Unterminated { offset: 9, .. }
        ));
    }

    #[test]
    fn test_empty_action() {
        let err = TextTemplate::parse("body", "{{ }}").unwrap_err();
        assert!(matches!(err, TemplateError::EmptyAction { .. }));
    }

    #[test]
    fn test_unknown_expression() {
        let err = TextTemplate::parse("body", "{{ .Nope }}").unwrap_err();
        match err {
            TemplateError::UnknownExpression {
                template,
                expression,
            } => {
                assert_eq!(template, "body");
                assert_eq!(expression, ".Nope");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
