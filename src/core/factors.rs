//! # Factor Expander
//!
//! Turns a factor template such as `{lint,type}-py{310,311}` into the concrete
//! environment names it denotes. The template is tokenized into literal
//! segments and factor groups, then the cartesian product of the groups is
//! substituted back in declaration order (the first group varies slowest).

use crate::core::config_loader::DeclarationError;
use std::str::CharIndices;

/// One piece of a tokenized template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Text copied into every name.
    Literal(&'a str),
    /// The alternatives of one `{...}` group.
    Group(Vec<&'a str>),
}

/// A concrete environment name produced by expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedName {
    /// The concrete environment name.
    pub name: String,
    /// The value chosen from each group, in template order.
    pub factors: Vec<String>,
}

/// Returns `true` if `template` contains factor-group syntax (balanced or not).
pub fn is_template(template: &str) -> bool {
    template.contains(['{', '}'])
}

/// Splits a template into literal and group segments.
///
/// # Errors
/// Returns `DeclarationError::Syntax` for an unmatched `{` or `}`, a nested
/// `{`, or an empty value inside a non-empty group (`{a,,b}`).
pub fn tokenize(template: &str) -> Result<Vec<Segment<'_>>, DeclarationError> {
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut chars = template.char_indices();

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '{' => {
                push_literal(&mut segments, template, literal_start, offset);
                let (values, resume_at) = parse_group(template, offset, &mut chars)?;
                segments.push(Segment::Group(values));
                literal_start = resume_at;
            }
            '}' => return Err(syntax_error(template, offset, "unmatched '}'")),
            _ => {}
        }
    }
    push_literal(&mut segments, template, literal_start, template.len());
    Ok(segments)
}

/// Expands a template into every concrete name it denotes.
///
/// A template without groups expands to itself. A group with no values
/// (`{}`) yields zero names; this is logged, not treated as an error.
pub fn expand(template: &str) -> Result<Vec<ExpandedName>, DeclarationError> {
    let segments = tokenize(template)?;

    let mut partial = vec![ExpandedName {
        name: String::with_capacity(template.len()),
        factors: Vec::new(),
    }];

    for segment in &segments {
        match segment {
            Segment::Literal(text) => {
                for candidate in &mut partial {
                    candidate.name.push_str(text);
                }
            }
            Segment::Group(values) => {
                partial = partial
                    .into_iter()
                    .flat_map(|candidate| {
                        values.iter().map(move |value| {
                            let mut factors = candidate.factors.clone();
                            factors.push((*value).to_string());
                            ExpandedName {
                                name: format!("{}{}", candidate.name, value),
                                factors,
                            }
                        })
                    })
                    .collect();
            }
        }
    }

    if partial.is_empty() {
        log::warn!(
            "Template '{}' has an empty factor group and expands to no environments.",
            template
        );
    }
    log::trace!("Expanded '{}' into {} name(s).", template, partial.len());
    Ok(partial)
}

// --- Tokenizer internals ---

fn push_literal<'a>(segments: &mut Vec<Segment<'a>>, template: &'a str, start: usize, end: usize) {
    if let Some(text) = template.get(start..end)
        && !text.is_empty()
    {
        segments.push(Segment::Literal(text));
    }
}

/// Consumes a group body up to its closing brace.
/// Returns the group's values and the byte offset right after the `}`.
fn parse_group<'a>(
    template: &'a str,
    open: usize,
    chars: &mut CharIndices<'a>,
) -> Result<(Vec<&'a str>, usize), DeclarationError> {
    let body_start = open + 1;
    for (offset, ch) in chars.by_ref() {
        match ch {
            '{' => return Err(syntax_error(template, offset, "nested '{'")),
            '}' => {
                let body = template.get(body_start..offset).unwrap_or_default();
                let values = split_values(template, open, body)?;
                return Ok((values, offset + 1));
            }
            _ => {}
        }
    }
    Err(syntax_error(template, open, "unmatched '{'"))
}

fn split_values<'a>(
    template: &str,
    open: usize,
    body: &'a str,
) -> Result<Vec<&'a str>, DeclarationError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let values: Vec<&str> = body.split(',').map(str::trim).collect();
    if values.iter().any(|value| value.is_empty()) {
        return Err(syntax_error(template, open, "empty factor value"));
    }
    Ok(values)
}

fn syntax_error(template: &str, offset: usize, reason: &str) -> DeclarationError {
    DeclarationError::Syntax {
        template: template.to_string(),
        offset,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn names(template: &str) -> Vec<String> {
        expand(template).unwrap().into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn test_template_without_groups_expands_to_itself() {
        let expanded = expand("lint").unwrap();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].name, "lint");
        assert!(expanded[0].factors.is_empty());
    }

    #[test]
    fn test_single_group() {
        assert_eq!(names("test-py{310,311}"), vec!["test-py310", "test-py311"]);
    }

    #[test]
    fn test_product_size_and_positions() {
        let expanded = expand("{lint,type,test}-py{310,311}-{a,b}").unwrap();
        assert_eq!(expanded.len(), 3 * 2 * 2);

        let unique: HashSet<_> = expanded.iter().map(|e| e.name.clone()).collect();
        assert_eq!(unique.len(), expanded.len());

        // First group varies slowest.
        assert_eq!(expanded[0].name, "lint-py310-a");
        assert_eq!(expanded[1].name, "lint-py310-b");
        assert_eq!(expanded[11].name, "test-py311-b");

        for entry in &expanded {
            let parts: Vec<&str> = entry.name.split('-').collect();
            assert_eq!(entry.factors[0], parts[0]);
            assert_eq!(format!("py{}", entry.factors[1]), parts[1]);
            assert_eq!(entry.factors[2], parts[2]);
        }
    }

    #[test]
    fn test_values_are_trimmed() {
        assert_eq!(names("py{ 310 , 311 }"), vec!["py310", "py311"]);
    }

    #[test]
    fn test_empty_group_yields_zero_expansions() {
        assert!(expand("test-py{}").unwrap().is_empty());
        assert!(expand("test-{ }-x").unwrap().is_empty());
    }

    #[test]
    fn test_unmatched_open_brace() {
        let err = expand("test-py{310,311").unwrap_err();
        match err {
            DeclarationError::Syntax { template, offset, .. } => {
                assert_eq!(template, "test-py{310,311");
                assert_eq!(offset, 7);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unmatched_close_brace() {
        let err = expand("test-py310}").unwrap_err();
        assert!(err.to_string().contains("test-py310}"));
        assert!(err.to_string().contains("unmatched '}'"));
    }

    #[test]
    fn test_nested_brace_is_rejected() {
        assert!(matches!(
            expand("py{3{10}}"),
            Err(DeclarationError::Syntax { .. })
        ));
    }

    #[test]
    fn test_empty_value_in_list_is_rejected() {
        assert!(matches!(
            expand("py{310,,311}"),
            Err(DeclarationError::Syntax { .. })
        ));
    }

    #[test]
    fn test_tokenize_segments() {
        let segments = tokenize("a{x,y}b").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal("a"),
                Segment::Group(vec!["x", "y"]),
                Segment::Literal("b"),
            ]
        );
    }
}
