//! Parsing of query templates into literal and variable parts.
//!
//! A template is the raw text of a query with `${name}` placeholders that
//! get substituted with caller-supplied arguments, and `$$` as an escape
//! for a literal `$`.

use thiserror::Error;

/// A template contained a `$` that starts neither a placeholder nor an
/// escape sequence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid placeholder in template: position {position}")]
pub struct TemplateParseError {
    /// Byte offset of the offending `$`.
    pub position: usize,
}

/// A single segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    /// Raw query text, emitted into the request verbatim.
    Literal(String),
    /// The name of a placeholder to substitute with an argument value.
    ///
    /// An empty name is syntactically valid; rejecting it is left to the
    /// query builder, which treats it like any other missing argument.
    Variable(String),
}

/// Splits template text into literal and variable parts.
///
/// Recognized forms are `$$` (escape producing a literal `$`), and
/// `${name}` with `name` matching `[A-Za-z0-9_]*`. Any other `$` fails
/// with the byte offset of that `$`. An escape does not split the
/// surrounding literal segment. Empty input yields no parts.
pub fn parse(text: &str) -> Result<Vec<TemplatePart>, TemplateParseError> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            // '$' is ASCII, so stopping at it never splits a UTF-8 sequence.
            let start = i;
            while i < bytes.len() && bytes[i] != b'$' {
                i += 1;
            }
            literal.push_str(&text[start..i]);
            continue;
        }

        match bytes.get(i + 1) {
            Some(b'$') => {
                literal.push('$');
                i += 2;
            }
            Some(b'{') => {
                let name_start = i + 2;
                let mut name_end = name_start;
                while name_end < bytes.len()
                    && (bytes[name_end].is_ascii_alphanumeric() || bytes[name_end] == b'_')
                {
                    name_end += 1;
                }
                if bytes.get(name_end) != Some(&b'}') {
                    return Err(TemplateParseError { position: i });
                }
                if !literal.is_empty() {
                    parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(TemplatePart::Variable(text[name_start..name_end].to_owned()));
                i = name_end + 1;
            }
            _ => return Err(TemplateParseError { position: i }),
        }
    }

    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }

    Ok(parts)
}
