//! Placeholder substitution over the raw configuration text.
//!
//! `{NAME}` is replaced with the rendered parameter value and `{{`/`}}`
//! produce literal braces. A format spec starting with `[` renders the value
//! as a list: `{HOSTS:[]}` yields a flow sequence split on commas,
//! `{HOSTS:[;]}` splits on `;`, and a `-` anywhere in the spec yields a block
//! sequence instead (`.N` sets the indent, `^` also prefixes the first item).

use std::collections::BTreeMap;

use crate::error::ConfigurationError;

const DEFAULT_LIST_SPLITTER: char = ',';
const DEFAULT_LIST_INDENT: usize = 2;

/// Rendered parameter values keyed by placeholder name.
pub type Parameters = BTreeMap<String, String>;

/// Renders `value` as a YAML scalar.
///
/// Numbers and booleans are emitted verbatim; anything else becomes a
/// single-quoted string.
#[must_use]
pub fn render_scalar(value: &str) -> String {
    if looks_untyped(value) {
        value.to_owned()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

fn looks_untyped(value: &str) -> bool {
    value.trim().parse::<f64>().is_ok()
        || matches!(value.to_ascii_lowercase().as_str(), "true" | "false")
}

/// Substitutes every placeholder in `template` from `parameters`.
pub fn substitute(template: &str, parameters: &Parameters) -> Result<String, ConfigurationError> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(current) = chars.next() {
        match current {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                output.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                output.push('}');
            }
            '}' => {
                return Err(template_error("single '}' encountered"));
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    field.push(next);
                }
                if !closed {
                    return Err(template_error("unterminated placeholder"));
                }
                output.push_str(&render_field(&field, parameters)?);
            }
            other => output.push(other),
        }
    }

    Ok(output)
}

fn render_field(field: &str, parameters: &Parameters) -> Result<String, ConfigurationError> {
    let (name, spec) = match field.split_once(':') {
        Some((name, spec)) => (name.trim(), Some(spec)),
        None => (field.trim(), None),
    };
    if name.is_empty() {
        return Err(template_error("empty placeholder"));
    }
    let value = parameters
        .get(name)
        .ok_or_else(|| ConfigurationError::MissingParameter {
            name: name.to_owned(),
        })?;

    match spec {
        None | Some("") => Ok(value.clone()),
        Some(spec) if spec.starts_with('[') => Ok(render_list(value, spec)),
        Some(spec) => Err(template_error(&format!(
            "unsupported format spec '{spec}' for '{name}'"
        ))),
    }
}

fn render_list(value: &str, spec: &str) -> String {
    let mut spec_chars = spec.chars().skip(1);
    let splitter = match (spec_chars.next(), spec_chars.next()) {
        (Some(splitter), Some(']')) => splitter,
        _ => DEFAULT_LIST_SPLITTER,
    };

    let unquoted = value
        .trim_end_matches('\'')
        .trim_start_matches('\'')
        .trim_end_matches('"')
        .trim_start_matches('"');
    let items: Vec<&str> = unquoted.split(splitter).collect();

    if !spec.contains('-') {
        return format!("[\"{}\"]", items.join("\", \""));
    }

    let indent = block_indent(spec);
    let bullet = format!("\n{}- ", " ".repeat(indent));
    let mut output = String::new();
    for (position, item) in items.iter().enumerate() {
        if position > 0 || spec.contains('^') {
            output.push_str(&bullet);
        }
        output.push_str(item);
    }
    output
}

fn block_indent(spec: &str) -> usize {
    spec.split_once('.')
        .map(|(_, rest)| {
            rest.chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
        })
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(DEFAULT_LIST_INDENT)
}

fn template_error(message: &str) -> ConfigurationError {
    ConfigurationError::Template {
        message: message.to_owned(),
    }
}
