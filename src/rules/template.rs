//! Format Template Engine
//!
//! Applies a committed format rule's template to one value. A template is
//! plain text plus placeholders: `{}` or `{0}` insert the value, `{{` and
//! `}}` escape literal braces, and a placeholder may carry a spec after a
//! colon with fill, alignment (`<`, `>`, `^`), width and `.precision`.
//!
//! Every placeholder formats the same single value, so `{0}` is the only
//! accepted explicit index. Malformed templates are rejected instead of
//! being rendered partially.

use anyhow::{bail, Result};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    fill: char,
    align: Option<Align>,
    width: Option<usize>,
    precision: Option<usize>,
}

/// Renders `item` through `template`.
///
/// Fails on an unterminated `{`, a lone `}`, an explicit index other than
/// `0`, or a spec the engine does not understand.
pub fn apply_template<I: Display + ?Sized>(template: &str, item: &I) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut field = String::new();
                let mut closed = false;
                for fc in chars.by_ref() {
                    if fc == '}' {
                        closed = true;
                        break;
                    }
                    field.push(fc);
                }
                if !closed {
                    bail!("unterminated placeholder in template {:?}", template);
                }
                out.push_str(&expand_field(&field, item)?);
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    bail!("unmatched '}}' in template {:?}", template);
                }
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

fn expand_field<I: Display + ?Sized>(field: &str, item: &I) -> Result<String> {
    let (arg, spec) = match field.find(':') {
        Some(i) => (&field[..i], &field[i + 1..]),
        None => (field, ""),
    };

    match arg {
        "" | "0" => {}
        other => bail!(
            "unknown placeholder argument {:?}; a rule formats one value",
            other
        ),
    }

    let spec = parse_spec(spec)?;
    Ok(render_value(item, &spec))
}

fn parse_spec(spec: &str) -> Result<FieldSpec> {
    let mut parsed = FieldSpec {
        fill: ' ',
        align: None,
        width: None,
        precision: None,
    };

    let chars: Vec<char> = spec.chars().collect();
    let mut pos = 0;

    let as_align = |c: char| match c {
        '<' => Some(Align::Left),
        '>' => Some(Align::Right),
        '^' => Some(Align::Center),
        _ => None,
    };

    // Fill is only meaningful when followed by an alignment marker.
    if chars.len() >= 2 {
        if let Some(align) = as_align(chars[1]) {
            parsed.fill = chars[0];
            parsed.align = Some(align);
            pos = 2;
        }
    }
    if pos == 0 && !chars.is_empty() {
        if let Some(align) = as_align(chars[0]) {
            parsed.align = Some(align);
            pos = 1;
        }
    }

    let mut width = String::new();
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        width.push(chars[pos]);
        pos += 1;
    }
    if !width.is_empty() {
        parsed.width = Some(width.parse()?);
    }

    if pos < chars.len() && chars[pos] == '.' {
        pos += 1;
        let mut precision = String::new();
        while pos < chars.len() && chars[pos].is_ascii_digit() {
            precision.push(chars[pos]);
            pos += 1;
        }
        if precision.is_empty() {
            bail!("precision marker '.' without digits in spec {:?}", spec);
        }
        parsed.precision = Some(precision.parse()?);
    }

    if pos != chars.len() {
        bail!("unsupported format spec {:?}", spec);
    }

    Ok(parsed)
}

fn render_value<I: Display + ?Sized>(item: &I, spec: &FieldSpec) -> String {
    let mut rendered = item.to_string();

    // Precision fixes fractional digits for decimal values and truncates
    // anything else to at most that many characters.
    if let Some(precision) = spec.precision {
        let is_decimal = rendered.contains('.') && rendered.parse::<f64>().is_ok();
        if is_decimal {
            let value: f64 = rendered.parse().unwrap_or(0.0);
            rendered = format!("{:.*}", precision, value);
        } else if let Some((cut, _)) = rendered.char_indices().nth(precision) {
            rendered.truncate(cut);
        }
    }

    let width = spec.width.unwrap_or(0);
    let len = rendered.chars().count();
    if len >= width {
        return rendered;
    }

    let pad = width - len;
    let filler: String = std::iter::repeat(spec.fill).take(pad).collect();
    match spec.align.unwrap_or(Align::Left) {
        Align::Left => format!("{}{}", rendered, filler),
        Align::Right => format!("{}{}", filler, rendered),
        Align::Center => {
            let left = pad / 2;
            let left_fill: String = std::iter::repeat(spec.fill).take(left).collect();
            let right_fill: String = std::iter::repeat(spec.fill).take(pad - left).collect();
            format!("{}{}{}", left_fill, rendered, right_fill)
        }
    }
}
