//! Template Dialect Conversion
//!
//! Rewrites a format template between placeholder dialects so one committed
//! rule can feed codebases with different formatting conventions. The
//! template is parsed into a segment list (literal text and placeholder
//! fields with width, precision, alignment and a type hint) and re-emitted
//! in the target dialect; what the target cannot express is dropped.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Supported placeholder dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `{}` / `{:>8.2f}` style, implicit argument order.
    Braced,
    /// `{0}` / `{1:.2f}` style, explicit argument indices.
    Indexed,
    /// `%s` / `%-8.2f` style.
    Printf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeHint {
    Default,
    Integer,
    Float,
    Str,
    Hex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldAlign {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone)]
struct Field {
    index: Option<usize>,
    fill: Option<char>,
    align: Option<FieldAlign>,
    width: Option<usize>,
    precision: Option<usize>,
    hint: TypeHint,
}

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Field(Field),
}

/// Converts `template` from one dialect to another.
pub fn convert(template: &str, from: Dialect, to: Dialect) -> Result<String> {
    if from == to {
        return Ok(template.to_string());
    }
    let segments = parse(template, from)?;
    Ok(emit(&segments, to))
}

fn parse(template: &str, dialect: Dialect) -> Result<Vec<Segment>> {
    match dialect {
        Dialect::Braced | Dialect::Indexed => parse_braced(template),
        Dialect::Printf => parse_printf(template),
    }
}

fn parse_braced(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    text.push('{');
                    continue;
                }
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                let mut body = String::new();
                let mut closed = false;
                for fc in chars.by_ref() {
                    if fc == '}' {
                        closed = true;
                        break;
                    }
                    body.push(fc);
                }
                if !closed {
                    bail!("unterminated placeholder in {:?}", template);
                }
                segments.push(Segment::Field(parse_braced_field(&body)?));
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    text.push('}');
                } else {
                    bail!("unmatched '}}' in {:?}", template);
                }
            }
            other => text.push(other),
        }
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

fn parse_braced_field(body: &str) -> Result<Field> {
    let (arg, spec) = match body.find(':') {
        Some(i) => (&body[..i], &body[i + 1..]),
        None => (body, ""),
    };

    let index = if arg.is_empty() {
        None
    } else {
        match arg.parse::<usize>() {
            Ok(i) => Some(i),
            Err(_) => bail!("non-numeric placeholder argument {:?}", arg),
        }
    };

    let mut field = Field {
        index,
        fill: None,
        align: None,
        width: None,
        precision: None,
        hint: TypeHint::Default,
    };

    let chars: Vec<char> = spec.chars().collect();
    let mut pos = 0;

    let as_align = |c: char| match c {
        '<' => Some(FieldAlign::Left),
        '>' => Some(FieldAlign::Right),
        '^' => Some(FieldAlign::Center),
        _ => None,
    };

    if chars.len() >= 2 {
        if let Some(align) = as_align(chars[1]) {
            field.fill = Some(chars[0]);
            field.align = Some(align);
            pos = 2;
        }
    }
    if pos == 0 && !chars.is_empty() {
        if let Some(align) = as_align(chars[0]) {
            field.align = Some(align);
            pos = 1;
        }
    }

    let mut width = String::new();
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        width.push(chars[pos]);
        pos += 1;
    }
    if !width.is_empty() {
        field.width = Some(width.parse()?);
    }

    if pos < chars.len() && chars[pos] == '.' {
        pos += 1;
        let mut precision = String::new();
        while pos < chars.len() && chars[pos].is_ascii_digit() {
            precision.push(chars[pos]);
            pos += 1;
        }
        if precision.is_empty() {
            bail!("precision marker '.' without digits in {:?}", body);
        }
        field.precision = Some(precision.parse()?);
    }

    if pos < chars.len() {
        field.hint = type_hint(chars[pos])
            .ok_or_else(|| anyhow::anyhow!("unsupported type character {:?}", chars[pos]))?;
        pos += 1;
    }

    if pos != chars.len() {
        bail!("unsupported format spec {:?}", body);
    }
    Ok(field)
}

fn parse_printf(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            text.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            text.push('%');
            continue;
        }
        if !text.is_empty() {
            segments.push(Segment::Text(std::mem::take(&mut text)));
        }

        let mut field = Field {
            index: None,
            fill: None,
            align: None,
            width: None,
            precision: None,
            hint: TypeHint::Default,
        };

        if chars.peek() == Some(&'-') {
            chars.next();
            field.align = Some(FieldAlign::Left);
        }

        let mut width = String::new();
        while let Some(&digit) = chars.peek().filter(|c| c.is_ascii_digit()) {
            width.push(digit);
            chars.next();
        }
        if !width.is_empty() {
            field.width = Some(width.parse()?);
        }

        if chars.peek() == Some(&'.') {
            chars.next();
            let mut precision = String::new();
            while let Some(&digit) = chars.peek().filter(|c| c.is_ascii_digit()) {
                precision.push(digit);
                chars.next();
            }
            if precision.is_empty() {
                bail!("precision marker '.' without digits in {:?}", template);
            }
            field.precision = Some(precision.parse()?);
        }

        match chars.next() {
            Some(conv) => {
                field.hint = type_hint(conv).ok_or_else(|| {
                    anyhow::anyhow!("unsupported printf conversion {:?}", conv)
                })?;
            }
            None => bail!("dangling '%' in {:?}", template),
        }

        segments.push(Segment::Field(field));
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

fn type_hint(c: char) -> Option<TypeHint> {
    match c {
        'd' | 'i' | 'u' | 'o' => Some(TypeHint::Integer),
        'f' | 'e' | 'g' => Some(TypeHint::Float),
        's' | 'c' => Some(TypeHint::Str),
        'x' | 'X' | 'p' => Some(TypeHint::Hex),
        _ => None,
    }
}

fn emit(segments: &[Segment], dialect: Dialect) -> String {
    let mut out = String::new();
    let mut next_index = 0usize;

    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(&escape_text(text, dialect)),
            Segment::Field(field) => {
                match dialect {
                    Dialect::Braced => out.push_str(&emit_braced(field, None)),
                    Dialect::Indexed => {
                        let index = field.index.unwrap_or(next_index);
                        out.push_str(&emit_braced(field, Some(index)));
                    }
                    Dialect::Printf => out.push_str(&emit_printf(field)),
                }
                next_index += 1;
            }
        }
    }

    out
}

fn escape_text(text: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Braced | Dialect::Indexed => {
            text.replace('{', "{{").replace('}', "}}")
        }
        Dialect::Printf => text.replace('%', "%%"),
    }
}

fn emit_braced(field: &Field, index: Option<usize>) -> String {
    let mut spec = String::new();

    if let Some(align) = field.align {
        if let Some(fill) = field.fill {
            spec.push(fill);
        }
        spec.push(match align {
            FieldAlign::Left => '<',
            FieldAlign::Right => '>',
            FieldAlign::Center => '^',
        });
    }
    if let Some(width) = field.width {
        spec.push_str(&width.to_string());
    }
    if let Some(precision) = field.precision {
        spec.push('.');
        spec.push_str(&precision.to_string());
    }
    match field.hint {
        TypeHint::Default | TypeHint::Str => {}
        TypeHint::Integer => spec.push('d'),
        TypeHint::Float => spec.push('f'),
        TypeHint::Hex => spec.push('x'),
    }

    let mut out = String::from("{");
    if let Some(i) = index {
        out.push_str(&i.to_string());
    }
    if !spec.is_empty() {
        out.push(':');
        out.push_str(&spec);
    }
    out.push('}');
    out
}

fn emit_printf(field: &Field) -> String {
    let mut out = String::from("%");
    // Printf can only express left alignment; center falls back to default.
    if field.align == Some(FieldAlign::Left) {
        out.push('-');
    }
    if let Some(width) = field.width {
        out.push_str(&width.to_string());
    }
    if let Some(precision) = field.precision {
        out.push('.');
        out.push_str(&precision.to_string());
    }
    out.push(match field.hint {
        TypeHint::Integer => 'd',
        TypeHint::Float => 'f',
        TypeHint::Hex => 'x',
        TypeHint::Str | TypeHint::Default => 's',
    });
    out
}
