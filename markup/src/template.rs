use std::fmt::Display;

use crate::escape::{EscapeMode, escape};

/// Fill a markup pattern with arguments.
///
/// Placeholders:
/// - `@`: next argument, attribute-escaped
/// - `$`: next argument, body-escaped
/// - `%`: next argument verbatim (already serialized markup)
/// - `~`: `id="<id>"` when `id` is given, nothing otherwise
///
/// A decimal index right after `@`, `$` or `%` picks that argument instead
/// of the next one and does not advance the sequence. Missing arguments
/// render as empty strings. Only the pattern is scanned; argument text is
/// never interpreted.
pub fn render(pattern: &str, args: &[&dyn Display], id: Option<usize>) -> String {
    let mut out = String::with_capacity(pattern.len() + 16 * args.len());
    let mut next = 0;
    let mut chars = pattern.chars().peekable();

    while let Some(ch) = chars.next() {
        let mode = match ch {
            '@' => Some(EscapeMode::Attribute),
            '$' => Some(EscapeMode::Body),
            '%' => None,
            '~' => {
                if let Some(id) = id {
                    out.push_str(&format!("id=\"{}\"", id));
                }
                continue;
            }
            _ => {
                out.push(ch);
                continue;
            }
        };

        let mut index: Option<usize> = None;
        while let Some(&digit) = chars.peek() {
            let Some(value) = digit.to_digit(10) else {
                break;
            };
            index = Some(index.unwrap_or(0) * 10 + value as usize);
            chars.next();
        }
        let index = index.unwrap_or_else(|| {
            next += 1;
            next - 1
        });

        let Some(arg) = args.get(index) else {
            continue;
        };
        let text = arg.to_string();
        match mode {
            Some(mode) => out.push_str(&escape(&text, mode)),
            None => out.push_str(&text),
        }
    }

    out
}
