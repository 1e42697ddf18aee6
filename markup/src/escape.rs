/// Where an escaped string is going to be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeMode {
    /// Inside a quoted attribute value: quotes are escaped too.
    Attribute,
    /// Element text: only `<`, `>` and `&`.
    Body,
}

pub fn escape(text: &str, mode: EscapeMode) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' if mode == EscapeMode::Attribute => out.push_str("&quot;"),
            '\'' if mode == EscapeMode::Attribute => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape a value that may be absent; absence escapes to the empty string.
pub fn escape_optional(text: Option<&str>, mode: EscapeMode) -> String {
    text.map(|t| escape(t, mode)).unwrap_or_default()
}

/// Replace the five named entities. Anything else starting with `&` is kept
/// verbatim.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = entity_end(rest).and_then(|semi| {
            let ch = match &rest[1..semi] {
                "lt" => '<',
                "gt" => '>',
                "amp" => '&',
                "quot" => '"',
                "apos" => '\'',
                _ => return None,
            };
            Some((ch, semi + 1))
        });
        match decoded {
            Some((ch, len)) => {
                out.push(ch);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Offset of the `;` closing an entity that starts at `text[0]`, looking no
/// further than the longest named entity.
fn entity_end(text: &str) -> Option<usize> {
    text.char_indices()
        .take(6)
        .find(|(_, c)| *c == ';')
        .map(|(offset, _)| offset)
}
