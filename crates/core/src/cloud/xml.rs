//! Minimal extraction of text elements from AWS XML responses.
//!
//! AWS query and REST APIs answer with flat, well-known XML documents. We
//! only ever need the text content of leaf elements, so a tag pattern is
//! enough.

use regex_lite::Regex;

/// Text content of every `<tag>...</tag>` leaf element, unescaped, in
/// document order.
pub fn elements(body: &str, tag: &str) -> Vec<String> {
    let pattern = format!(r"<{0}>([^<]*)</{0}>", regex_lite::escape(tag));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    re.captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| unescape(m.as_str()))
        .collect()
}

/// Text content of the first `<tag>` element.
pub fn element(body: &str, tag: &str) -> Option<String> {
    elements(body, tag).into_iter().next()
}

/// Resolve the predefined XML entities and numeric character references.
pub fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let Some(end) = after.find(';') else {
            out.push_str(after);
            return out;
        };

        let entity = &after[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&after[..=end]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
