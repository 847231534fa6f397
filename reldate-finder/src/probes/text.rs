//! Tolerant HTML / wikitext scanning helpers
//!
//! No DOM: pages are scanned as text. Helpers return `None` rather than
//! erroring when the expected markup is missing.

use crate::normalizer::parse_date;

/// Longest token window tried when looking for a date ("Mar. 3 , 2023")
const MAX_DATE_TOKENS: usize = 4;

/// Characters that separate tokens in addition to whitespace
const SEPARATORS: &[char] = &['|', '{', '}', '[', ']', '<', '>', '=', ';', '(', ')'];

/// Remove `<...>` tags, replacing each with a space
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Decode the handful of entities that show up around dates
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" | "#160" => Some(' '),
                _ => entity
                    .strip_prefix('#')
                    .and_then(|n| n.parse::<u32>().ok())
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, end + 1))
        });

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Plain text of an HTML fragment: tags stripped, entities decoded, whitespace collapsed
pub fn html_to_text(html: &str) -> String {
    decode_entities(&strip_tags(html))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First substring of `text` that parses as a full calendar date
///
/// Returns the matched words joined by single spaces, leaving canonical
/// rendering to the normalizer.
pub fn find_date_in_text(text: &str) -> Option<String> {
    let tokens: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || SEPARATORS.contains(&c))
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .collect();

    for start in 0..tokens.len() {
        for len in (1..=MAX_DATE_TOKENS).rev() {
            let Some(window) = tokens.get(start..start + len) else {
                continue;
            };
            let candidate = window.join(" ");
            if parse_date(&candidate).is_some() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Text following the first case-insensitive occurrence of any label, if it holds a date
pub fn date_after_label(text: &str, labels: &[&str], window: usize) -> Option<String> {
    let lower = text.to_ascii_lowercase();

    labels.iter().find_map(|label| {
        let at = lower.find(&label.to_ascii_lowercase())? + label.len();
        find_date_in_text(prefix_chars(&text[at..], window))
    })
}

/// Position just after the opening tag whose `class` attribute contains each
/// class of `path` in turn (a descendant-selector walk like `.a .b`)
fn find_class_path(html: &str, path: &[&str]) -> Option<usize> {
    let mut pos = 0;
    for class in path {
        pos = find_class_attr(html, pos, class)?;
    }
    Some(html[pos..].find('>')? + pos + 1)
}

fn find_class_attr(html: &str, from: usize, class: &str) -> Option<usize> {
    let mut search = from;
    while let Some(rel) = html[search..].find("class=\"") {
        let value_start = search + rel + "class=\"".len();
        let value_end = html[value_start..].find('"')? + value_start;
        if html[value_start..value_end]
            .split_whitespace()
            .any(|c| c == class)
        {
            return Some(value_end);
        }
        search = value_end;
    }
    None
}

/// First text node inside the element matched by `path`
pub fn class_text(html: &str, path: &[&str]) -> Option<String> {
    let start = find_class_path(html, path)?;
    let end = html[start..].find('<').map_or(html.len(), |i| i + start);
    let text = html_to_text(&html[start..end]);
    (!text.is_empty()).then_some(text)
}

/// Plain text of up to `window` characters following the element matched by `path`
pub fn class_section(html: &str, path: &[&str], window: usize) -> Option<String> {
    let start = find_class_path(html, path)?;
    let text = html_to_text(prefix_chars(&html[start..], window));
    (!text.is_empty()).then_some(text)
}

/// Value of the first `attr="..."` attribute
pub fn attr_value<'a>(html: &'a str, attr: &str) -> Option<&'a str> {
    let needle = format!("{}=\"", attr);
    let start = html.find(&needle)? + needle.len();
    let end = html[start..].find('"')? + start;
    Some(&html[start..end])
}

fn prefix_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
