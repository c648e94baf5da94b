/// Parses numeric text the way accountants write it: thousands separators,
/// surrounding spaces, a trailing percent sign, and parentheses for negatives.
pub fn parse_number(text: &str) -> Option<f64> {
    let mut cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '，' | ' ' | '\u{3000}' | '\u{a0}'))
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let mut sign = 1.0;
    if (cleaned.starts_with('(') && cleaned.ends_with(')'))
        || (cleaned.starts_with('（') && cleaned.ends_with('）'))
    {
        let open = cleaned.chars().next().map(char::len_utf8).unwrap_or(1);
        let close = cleaned.chars().last().map(char::len_utf8).unwrap_or(1);
        if cleaned.len() <= open + close {
            return None;
        }
        cleaned = cleaned[open..cleaned.len() - close].to_string();
        sign = -1.0;
    }

    let percent = cleaned.ends_with('%');
    if percent {
        cleaned.pop();
    }

    // Rust accepts "inf" and "nan"; spreadsheets never mean those.
    if !cleaned
        .chars()
        .any(|c| c.is_ascii_digit())
    {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    Some(if percent { sign * value / 100.0 } else { sign * value })
}

/// Formats a number without a trailing `.0` for integral values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

pub fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// Count of leading whitespace characters, including full-width spaces.
pub fn leading_whitespace(text: &str) -> usize {
    text.chars().take_while(|c| c.is_whitespace()).count()
}

/// True for header text that carries no words: blank, or one symbol repeated
/// (`---`, `——`, `***`, `/`). A repeated letter or digit run of two or more
/// also counts (`xx`, `00`).
pub fn is_placeholder_text(text: &str) -> bool {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return true,
    };

    if !trimmed.chars().all(|c| c == first) {
        return false;
    }

    let count = trimmed.chars().count();
    count >= 2 || !(first.is_alphanumeric() || is_cjk(first))
}

/// True for data-row text that carries no words: blank, or symbols only
/// (`-`, `——`, `/`). Unlike [`is_placeholder_text`], repeated letters, digits
/// and CJK characters are kept, so short names such as `宝宝` survive.
pub fn is_filler_text(text: &str) -> bool {
    text.trim().chars().all(|c| !(c.is_alphanumeric() || is_cjk(c)))
}

/// Header text with placeholders collapsed to empty.
pub fn clean_header_text(text: &str) -> String {
    if is_placeholder_text(text) {
        String::new()
    } else {
        collapse_whitespace(text.trim())
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercases text and replaces every run of non-word characters with `_`,
/// keeping CJK characters. Returns an empty string when nothing survives.
pub fn sanitize_key(text: &str) -> String {
    let mut key = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.chars() {
        if c.is_alphanumeric() || is_cjk(c) {
            if pending_separator && !key.is_empty() {
                key.push('_');
            }
            pending_separator = false;
            key.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    key
}

/// Joins the non-empty parts with `separator`.
pub fn join_non_empty(parts: &[&str], separator: &str) -> String {
    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}
