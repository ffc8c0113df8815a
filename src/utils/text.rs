/// Collapse runs of whitespace (including newlines) into single spaces and trim.
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison key for names and titles: lowercase, trimmed, single-spaced.
pub fn normalize_key(input: &str) -> String {
    collapse_whitespace(input).to_lowercase()
}

/// Clean a scraped display name.
///
/// Scrapes of profile cards often repeat the visible name next to its
/// accessibility label ("Ben BortonBen Borton") and trail connection info
/// ("Ben Borton • 3rd+", "Acme | Company"). Both are removed.
pub fn clean_name(raw: &str) -> String {
    let name = collapse_whitespace(raw);
    let name = strip_doubled_prefix(&name);

    let name = name
        .split(" • ")
        .next()
        .unwrap_or_default()
        .split('|')
        .next()
        .unwrap_or_default();

    name.trim().to_string()
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, ' ' | '.' | '-' | '\'' | '’')
}

/// Keeps one copy of the longest prefix that is immediately repeated.
/// Prefixes shorter than two characters never count, so a doubled initial
/// ("LLama Labs", "AA Batteries") is left alone.
fn strip_doubled_prefix(name: &str) -> &str {
    let chars: Vec<(usize, char)> = name.char_indices().collect();

    for half in (2..=chars.len() / 2).rev() {
        let first = &chars[..half];
        if !first.iter().all(|(_, c)| is_name_char(*c)) {
            continue;
        }
        let repeated = chars[half..half * 2]
            .iter()
            .zip(first)
            .all(|((_, a), (_, b))| a == b);
        if repeated {
            let end = chars[half].0;
            return name[..end].trim();
        }
    }

    name
}

/// Leading count of a free-text counter: "12", "1,204 reactions", " 3 ".
pub fn leading_number(input: &str) -> Option<i64> {
    let digits: String = input
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(|c| *c != ',')
        .collect();

    digits.parse().ok()
}
