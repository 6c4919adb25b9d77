/// Maximum description length in characters before an ellipsis is appended.
pub const DESCRIPTION_MAX_CHARS: usize = 300;

/// Maximum title length in characters before an ellipsis is appended.
pub const TITLE_MAX_CHARS: usize = 100;

const ELLIPSIS: &str = "...";

const TITLE_SEPARATORS: &[char] = &['-', '|', ':', '・', '—', '–'];

/// Trims `s` and cuts it to `max` characters, appending `...` when cut.
///
/// Counts `char`s, not bytes, so multi-byte text is never split mid-character.
/// Text of at most `max` characters comes back trimmed but otherwise unchanged.
pub fn clip(s: &str, max: usize) -> String {
    let s = s.trim();
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{}", &s[..cut], ELLIPSIS),
        None => s.to_string(),
    }
}

/// Clips an optional text field, mapping blank input to `None`.
pub fn clip_opt(s: Option<String>, max: usize) -> Option<String> {
    s.map(|s| clip(&s, max)).filter(|s| !s.is_empty())
}

/// Removes a trailing `<separator> <site name>` decoration from a page title.
///
/// `"Strawberry Pasta | Alice's Site"` with site name `"Alice's Site"` becomes
/// `"Strawberry Pasta"`. Titles that do not end with the site name, or where
/// nothing would be left, are only trimmed.
pub fn cleanup_title(title: &str, site_name: &str) -> String {
    let title = title.trim();
    let site_name = site_name.trim();
    if site_name.is_empty() {
        return title.to_string();
    }

    let Some(head) = title.strip_suffix(site_name) else {
        return title.to_string();
    };
    let head = head.trim_end();
    let Some(head) = head.strip_suffix(TITLE_SEPARATORS) else {
        return title.to_string();
    };
    let head = head.trim_end();
    if head.is_empty() {
        title.to_string()
    } else {
        head.to_string()
    }
}

/// Safely truncate a string by display width, for terminal output.
///
/// Wide characters (CJK, emoji) count double, and `...` is appended when the
/// string had to be cut.
#[cfg(feature = "logging")]
pub fn truncate_str(s: &str, max_width: usize) -> String {
    use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

    if s.width() <= max_width {
        return s.to_string();
    }

    let mut result = String::new();
    let mut current_width = 0;

    for c in s.chars() {
        let char_width = c.width().unwrap_or(1);

        if current_width + char_width + ELLIPSIS.len() > max_width {
            break;
        }

        result.push(c);
        current_width += char_width;
    }

    result.push_str(ELLIPSIS);
    result
}
