/// Longest entity name kept, in characters.
pub const MAX_NAME_LENGTH: usize = 100;

pub const DEFAULT_RELATION: &str = "RELATED_TO";

/// Normalize an entity name.
///
/// Whitespace runs collapse to single spaces. A name written entirely in
/// upper or lower case is converted to title case; mixed-case names such as
/// "MacBook" are kept verbatim. The result is truncated to
/// [`MAX_NAME_LENGTH`] characters.
pub fn normalize_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");

    let has_upper = collapsed.chars().any(char::is_uppercase);
    let has_lower = collapsed.chars().any(char::is_lowercase);

    let normalized = if has_upper != has_lower {
        title_case(&collapsed)
    } else {
        collapsed
    };

    truncate_chars(&normalized, MAX_NAME_LENGTH)
}

/// Upper-case the first letter of every alphabetic run, lower-case the rest.
pub fn title_case(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut previous_is_letter = false;

    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                result.extend(c.to_lowercase());
            } else {
                result.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            result.push(c);
            previous_is_letter = false;
        }
    }

    result
}

/// Relation labels are upper-cased; missing or blank labels become RELATED_TO.
pub fn normalize_relation(label: Option<&str>) -> String {
    match label.map(str::trim) {
        Some(label) if !label.is_empty() => label.to_uppercase(),
        _ => DEFAULT_RELATION.to_string(),
    }
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
