//! GraphQL naming: capitalization, singular/plural forms, and the
//! container-to-type-name derivation.

/// Uppercase the first ASCII character.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Lowercase the first ASCII character (GraphQL field names).
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Irregular plural → singular pairs the ending rules get wrong.
const IRREGULAR_SINGULAR: [(&str, &str); 6] = [
    ("people", "person"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
    ("feet", "foot"),
    ("teeth", "tooth"),
];

/// Reduce a plural word to its singular form: irregulars, `ies`→`y`,
/// `ses`/`xes`/`zes`→ drop `es`, then a trailing `s` that is not `ss`.
pub fn singularize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    for (plural, singular) in IRREGULAR_SINGULAR {
        if lower == plural {
            return match_case(word, singular);
        }
    }
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{stem}y");
        }
    }
    for suffix in ["ses", "xes", "zes"] {
        if let Some(stem) = word.strip_suffix(suffix) {
            return format!("{stem}{}", &suffix[..1]);
        }
    }
    if word.ends_with('s') && !word.ends_with("ss") && word.len() > 1 {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Expand a singular word to its plural form (the inverse rules).
pub fn pluralize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    for (plural, singular) in IRREGULAR_SINGULAR {
        if lower == singular {
            return match_case(word, plural);
        }
    }
    if word.len() > 1 && word.ends_with('y') {
        let before = word.as_bytes()[word.len() - 2] as char;
        if !matches!(before, 'a' | 'e' | 'i' | 'o' | 'u') {
            return format!("{}ies", &word[..word.len() - 1]);
        }
    }
    if word.ends_with('s') || word.ends_with('x') || word.ends_with('z') {
        return format!("{word}es");
    }
    format!("{word}s")
}

/// Preserve leading-case when substituting an irregular form.
fn match_case(original: &str, replacement: &str) -> String {
    if original.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false) {
        capitalize(replacement)
    } else {
        replacement.to_string()
    }
}

/// Default GraphQL type name for a container. The prefixed form is used
/// when the plain singular collides with an already-taken name.
pub fn derive_type_name(container: &str, taken: &[String]) -> String {
    let singular = capitalize(&singularize(container));
    if !taken.contains(&singular) {
        return singular;
    }
    format!("{}{}", capitalize(container), singular)
}

/// Whether a string is a legal GraphQL name.
pub fn is_graphql_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}
