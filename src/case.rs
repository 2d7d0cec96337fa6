//! Name conversion: column snake_case -> attribute camelCase, model names -> kebab-case resource names, pluralization.

/// Convert a single identifier from snake_case to camelCase.
/// e.g. "user_id" -> "userId", "created_at" -> "createdAt"
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for c in s.chars() {
        if c == '_' || c == '-' {
            capitalize_next = !out.is_empty();
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a single identifier from camelCase to snake_case.
/// e.g. "userId" -> "user_id", "createdAt" -> "created_at"
pub fn to_snake_case(s: &str) -> String {
    to_kebab_case(s).replace('-', "_")
}

/// Convert PascalCase, camelCase, snake_case or kebab-case to lowercase kebab-case.
/// Acronym runs stay together: "HTTPServer" -> "http-server", "TodoItems" -> "todo-items".
pub fn to_kebab_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == ' ' {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 && !out.is_empty() && !out.ends_with('-') {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                out.push('-');
            }
        }
        out.extend(c.to_lowercase());
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// English plural of the last word of a kebab-case name.
/// e.g. "todo-item" -> "todo-items", "category" -> "categories", "box" -> "boxes"
pub fn pluralize_english(s: &str) -> String {
    const VOWELS: &[char] = &['a', 'e', 'i', 'o', 'u'];
    if s.is_empty() {
        return String::new();
    }
    if let Some(stem) = s.strip_suffix('y') {
        if !stem.is_empty() && !stem.ends_with(VOWELS) {
            return format!("{}ies", stem);
        }
    }
    if s.ends_with('s') || s.ends_with('x') || s.ends_with('z') || s.ends_with("ch") || s.ends_with("sh") {
        return format!("{}es", s);
    }
    format!("{}s", s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case() {
        assert_eq!(to_camel_case("created_at"), "createdAt");
        assert_eq!(to_camel_case("title"), "title");
        assert_eq!(to_camel_case("_private"), "private");
    }

    #[test]
    fn test_kebab_case() {
        assert_eq!(to_kebab_case("TodoItem"), "todo-item");
        assert_eq!(to_kebab_case("TodoItems"), "todo-items");
        assert_eq!(to_kebab_case("todo_items"), "todo-items");
        assert_eq!(to_kebab_case("todo-items"), "todo-items");
        assert_eq!(to_kebab_case("HTTPServer"), "http-server");
        assert_eq!(to_kebab_case("article2Tag"), "article2-tag");
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("createdAt"), "created_at");
        assert_eq!(to_snake_case("TodoItem"), "todo_item");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize_english("todo-item"), "todo-items");
        assert_eq!(pluralize_english("category"), "categories");
        assert_eq!(pluralize_english("day"), "days");
        assert_eq!(pluralize_english("box"), "boxes");
        assert_eq!(pluralize_english("match"), "matches");
        assert_eq!(pluralize_english("person"), "persons");
    }
}
