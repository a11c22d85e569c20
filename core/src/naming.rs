//! Identifier helpers: case folding and English singular/plural forms
//!
//! Used by the name-based type enhancer and by the relationship strategies to
//! compare names such as `UserId`, `user_id` and `users`.

/// Convert an identifier to lower snake case.
///
/// `CustomerID` → `customer_id`, `orderDate` → `order_date`,
/// `ship-to` → `ship_to`.
#[must_use]
pub fn to_snake_case(ident: &str) -> String {
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len() + 4);
    for (idx, &ch) in chars.iter().enumerate() {
        if ch == '-' || ch == ' ' || ch == '.' {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            continue;
        }
        if ch.is_uppercase() {
            let prev = idx.checked_sub(1).and_then(|i| chars.get(i)).copied();
            let next = chars.get(idx + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out.trim_matches('_').to_string()
}

/// Best-effort English singular form of a lowercase word
#[must_use]
pub fn singularize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if let Some(singular) = irregular_singular(&lower) {
        return singular.to_string();
    }
    if lower.len() <= 2 || lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
        return lower;
    }
    if let Some(stem) = lower.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["ches", "shes", "xes", "zes", "sses"] {
        if let Some(stem) = lower.strip_suffix(suffix) {
            return format!("{stem}{}", &suffix[..suffix.len() - 2]);
        }
    }
    if let Some(stem) = lower.strip_suffix('s') {
        return stem.to_string();
    }
    lower
}

/// Best-effort English plural form of a lowercase word
#[must_use]
pub fn pluralize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if let Some(plural) = irregular_plural(&lower) {
        return plural.to_string();
    }
    if lower.ends_with('y')
        && !lower.ends_with("ay")
        && !lower.ends_with("ey")
        && !lower.ends_with("oy")
        && !lower.ends_with("uy")
    {
        return format!("{}ies", &lower[..lower.len() - 1]);
    }
    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        return format!("{lower}es");
    }
    format!("{lower}s")
}

/// Whether two names are equal up to case and singular/plural form
#[must_use]
pub fn names_related(a: &str, b: &str) -> bool {
    let a = to_snake_case(a);
    let b = to_snake_case(b);
    if a == b {
        return true;
    }
    let (a_head, a_last) = split_last_token(&a);
    let (b_head, b_last) = split_last_token(&b);
    a_head == b_head && singularize(a_last) == singularize(b_last)
}

fn split_last_token(name: &str) -> (&str, &str) {
    match name.rsplit_once('_') {
        Some((head, last)) => (head, last),
        None => ("", name),
    }
}

/// Candidate foreign-key column names pointing at an entity.
///
/// For `users` this yields `user_id`, `userid`, `users_id`.
#[must_use]
pub fn foreign_key_names(entity: &str) -> Vec<String> {
    let snake = to_snake_case(entity);
    let singular = singular_phrase(&snake);
    let mut names = vec![
        format!("{singular}_id"),
        format!("{}id", singular.replace('_', "")),
    ];
    let plural_form = format!("{snake}_id");
    if !names.contains(&plural_form) {
        names.push(plural_form);
    }
    names
}

/// Singularize the last token of a snake_case phrase
#[must_use]
pub fn singular_phrase(snake: &str) -> String {
    let (head, last) = split_last_token(snake);
    if head.is_empty() {
        singularize(last)
    } else {
        format!("{head}_{}", singularize(last))
    }
}

/// Whether a snake_case name looks like a key column (`id`, `*_id`, `*_key`, `*_code`)
#[must_use]
pub fn is_key_like(name: &str) -> bool {
    let snake = to_snake_case(name);
    snake == "id"
        || snake.ends_with("_id")
        || snake.ends_with("_key")
        || snake.ends_with("_code")
        || snake.ends_with("_uuid")
        || snake.ends_with("_ref")
}

fn irregular_singular(word: &str) -> Option<&'static str> {
    IRREGULAR
        .iter()
        .find(|(_, plural)| *plural == word)
        .map(|(singular, _)| *singular)
}

fn irregular_plural(word: &str) -> Option<&'static str> {
    IRREGULAR
        .iter()
        .find(|(singular, _)| *singular == word)
        .map(|(_, plural)| *plural)
}

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("datum", "data"),
    ("criterion", "criteria"),
    ("index", "indices"),
    ("status", "statuses"),
    ("address", "addresses"),
    ("category", "categories"),
    ("leaf", "leaves"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("CustomerID"), "customer_id");
        assert_eq!(to_snake_case("orderDate"), "order_date");
        assert_eq!(to_snake_case("ship-to"), "ship_to");
        assert_eq!(to_snake_case("HTTPStatus"), "http_status");
        assert_eq!(to_snake_case("user_id"), "user_id");
    }

    #[test]
    fn test_singular_plural() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("address"), "address");
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("box"), "boxes");
    }

    #[test]
    fn test_names_related() {
        assert!(names_related("order_items", "order_item"));
        assert!(names_related("CustomerId", "customer_id"));
        assert!(!names_related("customer_id", "order_id"));
    }

    #[test]
    fn test_foreign_key_names() {
        let names = foreign_key_names("users");
        assert!(names.contains(&"user_id".to_string()));
        assert!(names.contains(&"userid".to_string()));
        let names = foreign_key_names("OrderItems");
        assert!(names.contains(&"order_item_id".to_string()));
    }

    #[test]
    fn test_key_like() {
        assert!(is_key_like("id"));
        assert!(is_key_like("customerId"));
        assert!(is_key_like("country_code"));
        assert!(!is_key_like("name"));
    }
}
