//! Semantic value patterns
//!
//! Regexes are compiled once. A value may carry more than one pattern only
//! where the patterns nest (a bare number is never a currency).

use once_cell::sync::Lazy;
use regex::Regex;
use schemalens_core::SemanticPattern;

#[allow(clippy::expect_used)]
static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("valid uuid regex")
});

#[allow(clippy::expect_used)]
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

#[allow(clippy::expect_used)]
static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])$").expect("valid date regex")
});

#[allow(clippy::expect_used)]
static DATETIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$")
        .expect("valid datetime regex")
});

#[allow(clippy::expect_used)]
static URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(https?|ftp)://[^\s/$.?#][^\s]*$").expect("valid url regex")
});

#[allow(clippy::expect_used)]
static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)$")
        .expect("valid ipv4 regex")
});

#[allow(clippy::expect_used)]
static IPV6: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)([0-9a-f]{1,4}:){7}[0-9a-f]{1,4}$|^(?i)(([0-9a-f]{1,4}:){0,6}[0-9a-f]{0,4})?::([0-9a-f]{1,4}:){0,6}[0-9a-f]{0,4}$")
        .expect("valid ipv6 regex")
});

#[allow(clippy::expect_used)]
static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+?\(?\d{1,4}\)?[\s.-]?\(?\d{2,4}\)?([\s.-]?\d{2,4}){1,3}$").expect("valid phone regex")
});

#[allow(clippy::expect_used)]
static CURRENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[$€£¥]\s?-?\d{1,3}(?:[,.]?\d{3})*(?:[.,]\d{1,2})?|-?\d{1,3}(?:[,.]?\d{3})*(?:[.,]\d{1,2})?\s?(?:USD|EUR|GBP|JPY|CHF|[$€£¥]))$")
        .expect("valid currency regex")
});

#[allow(clippy::expect_used)]
static PERCENTAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?\s?%$").expect("valid percentage regex"));

/// Value patterns checked by the pattern enhancer, in report order
pub const VALUE_PATTERNS: [SemanticPattern; 9] = [
    SemanticPattern::Uuid,
    SemanticPattern::Email,
    SemanticPattern::Date,
    SemanticPattern::Datetime,
    SemanticPattern::Url,
    SemanticPattern::IpAddress,
    SemanticPattern::PhoneNumber,
    SemanticPattern::Currency,
    SemanticPattern::Percentage,
];

/// Whether `value` matches `pattern`
#[must_use]
pub fn matches(pattern: SemanticPattern, value: &str) -> bool {
    let value = value.trim();
    match pattern {
        SemanticPattern::Uuid => UUID.is_match(value),
        SemanticPattern::Email => EMAIL.is_match(value),
        SemanticPattern::Date => DATE.is_match(value),
        SemanticPattern::Datetime => DATETIME.is_match(value),
        SemanticPattern::Url => URL.is_match(value),
        SemanticPattern::IpAddress => IPV4.is_match(value) || (value.contains(':') && IPV6.is_match(value)),
        SemanticPattern::PhoneNumber => {
            // separators or a leading plus distinguish phones from plain numbers
            let digits = value.chars().filter(char::is_ascii_digit).count();
            (7..=15).contains(&digits)
                && value.chars().any(|c| matches!(c, '+' | ' ' | '-' | '(' | '.'))
                && !DATE.is_match(value)
                && !IPV4.is_match(value)
                && PHONE.is_match(value)
        }
        SemanticPattern::Currency => CURRENCY.is_match(value) && value.chars().any(|c| !c.is_ascii_digit() && c != '.' && c != '-'),
        SemanticPattern::Percentage => PERCENTAGE.is_match(value),
        SemanticPattern::Id => false,
    }
}

/// Every value pattern `value` matches
#[must_use]
pub fn classify(value: &str) -> Vec<SemanticPattern> {
    VALUE_PATTERNS
        .iter()
        .copied()
        .filter(|p| matches(*p, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("550e8400-e29b-41d4-a716-446655440000"), vec![SemanticPattern::Uuid]);
        assert_eq!(classify("ana@example.org"), vec![SemanticPattern::Email]);
        assert_eq!(classify("2021-01-05"), vec![SemanticPattern::Date]);
        assert_eq!(classify("2021-01-05T10:00:00Z"), vec![SemanticPattern::Datetime]);
        assert_eq!(classify("https://example.org/a?b=1"), vec![SemanticPattern::Url]);
        assert_eq!(classify("192.168.0.1"), vec![SemanticPattern::IpAddress]);
        assert_eq!(classify("fe80::1"), vec![SemanticPattern::IpAddress]);
        assert_eq!(classify("+1 415 555 0100"), vec![SemanticPattern::PhoneNumber]);
        assert_eq!(classify("$1,200.50"), vec![SemanticPattern::Currency]);
        assert_eq!(classify("12.5%"), vec![SemanticPattern::Percentage]);
    }

    #[test]
    fn test_plain_values_have_no_pattern() {
        assert!(classify("42").is_empty());
        assert!(classify("3.14").is_empty());
        assert!(classify("hello world").is_empty());
    }
}
