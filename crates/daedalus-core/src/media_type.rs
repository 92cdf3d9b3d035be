//! Media type helpers.
//!
//! A request `Content-Type` is reduced to its essence (`type/subtype`,
//! lowercase, parameters dropped) and matched against the media types an
//! operation declares, which may use `type/*` or `*/*` wildcards.

use indexmap::IndexMap;

/// Reduces a media type to `type/subtype`, lowercased and without parameters.
///
/// ```
/// use daedalus_core::media_type::essence;
///
/// assert_eq!(essence("Application/JSON; charset=utf-8"), "application/json");
/// ```
#[must_use]
pub fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Returns `true` if the media type is JSON (`application/json` or `*+json`).
#[must_use]
pub fn is_json(media_type: &str) -> bool {
    let essence = essence(media_type);
    essence == "application/json" || essence.ends_with("+json")
}

/// Returns `true` if the media type is an urlencoded form.
#[must_use]
pub fn is_form(media_type: &str) -> bool {
    essence(media_type) == "application/x-www-form-urlencoded"
}

/// Returns `true` if the declared `pattern` accepts the concrete `media_type`.
#[must_use]
pub fn matches(pattern: &str, media_type: &str) -> bool {
    let pattern = essence(pattern);
    let actual = essence(media_type);
    if pattern == "*/*" || pattern == actual {
        return true;
    }
    match (pattern.split_once('/'), actual.split_once('/')) {
        (Some((pattern_type, "*")), Some((actual_type, _))) => pattern_type == actual_type,
        _ => false,
    }
}

/// Picks the declared media type that best matches a request `Content-Type`.
///
/// Exact matches win over `type/*`, which wins over `*/*`. Among equally
/// specific candidates the first declared one is used.
pub fn pick<'a, T>(
    content_type: &str,
    declared: &'a IndexMap<String, T>,
) -> Option<(&'a str, &'a T)> {
    let actual = essence(content_type);
    if actual.is_empty() {
        return None;
    }
    declared
        .iter()
        .filter(|(pattern, _)| matches(pattern, &actual))
        .min_by_key(|(pattern, _)| specificity(pattern))
        .map(|(pattern, value)| (pattern.as_str(), value))
}

fn specificity(pattern: &str) -> u8 {
    let pattern = essence(pattern);
    if pattern == "*/*" {
        2
    } else if pattern.ends_with("/*") {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(types: &[&str]) -> IndexMap<String, usize> {
        types
            .iter()
            .enumerate()
            .map(|(i, t)| ((*t).to_string(), i))
            .collect()
    }

    #[test]
    fn test_essence_strips_parameters() {
        assert_eq!(essence("text/plain;charset=UTF-8"), "text/plain");
        assert_eq!(essence("  application/json "), "application/json");
        assert_eq!(essence(""), "");
    }

    #[test]
    fn test_is_json() {
        assert!(is_json("application/json"));
        assert!(is_json("application/problem+json; charset=utf-8"));
        assert!(!is_json("text/plain"));
    }

    #[test]
    fn test_wildcards() {
        assert!(matches("*/*", "image/png"));
        assert!(matches("text/*", "text/csv"));
        assert!(!matches("text/*", "application/json"));
        assert!(!matches("application/json", "application/xml"));
    }

    #[test]
    fn test_pick_prefers_exact_match() {
        let candidates = declared(&["*/*", "text/*", "text/plain"]);
        let (picked, index) = pick("text/plain; charset=utf-8", &candidates).unwrap();
        assert_eq!(picked, "text/plain");
        assert_eq!(*index, 2);

        let (picked, _) = pick("text/csv", &candidates).unwrap();
        assert_eq!(picked, "text/*");

        let (picked, _) = pick("image/png", &candidates).unwrap();
        assert_eq!(picked, "*/*");
    }

    #[test]
    fn test_pick_without_match() {
        let candidates = declared(&["application/json"]);
        assert!(pick("text/plain", &candidates).is_none());
        assert!(pick("", &candidates).is_none());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn essence_is_idempotent(media_type in "[ -~]{0,40}") {
                let once = essence(&media_type);
                prop_assert_eq!(essence(&once), once.clone());
                prop_assert!(!once.contains(';'));
            }

            #[test]
            fn catch_all_matches_everything(
                kind in "[a-z]{1,10}",
                subtype in "[a-z+.-]{1,12}",
                param in "[a-z]{0,8}",
            ) {
                let media_type = format!("{kind}/{subtype}; {param}");
                prop_assert!(matches("*/*", &media_type));
                let kind_wildcard = format!("{kind}/*");
                prop_assert!(matches(&kind_wildcard, &media_type));
                prop_assert!(matches(&media_type, &media_type));
            }
        }
    }
}
