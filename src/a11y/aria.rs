//! ARIA role and property translation.
//!
//! The platform hands us a role string plus a free-form property blob of
//! `key=value` pairs separated by `;` or `,`. This module normalizes both
//! into the typed flags the virtual buffer stores: heading level, landmark
//! type, link flag, and the boolean state properties.

use std::collections::HashMap;

/// The fixed landmark vocabulary. Role names map case-insensitively.
pub const LANDMARK_TYPES: [&str; 8] = [
    "Banner",
    "Complementary",
    "Content info",
    "Form",
    "Main",
    "Navigation",
    "Region",
    "Search",
];

/// Typed result of translating one element's ARIA surface.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AriaFlags {
    pub heading_level: u8,
    /// One of [`LANDMARK_TYPES`] or empty.
    pub landmark: String,
    pub is_link: bool,
    pub is_visited: bool,
    pub is_required: bool,
    pub is_expandable: bool,
    pub is_expanded: bool,
}

/// Parses the property blob into a key → value map. Keys are lowercased;
/// malformed fragments (no `=`) are ignored.
pub fn parse_properties(blob: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in blob.split([';', ',']) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        if let Some((key, value)) = pair.split_once('=') {
            let key = key.trim().to_ascii_lowercase();
            if !key.is_empty() {
                map.insert(key, value.trim().to_string());
            }
        }
    }
    map
}

/// Property truthiness: exactly `true`, `1`, or `yes`, case-insensitively.
/// Every other token, including non-empty ones, is false.
pub fn is_truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1" || value.eq_ignore_ascii_case("yes")
}

/// Translates a role string plus property blob into typed flags.
pub fn translate(role: &str, properties: &str) -> AriaFlags {
    let props = parse_properties(properties);
    let role_lower = role.trim().to_ascii_lowercase();

    let mut flags = AriaFlags::default();

    flags.heading_level = match role_lower.as_str() {
        "heading" => props
            .get("level")
            .and_then(|v| v.parse::<u8>().ok())
            .filter(|&l| (1..=6).contains(&l))
            .unwrap_or(0),
        "h1" => 1,
        "h2" => 2,
        "h3" => 3,
        "h4" => 4,
        "h5" => 5,
        "h6" => 6,
        _ => 0,
    };

    flags.landmark = landmark_for_role(&role_lower).unwrap_or_default().to_string();
    flags.is_link = role_lower == "link";

    flags.is_visited = props.get("visited").is_some_and(|v| is_truthy(v));
    flags.is_required = props.get("required").is_some_and(|v| is_truthy(v));
    flags.is_expandable = props.get("expandable").is_some_and(|v| is_truthy(v));
    flags.is_expanded = props.get("expanded").is_some_and(|v| is_truthy(v));

    flags
}

fn landmark_for_role(role_lower: &str) -> Option<&'static str> {
    match role_lower {
        "banner" => Some("Banner"),
        "complementary" => Some("Complementary"),
        "contentinfo" => Some("Content info"),
        "form" => Some("Form"),
        "main" => Some("Main"),
        "navigation" => Some("Navigation"),
        "region" => Some("Region"),
        "search" => Some("Search"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_role_with_level_property() {
        let flags = translate("heading", "level=2");
        assert_eq!(flags.heading_level, 2);
        assert!(flags.landmark.is_empty());
    }

    #[test]
    fn heading_alias_roles() {
        assert_eq!(translate("h1", "").heading_level, 1);
        assert_eq!(translate("H3", "").heading_level, 3);
        assert_eq!(translate("h6", "").heading_level, 6);
    }

    #[test]
    fn out_of_range_heading_level_is_ignored() {
        assert_eq!(translate("heading", "level=7").heading_level, 0);
        assert_eq!(translate("heading", "level=0").heading_level, 0);
        assert_eq!(translate("heading", "level=two").heading_level, 0);
    }

    #[test]
    fn landmark_roles_map_to_fixed_vocabulary() {
        assert_eq!(translate("navigation", "").landmark, "Navigation");
        assert_eq!(translate("contentinfo", "").landmark, "Content info");
        assert_eq!(translate("SEARCH", "").landmark, "Search");
        assert_eq!(translate("sidebar", "").landmark, "");
    }

    #[test]
    fn link_role_sets_link_flag() {
        assert!(translate("link", "").is_link);
        assert!(!translate("button", "").is_link);
    }

    #[test]
    fn truthiness_accepts_exactly_three_tokens() {
        assert!(is_truthy("true"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("1"));
        assert!(is_truthy("yes"));
        assert!(is_truthy("Yes"));
        // Non-empty but unrecognized values stay false.
        assert!(!is_truthy("maybe"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
        assert!(!is_truthy("on"));
    }

    #[test]
    fn properties_split_on_either_separator() {
        let props = parse_properties("visited=true; required=1, expanded=no");
        assert_eq!(props.get("visited").map(String::as_str), Some("true"));
        assert_eq!(props.get("required").map(String::as_str), Some("1"));
        assert_eq!(props.get("expanded").map(String::as_str), Some("no"));
    }

    #[test]
    fn malformed_fragments_are_ignored() {
        let props = parse_properties("visited; =true; level=2");
        assert_eq!(props.len(), 1);
        assert_eq!(props.get("level").map(String::as_str), Some("2"));
    }

    #[test]
    fn state_properties_translate() {
        let flags = translate("link", "visited=true;required=yes;expandable=1;expanded=false");
        assert!(flags.is_link);
        assert!(flags.is_visited);
        assert!(flags.is_required);
        assert!(flags.is_expandable);
        assert!(!flags.is_expanded);
    }

    #[test]
    fn unknown_keys_yield_defaults() {
        let flags = translate("link", "sparkle=true");
        assert!(!flags.is_visited);
        assert_eq!(flags.heading_level, 0);
    }
}
