use super::*;
use chrono::TimeZone;

#[test]
fn test_tag_quote_unquote_round_trip() {
    let raw = "Re: hello, world! <test@example.com>";
    let quoted = tag_quote(raw);
    assert!(quoted.chars().all(|c| c.is_ascii_alphanumeric() || "._-%".contains(c)));
    assert_eq!(tag_unquote(&quoted), raw);
}

#[test]
fn test_tag_quote_leaves_safe_chars_alone() {
    assert_eq!(tag_quote("simple-tag_name.ok"), "simple-tag_name.ok");
}

#[test]
fn test_ts_to_keywords_buckets() {
    let ts = Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap();
    let keywords = ts_to_keywords(ts);
    assert!(keywords.contains(&"year:2026".to_string()));
    assert!(keywords.contains(&"month:2026-07".to_string()));
    assert!(keywords.contains(&"day:2026-07-26".to_string()));
    assert!(keywords.iter().any(|k| k.starts_with("vdate:")));
}

#[test]
fn test_version_to_keywords_includes_exact_and_buckets() {
    let keywords = version_to_keywords(5);
    assert!(keywords.contains(&"version:5".to_string()));
    assert!(keywords.contains(&"version:>=1".to_string()));
    assert!(keywords.contains(&"version:>=4".to_string()));
    assert!(!keywords.contains(&"version:>=8".to_string()));
}

#[test]
fn test_version_zero_has_only_exact_keyword() {
    let keywords = version_to_keywords(0);
    assert_eq!(keywords, vec!["version:0".to_string()]);
}

#[test]
fn test_msg_id_hash_is_stable_and_fixed_width() {
    let a = msg_id_hash("<abc123@example.com>");
    let b = msg_id_hash("<abc123@example.com>");
    let c = msg_id_hash("<different@example.com>");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 27);
}

#[test]
fn test_status_magic_rewrites() {
    let magic = StatusMagic;
    assert_eq!(magic.rewrite("is:unread"), Some("-in:read".to_string()));
    assert_eq!(magic.rewrite("is:read"), Some("in:read".to_string()));
    assert_eq!(magic.rewrite("subject:hello"), None);
}
