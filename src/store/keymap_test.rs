use super::*;

#[test]
fn test_hash_key_is_salt_dependent() {
    let a = hash_key(b"salt-a", "msgid-1");
    let b = hash_key(b"salt-b", "msgid-1");
    assert_ne!(a, b);
    assert_eq!(hash_key(b"salt-a", "msgid-1"), a);
}

#[test]
fn test_set_get_remove() {
    let mut map = KeyMap::new();
    let hash = hash_key(b"salt", "thread-42");
    map.set(hash, 1024, 7);
    assert_eq!(map.get(&hash), Some((1024, 7)));

    let removed = map.remove(&hash);
    assert_eq!(removed, Some((1024, 7)));
    assert!(map.get(&hash).is_none());
}

#[test]
fn test_value_round_trip() {
    let mut map = KeyMap::new();
    map.set(hash_key(b"s", "a"), 10, 1);
    map.set(hash_key(b"s", "b"), 20, 2);

    let value = map.to_value();
    let back = KeyMap::from_value(&value).unwrap();

    assert_eq!(back.len(), 2);
    assert_eq!(back.get(&hash_key(b"s", "a")), Some((10, 1)));
    assert_eq!(back.get(&hash_key(b"s", "b")), Some((20, 2)));
}

#[test]
fn test_clear_empties_map() {
    let mut map = KeyMap::new();
    map.set(hash_key(b"s", "a"), 1, 1);
    map.clear();
    assert!(map.is_empty());
}
