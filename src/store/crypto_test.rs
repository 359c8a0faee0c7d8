use super::*;

fn key(byte: u8) -> [u8; 32] {
    [byte; 32]
}

#[test]
fn test_seal_open_round_trip() {
    let cipher = Cipher::new(&[key(1)]).unwrap();
    let envelope = cipher.seal(b"hello world").unwrap();
    assert_eq!(envelope[0], 0);
    let plain = cipher.open(&envelope).unwrap();
    assert_eq!(plain, b"hello world");
}

#[test]
fn test_writes_use_newest_key() {
    let cipher = Cipher::new(&[key(1), key(2), key(3)]).unwrap();
    let envelope = cipher.seal(b"data").unwrap();
    assert_eq!(envelope[0], 2);
}

#[test]
fn test_old_envelopes_decrypt_after_rotation() {
    let cipher_v1 = Cipher::new(&[key(1)]).unwrap();
    let old_envelope = cipher_v1.seal(b"old data").unwrap();

    let cipher_v2 = Cipher::new(&[key(1), key(2)]).unwrap();
    assert_eq!(cipher_v2.open(&old_envelope).unwrap(), b"old data");

    let new_envelope = cipher_v2.seal(b"new data").unwrap();
    assert_eq!(new_envelope[0], 1);
    assert_eq!(cipher_v2.open(&new_envelope).unwrap(), b"new data");
}

#[test]
fn test_tampered_ciphertext_fails() {
    let cipher = Cipher::new(&[key(1)]).unwrap();
    let mut envelope = cipher.seal(b"hello world").unwrap();
    let last = envelope.len() - 1;
    envelope[last] ^= 0xff;
    assert!(cipher.open(&envelope).is_err());
}

#[test]
fn test_unknown_key_version_rejected() {
    let cipher = Cipher::new(&[key(1)]).unwrap();
    let mut envelope = cipher.seal(b"hello world").unwrap();
    envelope[0] = 9;
    assert!(cipher.open(&envelope).is_err());
}
