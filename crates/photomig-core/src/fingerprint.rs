use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

/// Content fingerprint in the destination's checksum format: SHA-1, base64.
pub fn fingerprint(data: &[u8]) -> String {
    let digest = Sha1::digest(data);
    STANDARD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // sha1("abc") = a9993e364706816aba3e25717850c26c9cd0d89d
        assert_eq!(fingerprint(b"abc"), "qZk+NkcGgWq6PiVxeFDCbJzQ2J0=");
    }

    #[test]
    fn test_different_content_differs() {
        assert_ne!(fingerprint(b"a"), fingerprint(b"b"));
        assert_eq!(fingerprint(b""), "2jmj7l5rSw0yVb/vlWAYkK/YBwk=");
    }
}
