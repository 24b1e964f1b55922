// Identifier and timestamp generation

use rand::Rng;
use uuid::Uuid;

/// Alphabet for discriminator ids carried in URL paths.
const DID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Generate a random RFC 4122 v4 UUID, used for `cid`/`eid`/`sid`.
pub fn gen_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a short random discriminator (`did`/`edid`) of `length`
/// characters drawn from the URL-safe alphabet.
pub fn gen_did(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..DID_ALPHABET.len());
            DID_ALPHABET[idx] as char
        })
        .collect()
}

/// Current timestamp as integer Unix-epoch milliseconds.
pub fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_did_length_and_alphabet() {
        let did = gen_did(7);
        assert_eq!(did.len(), 7);
        assert!(did.bytes().all(|b| DID_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_gen_uuid_shape() {
        let id = gen_uuid();
        assert_eq!(id.split('-').count(), 5);
        assert_eq!(id.len(), 36);
    }

    #[test]
    fn test_timestamp_is_millis() {
        let ts = timestamp_ms();
        // Anything after 2020-01-01 in milliseconds.
        assert!(ts > 1_577_836_800_000);
    }
}
