use std::fmt::{self, Display};

/// A content hash used as the `ETag` for optimistic concurrency on
/// `PUT`/`PATCH`; a mismatch surfaces as 412.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(body: &[u8]) -> Self {
        Self(*blake3::hash(body).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ContentHash {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err("etag must be 64 hex characters");
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| "invalid etag")?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| "invalid etag")?;
        }
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn etag_round_trips_through_its_string_form() {
        let hash = ContentHash::of(b"pool config v1");
        let parsed: ContentHash = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn different_bodies_hash_differently() {
        assert_ne!(ContentHash::of(b"a"), ContentHash::of(b"b"));
    }

    proptest! {
        #[test]
        fn any_body_round_trips(body in proptest::collection::vec(any::<u8>(), 0..512)) {
            let hash = ContentHash::of(&body);
            let parsed: ContentHash = hash.to_string().parse().unwrap();
            prop_assert_eq!(hash, parsed);
        }

        #[test]
        fn malformed_etag_strings_never_panic(s in ".{0,80}") {
            let _ = s.parse::<ContentHash>();
        }
    }
}
