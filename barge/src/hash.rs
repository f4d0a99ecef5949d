//! File and archive hashes.

use displaydoc::Display;
use serde::{de, ser, Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BargeResult;

/// The encoding a hash was written in.
///
/// Hashes appear in both hexadecimal and Nix-specific Base32 forms in
/// the wild. The encoding is remembered so a parsed hash can be
/// reproduced character-for-character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Lowercase hexadecimal.
    Base16,

    /// Nix-specific Base32.
    Base32,
}

/// A typed file hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileHash {
    /// An SHA-256 hash.
    Sha256(Encoding, [u8; 32]),
}

/// A hashing error.
#[derive(Debug, Display)]
pub enum Error {
    /// The string lacks a colon separator.
    NoColonSeparator,

    /// Hash algorithm {0} is not supported.
    UnknownHashAlgorithm(String),

    /// Invalid base16 hash: {0}
    InvalidBase16Hash(hex::FromHexError),

    /// Invalid base32 hash.
    InvalidBase32Hash,

    /// Invalid length for {typ} string: Must be either {base16_len} (hexadecimal) or {base32_len} (base32), got {actual}.
    InvalidHashStringLength {
        typ: &'static str,
        base16_len: usize,
        base32_len: usize,
        actual: usize,
    },
}

impl FileHash {
    /// Convenience function to generate a SHA-256 hash from a slice.
    ///
    /// The result formats in Base32, the encoding caches use for NAR
    /// hashes.
    pub fn sha256_from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self::Sha256(Encoding::Base32, hasher.finalize().into())
    }

    /// Parses a typed representation of a hash, like `sha256:<body>`.
    pub fn from_typed(s: &str) -> BargeResult<Self> {
        let colon = s.find(':').ok_or(Error::NoColonSeparator)?;

        let (typ, rest) = s.split_at(colon);
        Self::from_parts(typ, &rest[1..])
    }

    /// Parses a hash from an algorithm tag and an encoded body.
    ///
    /// The encoding of the body is determined from its length.
    pub fn from_parts(algorithm: &str, body: &str) -> BargeResult<Self> {
        match algorithm {
            "sha256" => {
                let (encoding, v) = decode_hash(body, "SHA-256", 32)?;
                Ok(Self::Sha256(encoding, v.try_into().unwrap()))
            }
            _ => Err(Error::UnknownHashAlgorithm(algorithm.to_owned()).into()),
        }
    }

    /// Returns the hash in its original encoding, with the hash type
    /// prepended.
    pub fn to_typed(&self) -> String {
        format!("{}:{}", self.algorithm(), self.body())
    }

    /// Returns the encoded body without the hash type.
    pub fn body(&self) -> String {
        match self {
            Self::Sha256(Encoding::Base16, d) => hex::encode(d),
            Self::Sha256(Encoding::Base32, d) => nix_base32::to_nix_base32(d),
        }
    }

    /// Returns the body in Base32 regardless of the original encoding.
    pub fn body_base32(&self) -> String {
        match self {
            Self::Sha256(_, d) => nix_base32::to_nix_base32(d),
        }
    }

    /// Returns the raw digest.
    pub fn digest(&self) -> &[u8] {
        match self {
            Self::Sha256(_, d) => d,
        }
    }

    /// Compares the digests of two hashes, ignoring their encodings.
    pub fn same_digest(&self, other: &Self) -> bool {
        self.digest() == other.digest()
    }

    fn algorithm(&self) -> &'static str {
        match self {
            Self::Sha256(..) => "sha256",
        }
    }
}

impl std::fmt::Display for FileHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_typed())
    }
}

impl<'de> Deserialize<'de> for FileHash {
    /// Deserializes a typed hash string.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        use de::Error;

        String::deserialize(deserializer)
            .and_then(|s| Self::from_typed(&s).map_err(|e| Error::custom(e.to_string())))
    }
}

impl Serialize for FileHash {
    /// Serializes a hash into a typed hash string in its original encoding.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        serializer.serialize_str(&self.to_typed())
    }
}

/// Decodes a base16 or base32 encoded hash containing a specified number of bytes.
fn decode_hash(s: &str, typ: &'static str, expected_bytes: usize) -> BargeResult<(Encoding, Vec<u8>)> {
    let base16_len = expected_bytes * 2;
    let base32_len = (expected_bytes * 8 - 1) / 5 + 1;

    let (encoding, v) = if s.len() == base16_len {
        (Encoding::Base16, hex::decode(s).map_err(Error::InvalidBase16Hash)?)
    } else if s.len() == base32_len {
        (
            Encoding::Base32,
            nix_base32::from_nix_base32(s).ok_or(Error::InvalidBase32Hash)?,
        )
    } else {
        return Err(Error::InvalidHashStringLength {
            typ,
            base16_len,
            base32_len,
            actual: s.len(),
        }
        .into());
    };

    assert!(v.len() == expected_bytes);

    Ok((encoding, v))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::BargeError;

    #[test]
    fn test_basic() {
        let hash = FileHash::sha256_from_bytes(b"hello world");

        let expected_base32 = "sha256:1sfdxziarxw8j3p80lvswgpq9i7smdyxmmsj5sjhhgjdjfwjfkdr";
        assert_eq!(expected_base32, hash.to_typed());
    }

    #[test]
    fn test_from_typed() {
        let base16 = "sha256:baeabdb75c223d171800c17b05c5e7e8e9980723a90eb6ffcc632a305afc5a42";
        let base32 = "sha256:0hjszid30ak3rkzvc3m94c3risg8wz2hayy100c1fg92bjvvvsms";

        let h16 = FileHash::from_typed(base16).unwrap();
        let h32 = FileHash::from_typed(base32).unwrap();

        // Same digest, but each remembers how it was written.
        assert!(h16.same_digest(&h32));
        assert_eq!(base16, h16.to_typed());
        assert_eq!(base32, h32.to_typed());

        assert!(matches!(
            FileHash::from_typed("sha256"),
            Err(BargeError::HashError(Error::NoColonSeparator))
        ));

        assert!(matches!(
            FileHash::from_typed("sha256:"),
            Err(BargeError::HashError(Error::InvalidHashStringLength { .. }))
        ));

        assert!(matches!(
            FileHash::from_typed("sha256:eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee"),
            Err(BargeError::HashError(Error::InvalidBase32Hash))
        ));

        assert!(matches!(
            FileHash::from_typed(
                "sha256:gggggggggggggggggggggggggggggggggggggggggggggggggggggggggggggggg"
            ),
            Err(BargeError::HashError(Error::InvalidBase16Hash(_)))
        ));

        assert!(matches!(
            FileHash::from_typed("md5:invalid"),
            Err(BargeError::HashError(Error::UnknownHashAlgorithm(alg))) if alg == "md5"
        ));
    }

    #[test]
    fn test_round_trip() {
        for s in [
            "sha256:0hjszid30ak3rkzvc3m94c3risg8wz2hayy100c1fg92bjvvvsms",
            "sha256:baeabdb75c223d171800c17b05c5e7e8e9980723a90eb6ffcc632a305afc5a42",
        ] {
            assert_eq!(s, FileHash::from_typed(s).unwrap().to_typed());
        }
    }
}
