//! Fixed-size identifiers and digests

use serde::{Deserialize, Serialize};

macro_rules! id_32 {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Default,
            Serialize,
            Deserialize,
            bitcode::Encode,
            bitcode::Decode,
        )]
        pub struct $name(#[serde(with = "hex_bytes_32")] pub [u8; 32]);

        impl $name {
            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes)?;
                Ok(Self(bytes))
            }

            /// Build from a slice that must be exactly 32 bytes long
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                <[u8; 32]>::try_from(bytes).ok().map(Self)
            }

            /// Short display format (first 4 bytes as hex)
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }
    };
}

id_32!(
    /// Darc ID - SHA-256 of a Darc's fixed fields
    DarcId
);

id_32!(
    /// Key of an instance in the ledger's state trie
    InstanceId
);

id_32!(
    /// Per-instruction replay nonce
    Nonce
);

id_32!(
    /// SHA-256 output
    Digest
);

id_32!(
    /// Hash of a block header
    BlockId
);

impl From<DarcId> for InstanceId {
    /// A Darc instance lives under its base ID
    fn from(id: DarcId) -> Self {
        Self(id.0)
    }
}

/// Serde helper for 32-byte arrays as hex strings
pub mod hex_bytes_32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&s, &mut bytes).map_err(serde::de::Error::custom)?;
        Ok(bytes)
    }
}
