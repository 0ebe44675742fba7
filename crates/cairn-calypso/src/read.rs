//! Read requests and the quorum's reply

use bitcode::{Decode, Encode};
use cairn_core::{Action, Argument, Identity, InstanceId, Point, Signer, POINT_SIZE};

use crate::error::{CalypsoError, Result};

/// Contract id of read instances
pub const CONTRACT_READ: &str = "calypsoRead";

/// Spawn argument carrying the encoded read
pub const ARG_READ: &str = "read";

/// Request to re-encrypt a write for a reader's public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Read {
    /// Instance of the write being read
    pub write: InstanceId,
    pub reader: Identity,
    /// Key the reply is encrypted for
    pub xc: Point,
}

impl Read {
    pub fn new(write: InstanceId, reader: &Signer) -> Self {
        Self {
            write,
            reader: reader.identity(),
            xc: reader.public_point(),
        }
    }

    /// The reply key must belong to the identity making the request
    pub fn validate(&self) -> Result<()> {
        match self.reader.public_key() {
            Some(point) if *point == self.xc => Ok(()),
            Some(_) => Err(CalypsoError::Key(
                "Reader key does not match the requesting identity".to_string(),
            )),
            None => Err(CalypsoError::Key(format!(
                "Reader {} has no public key",
                self.reader
            ))),
        }
    }

    /// Spawn action creating a read instance under the write
    pub fn spawn_action(&self) -> Action {
        Action::Spawn {
            contract_id: CONTRACT_READ.to_string(),
            args: vec![Argument::new(ARG_READ, self.to_bytes())],
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bitcode::encode(&ReadWire {
            write: self.write.0,
            reader: self.reader.to_string(),
            xc: self.xc.to_bytes(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let wire: ReadWire = bitcode::decode(bytes)?;
        Ok(Self {
            write: InstanceId::new(wire.write),
            reader: wire.reader.parse()?,
            xc: Point::from_bytes(&wire.xc)?,
        })
    }
}

#[derive(Encode, Decode)]
struct ReadWire {
    write: [u8; 32],
    reader: String,
    xc: [u8; POINT_SIZE],
}

/// Re-encrypted key returned by the secret-management quorum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptKeyReply {
    /// Chunks of the write, echoed back
    pub cs: Vec<Point>,
    /// Long-term secret applied to `U + Xc`
    pub xhat_enc: Point,
    /// Long-term public key
    pub x: Point,
}

impl DecryptKeyReply {
    pub fn to_bytes(&self) -> Vec<u8> {
        bitcode::encode(&ReplyWire {
            cs: self.cs.iter().map(Point::to_bytes).collect(),
            xhat_enc: self.xhat_enc.to_bytes(),
            x: self.x.to_bytes(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let wire: ReplyWire = bitcode::decode(bytes)?;
        Ok(Self {
            cs: wire
                .cs
                .iter()
                .map(|c| Point::from_bytes(c))
                .collect::<cairn_core::Result<Vec<_>>>()?,
            xhat_enc: Point::from_bytes(&wire.xhat_enc)?,
            x: Point::from_bytes(&wire.x)?,
        })
    }
}

#[derive(Encode, Decode)]
struct ReplyWire {
    cs: Vec<[u8; POINT_SIZE]>,
    xhat_enc: [u8; POINT_SIZE],
    x: [u8; POINT_SIZE],
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::{DarcId, Scalar, SignatureScheme};

    #[test]
    fn test_read_validate() {
        let reader = Signer::generate(SignatureScheme::Schnorr);
        let read = Read::new(InstanceId::new([3; 32]), &reader);
        read.validate().unwrap();

        let mut swapped = read.clone();
        swapped.xc = Point::mul_base(&Scalar::from_u64(9));
        assert!(swapped.validate().is_err());

        let mut darc_reader = read;
        darc_reader.reader = Identity::darc(DarcId::new([1; 32]));
        assert!(darc_reader.validate().is_err());
    }

    #[test]
    fn test_read_bytes_roundtrip() {
        let reader = Signer::generate(SignatureScheme::Ecdsa);
        let read = Read::new(InstanceId::new([3; 32]), &reader);
        assert_eq!(Read::from_bytes(&read.to_bytes()).unwrap(), read);
        assert!(Read::from_bytes(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_spawn_action_carries_read() {
        let reader = Signer::generate(SignatureScheme::Ecdsa);
        let read = Read::new(InstanceId::new([3; 32]), &reader);
        let action = read.spawn_action();
        assert_eq!(action.rule_name(), "spawn:calypsoRead");
        let decoded = Read::from_bytes(action.arg(ARG_READ).unwrap()).unwrap();
        assert_eq!(decoded, read);
    }

    #[test]
    fn test_reply_bytes_roundtrip() {
        let reply = DecryptKeyReply {
            cs: vec![Point::generator(), Point::mul_base(&Scalar::from_u64(2))],
            xhat_enc: Point::mul_base(&Scalar::from_u64(3)),
            x: Point::mul_base(&Scalar::from_u64(4)),
        };
        assert_eq!(DecryptKeyReply::from_bytes(&reply.to_bytes()).unwrap(), reply);
    }
}
