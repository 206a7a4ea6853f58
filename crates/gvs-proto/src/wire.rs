// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Packet framing and CBOR helpers.
//!
//! Packet layout:
//!
//! ``MAGIC(4) || VERSION(2) || FLAGS(2) || LENGTH(4) || PAYLOAD || CHECKSUM(32)``
//!
//! * PAYLOAD is a CBOR `OpEnvelope`
//! * CHECKSUM = blake3-256 over HEADER (first 12 bytes) || PAYLOAD

use blake3::Hasher;
use ciborium::value::Value;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::{ClientTextPayload, Message, OpEnvelope, SceneUpdatePayload};

/// Protocol magic constant "GVS!".
pub const MAGIC: [u8; 4] = *b"GVS!";
/// Wire protocol version (big-endian u16).
pub const VERSION: u16 = 0x0001;
/// Reserved flags (zero for v1).
pub const FLAGS: u16 = 0x0000;
/// Header length in bytes.
pub const HEADER_BYTES: usize = 12;
/// Checksum length in bytes.
pub const CHECKSUM_BYTES: usize = 32;
/// Largest accepted payload.
pub const MAX_PAYLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Framing or payload decoding failure.
#[derive(Debug, Error)]
pub enum WireError {
    /// Fewer bytes than the header or declared length require.
    #[error("incomplete packet: need {needed} bytes, have {have}")]
    Incomplete {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        have: usize,
    },
    /// Magic prefix mismatch.
    #[error("bad magic")]
    BadMagic,
    /// Unknown protocol version.
    #[error("unsupported version {0:#06x}")]
    UnsupportedVersion(u16),
    /// Declared payload exceeds [`MAX_PAYLOAD_BYTES`].
    #[error("payload too large: {0} bytes")]
    TooLarge(usize),
    /// Checksum did not match header || payload.
    #[error("checksum mismatch")]
    ChecksumMismatch,
    /// Envelope carried an op this version does not know.
    #[error("unknown op {0}")]
    UnknownOp(String),
    /// CBOR encoding failed.
    #[error("cbor encode: {0}")]
    Encode(String),
    /// CBOR decoding failed.
    #[error("cbor decode: {0}")]
    Decode(String),
}

/// Encode to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| WireError::Encode(e.to_string()))?;
    Ok(out)
}

/// Decode from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    ciborium::de::from_reader(bytes).map_err(|e| WireError::Decode(e.to_string()))
}

/// A full packet (header + payload + checksum).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Raw header.
    pub header: [u8; HEADER_BYTES],
    /// CBOR payload bytes.
    pub payload: Vec<u8>,
    /// blake3 checksum over header||payload.
    pub checksum: [u8; CHECKSUM_BYTES],
}

impl Packet {
    /// Build a packet around a CBOR payload.
    pub fn from_payload(payload: Vec<u8>) -> Result<Self, WireError> {
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len as usize <= MAX_PAYLOAD_BYTES)
            .ok_or(WireError::TooLarge(payload.len()))?;
        let mut header = [0u8; HEADER_BYTES];
        header[0..4].copy_from_slice(&MAGIC);
        header[4..6].copy_from_slice(&VERSION.to_be_bytes());
        header[6..8].copy_from_slice(&FLAGS.to_be_bytes());
        header[8..12].copy_from_slice(&len.to_be_bytes());

        let checksum = checksum(&header, &payload);
        Ok(Packet {
            header,
            payload,
            checksum,
        })
    }

    /// Concatenate header, payload and checksum.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_BYTES + self.payload.len() + CHECKSUM_BYTES);
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.checksum);
        out
    }
}

fn checksum(header: &[u8], payload: &[u8]) -> [u8; CHECKSUM_BYTES] {
    let mut hasher = Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    *hasher.finalize().as_bytes()
}

/// Total length of the packet at the start of `bytes`, or `None` while the
/// header is still incomplete. Validates magic, version and size limit so a
/// stream reader can reject garbage before buffering the body.
pub fn frame_len(bytes: &[u8]) -> Result<Option<usize>, WireError> {
    if bytes.len() < HEADER_BYTES {
        return Ok(None);
    }
    if bytes[0..4] != MAGIC {
        return Err(WireError::BadMagic);
    }
    let version = u16::from_be_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }
    let len = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    if len > MAX_PAYLOAD_BYTES {
        return Err(WireError::TooLarge(len));
    }
    Ok(Some(HEADER_BYTES + len + CHECKSUM_BYTES))
}

/// Encode an envelope into packet bytes.
pub fn encode_envelope<P: Serialize>(env: &OpEnvelope<P>) -> Result<Vec<u8>, WireError> {
    let payload = to_cbor(env)?;
    Ok(Packet::from_payload(payload)?.into_bytes())
}

/// Decode the packet at the start of `bytes`, returning the envelope and the
/// number of bytes consumed.
pub fn decode_envelope<P: DeserializeOwned>(
    bytes: &[u8],
) -> Result<(OpEnvelope<P>, usize), WireError> {
    let total = frame_len(bytes)?.ok_or(WireError::Incomplete {
        needed: HEADER_BYTES,
        have: bytes.len(),
    })?;
    if bytes.len() < total {
        return Err(WireError::Incomplete {
            needed: total,
            have: bytes.len(),
        });
    }
    let header = &bytes[..HEADER_BYTES];
    let payload = &bytes[HEADER_BYTES..total - CHECKSUM_BYTES];
    let sum = &bytes[total - CHECKSUM_BYTES..total];
    if checksum(header, payload) != sum {
        return Err(WireError::ChecksumMismatch);
    }
    let env: OpEnvelope<P> = from_cbor(payload)?;
    Ok((env, total))
}

/// Encode a `Message` into a packet with the provided logical timestamp.
pub fn encode_message(msg: &Message, ts: u64) -> Result<Vec<u8>, WireError> {
    let payload = match msg {
        Message::ClientText(p) => Value::serialized(p),
        Message::SceneUpdate(p) => Value::serialized(p),
    }
    .map_err(|e| WireError::Encode(e.to_string()))?;
    encode_envelope(&OpEnvelope {
        op: msg.op_name().to_string(),
        ts,
        payload,
    })
}

/// Decode bytes into (Message, ts, bytes_consumed).
pub fn decode_message(bytes: &[u8]) -> Result<(Message, u64, usize), WireError> {
    let (env, used) = decode_envelope::<Value>(bytes)?;
    let msg = match env.op.as_str() {
        "client_text" => Message::ClientText(deserialize_payload::<ClientTextPayload>(
            &env.payload,
        )?),
        "scene_update" => Message::SceneUpdate(deserialize_payload::<SceneUpdatePayload>(
            &env.payload,
        )?),
        other => return Err(WireError::UnknownOp(other.to_string())),
    };
    Ok((msg, env.ts, used))
}

fn deserialize_payload<T: DeserializeOwned>(value: &Value) -> Result<T, WireError> {
    value
        .deserialized()
        .map_err(|e| WireError::Decode(e.to_string()))
}

// --- Unit tests -----------------------------------------------------------
