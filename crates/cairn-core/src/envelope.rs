//! Integrity envelope for command payloads.
//!
//! Layout: `<hex digest>;HASH;<payload>`. The digest is a lowercase
//! hex-encoded BLAKE3 hash of the payload bytes. The receiver recomputes it
//! and refuses to hand out the payload on any mismatch, so corrupted or
//! truncated commands are never executed.

/// Separates the hex digest from the payload.
pub const HASH_DELIMITER: &[u8] = b";HASH;";

/// Length of the hex-encoded digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// BLAKE3 digest of a payload.
pub fn digest(payload: &[u8]) -> [u8; 32] {
    *blake3::hash(payload).as_bytes()
}

/// Prepend the hex digest of `payload` and the delimiter.
pub fn wrap(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(DIGEST_HEX_LEN + HASH_DELIMITER.len() + payload.len());
    framed.extend_from_slice(hex::encode(digest(payload)).as_bytes());
    framed.extend_from_slice(HASH_DELIMITER);
    framed.extend_from_slice(payload);
    framed
}

/// Verify an envelope and return the embedded payload.
pub fn unwrap(framed: &[u8]) -> Result<&[u8], EnvelopeError> {
    let split = framed
        .windows(HASH_DELIMITER.len())
        .position(|w| w == HASH_DELIMITER)
        .ok_or(EnvelopeError::MissingDelimiter)?;

    let (hex_digest, rest) = framed.split_at(split);
    let payload = &rest[HASH_DELIMITER.len()..];

    // Uppercase hex would decode to the same bytes; only the canonical
    // lowercase form is accepted so any altered digest byte is detected.
    if hex_digest.len() != DIGEST_HEX_LEN
        || !hex_digest
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
    {
        return Err(EnvelopeError::MalformedDigest);
    }

    let mut carried = [0u8; 32];
    hex::decode_to_slice(hex_digest, &mut carried).map_err(|_| EnvelopeError::MalformedDigest)?;

    // blake3::Hash equality is constant-time.
    let computed = blake3::hash(payload);
    if computed != blake3::Hash::from(carried) {
        return Err(EnvelopeError::DigestMismatch {
            carried: hex::encode(carried),
            computed: computed.to_hex().to_string(),
        });
    }

    Ok(payload)
}

/// Envelope verification failures. All of them mean "do not dispatch".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope has no digest delimiter")]
    MissingDelimiter,

    #[error("envelope digest is not {} lowercase hex characters", DIGEST_HEX_LEN)]
    MalformedDigest,

    #[error("digest mismatch: carried {carried}, computed {computed}")]
    DigestMismatch { carried: String, computed: String },
}
