//! CESR text-domain (qb64) primitives.
//!
//! A qb64 primitive is a derivation code followed by the base64url encoding of
//! the raw bytes. The raw bytes are left-padded with zeros to a multiple of
//! three so the encoding has no trailing pad, and the leading characters that
//! only encode those zero bytes are replaced by the code. The code length
//! always equals the pad length, so the full primitive length is fixed per code.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::CoreError;

/// Derivation codes supported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// Blake3-256 digest.
    Blake3_256,
    /// Ed25519 verification key (transferable).
    Ed25519,
    /// Ed25519 signature.
    Ed25519Sig,
    /// 128-bit random salt.
    Salt128,
}

impl Code {
    /// The code characters.
    pub const fn as_str(self) -> &'static str {
        match self {
            Code::Blake3_256 => "E",
            Code::Ed25519 => "D",
            Code::Ed25519Sig => "0B",
            Code::Salt128 => "0A",
        }
    }

    /// Size of the raw (binary) material.
    pub const fn raw_size(self) -> usize {
        match self {
            Code::Blake3_256 | Code::Ed25519 => 32,
            Code::Ed25519Sig => 64,
            Code::Salt128 => 16,
        }
    }

    /// Size of the full qb64 text.
    pub const fn full_size(self) -> usize {
        let padded = self.raw_size() + pad_size(self.raw_size());
        padded / 3 * 4
    }

    /// Identify the code a qb64 string starts with.
    pub fn from_qb64(qb64: &str) -> Result<Self, CoreError> {
        let mut chars = qb64.chars();
        match chars.next() {
            Some('E') => Ok(Code::Blake3_256),
            Some('D') => Ok(Code::Ed25519),
            Some('0') => match chars.next() {
                Some('B') => Ok(Code::Ed25519Sig),
                Some('A') => Ok(Code::Salt128),
                _ => Err(CoreError::InvalidQb64(format!("unknown code in {qb64}"))),
            },
            _ => Err(CoreError::InvalidQb64(format!("unknown code in {qb64}"))),
        }
    }
}

const fn pad_size(raw_len: usize) -> usize {
    (3 - raw_len % 3) % 3
}

/// Encode raw material under a derivation code.
pub fn encode(code: Code, raw: &[u8]) -> Result<String, CoreError> {
    if raw.len() != code.raw_size() {
        return Err(CoreError::InvalidQb64(format!(
            "code {} expects {} raw bytes, got {}",
            code.as_str(),
            code.raw_size(),
            raw.len()
        )));
    }

    let ps = pad_size(raw.len());
    let mut padded = Vec::with_capacity(ps + raw.len());
    padded.resize(ps, 0u8);
    padded.extend_from_slice(raw);

    let encoded = URL_SAFE_NO_PAD.encode(&padded);
    let code_str = code.as_str();
    Ok(format!("{}{}", code_str, &encoded[code_str.len()..]))
}

/// Decode a qb64 primitive into its code and raw material.
pub fn decode(qb64: &str) -> Result<(Code, Vec<u8>), CoreError> {
    let code = Code::from_qb64(qb64)?;
    if qb64.len() != code.full_size() {
        return Err(CoreError::InvalidQb64(format!(
            "code {} expects {} characters, got {}",
            code.as_str(),
            code.full_size(),
            qb64.len()
        )));
    }

    let code_len = code.as_str().len();
    let mut text = "A".repeat(code_len);
    text.push_str(&qb64[code_len..]);

    let padded = URL_SAFE_NO_PAD
        .decode(text.as_bytes())
        .map_err(|e| CoreError::InvalidQb64(e.to_string()))?;

    let ps = pad_size(code.raw_size());
    if padded.len() != ps + code.raw_size() || padded[..ps].iter().any(|b| *b != 0) {
        return Err(CoreError::InvalidQb64(format!("non-canonical padding in {qb64}")));
    }

    Ok((code, padded[ps..].to_vec()))
}

/// Decode a qb64 primitive, requiring a specific code.
pub fn decode_as(qb64: &str, expected: Code) -> Result<Vec<u8>, CoreError> {
    let (code, raw) = decode(qb64)?;
    if code != expected {
        return Err(CoreError::InvalidQb64(format!(
            "expected code {}, got {}",
            expected.as_str(),
            code.as_str()
        )));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_sizes() {
        assert_eq!(Code::Blake3_256.full_size(), 44);
        assert_eq!(Code::Ed25519.full_size(), 44);
        assert_eq!(Code::Ed25519Sig.full_size(), 88);
        assert_eq!(Code::Salt128.full_size(), 24);
    }

    #[test]
    fn test_encode_prefixes_code() {
        let digest = encode(Code::Blake3_256, &[0xff; 32]).unwrap();
        assert!(digest.starts_with('E'));
        assert_eq!(digest.len(), 44);

        let sig = encode(Code::Ed25519Sig, &[0x01; 64]).unwrap();
        assert!(sig.starts_with("0B"));
        assert_eq!(sig.len(), 88);
    }

    #[test]
    fn test_decode_recovers_raw() {
        let raw: Vec<u8> = (0u8..32).collect();
        let qb64 = encode(Code::Ed25519, &raw).unwrap();
        let (code, decoded) = decode(&qb64).unwrap();
        assert_eq!(code, Code::Ed25519);
        assert_eq!(decoded, raw);
    }

    #[test]
    fn test_zero_key_is_code_then_a() {
        // Raw zeros encode to all 'A' after the code.
        let qb64 = encode(Code::Blake3_256, &[0u8; 32]).unwrap();
        assert_eq!(qb64, format!("E{}", "A".repeat(43)));
    }

    #[test]
    fn test_wrong_raw_length_rejected() {
        assert!(encode(Code::Blake3_256, &[0u8; 31]).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(decode("").is_err());
        assert!(decode("Xabc").is_err());
        assert!(decode("Eshort").is_err());
        // '#' is outside the base64url alphabet
        assert!(decode(&format!("E{}", "#".repeat(43))).is_err());
    }

    #[test]
    fn test_decode_as_checks_code() {
        let qb64 = encode(Code::Ed25519, &[7u8; 32]).unwrap();
        assert!(decode_as(&qb64, Code::Ed25519).is_ok());
        assert!(decode_as(&qb64, Code::Blake3_256).is_err());
    }
}
