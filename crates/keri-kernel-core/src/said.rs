//! Self-addressing identifiers.
//!
//! A SAID is derived by filling the digest field(s) of a body with a
//! placeholder of exactly the final qb64 length, hashing the canonical bytes
//! with Blake3-256 and writing the qb64 digest back into the same field(s).
//! Because the placeholder and the digest have the same length, the version
//! string size computed before hashing is also the size of the final body.

use serde_json::Value;

use crate::canonical::{canonical_json, sizeify};
use crate::cesr::Code;
use crate::crypto::Blake3Hash;
use crate::error::{CoreError, ValidationError};
use crate::types::Said;

/// Character used to fill digest fields while hashing.
pub const PLACEHOLDER_CHAR: char = '#';

/// The placeholder: one `#` per character of a qb64 Blake3-256 digest.
pub fn placeholder() -> String {
    PLACEHOLDER_CHAR
        .to_string()
        .repeat(Code::Blake3_256.full_size())
}

/// Compute the SAID of a body without modifying it.
///
/// The body is hashed as-is apart from the placeholder substitution; the
/// version string is not re-sizeified.
pub fn compute(body: &Value, labels: &[&str]) -> Result<Said, CoreError> {
    let mut copy = body.clone();
    fill(&mut copy, labels, &placeholder())?;
    let bytes = canonical_json(&copy)?;
    Ok(Said::from_digest(&Blake3Hash::hash(&bytes)))
}

/// Derive the SAID of a body and write it into `label`.
pub fn derive(body: &mut Value, label: &str) -> Result<Said, CoreError> {
    derive_many(body, &[label])
}

/// Derive a SAID shared by several fields (e.g. `d` and `i` of an inception).
///
/// If the body carries a version string `v`, its size is filled in before
/// hashing.
pub fn derive_many(body: &mut Value, labels: &[&str]) -> Result<Said, CoreError> {
    if labels.is_empty() {
        return Err(CoreError::MalformedInput("no digest field given".into()));
    }

    fill(body, labels, &placeholder())?;
    if body.get("v").is_some() {
        sizeify(body)?;
    }

    let bytes = canonical_json(body)?;
    let said = Said::from_digest(&Blake3Hash::hash(&bytes));
    fill(body, labels, said.as_str())?;
    Ok(said)
}

/// True if the SAID in `label` matches the body.
pub fn verify(body: &Value, label: &str) -> bool {
    check(body, &[label]).is_ok()
}

/// True if every field in `labels` carries the body's SAID.
pub fn verify_many(body: &Value, labels: &[&str]) -> bool {
    check(body, labels).is_ok()
}

/// Check the claimed SAID of a body, reporting claimed vs computed on mismatch.
pub fn check(body: &Value, labels: &[&str]) -> Result<Said, ValidationError> {
    let first = labels
        .first()
        .ok_or_else(|| ValidationError::MalformedInput("no digest field given".into()))?;
    let claimed = claimed_said(body, first)?;

    for label in &labels[1..] {
        let other = claimed_said(body, label)?;
        if other != claimed {
            return Err(ValidationError::SaidMismatch {
                claimed: other,
                computed: claimed,
            });
        }
    }

    let computed = compute(body, labels)?;
    if computed != claimed {
        return Err(ValidationError::SaidMismatch { claimed, computed });
    }
    Ok(computed)
}

fn claimed_said(body: &Value, label: &str) -> Result<Said, ValidationError> {
    let text = body
        .get(label)
        .ok_or_else(|| CoreError::MissingField(label.to_string()))?
        .as_str()
        .ok_or_else(|| CoreError::invalid(label, "expected a string"))?;
    Ok(Said::parse(text)?)
}

fn fill(body: &mut Value, labels: &[&str], text: &str) -> Result<(), CoreError> {
    let obj = body
        .as_object_mut()
        .ok_or_else(|| CoreError::MalformedInput("body is not an object".into()))?;
    for label in labels {
        obj.insert((*label).to_string(), Value::String(text.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::version_of;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "v": "KERI10JSON000000_",
            "t": "ixn",
            "d": "",
            "i": "EBfdlu8R27Fbx-ehrqwImnK-8Cm79sqbAQ4MmvEAYqao",
            "s": "1",
            "a": []
        })
    }

    #[test]
    fn test_placeholder_length_matches_digest() {
        let said = Said::from_digest(&Blake3Hash::hash(b"x"));
        assert_eq!(placeholder().len(), said.as_str().len());
        assert_eq!(placeholder().len(), 44);
    }

    #[test]
    fn test_derive_then_verify() {
        let mut body = sample();
        let said = derive(&mut body, "d").unwrap();
        assert_eq!(body["d"], json!(said.as_str()));
        assert!(verify(&body, "d"));
    }

    #[test]
    fn test_derive_sizeifies_version() {
        let mut body = sample();
        derive(&mut body, "d").unwrap();
        let size = canonical_json(&body).unwrap().len();
        assert_eq!(version_of(&body).unwrap().size, size);
    }

    #[test]
    fn test_derive_is_deterministic() {
        let mut a = sample();
        let mut b = sample();
        assert_eq!(derive(&mut a, "d").unwrap(), derive(&mut b, "d").unwrap());
    }

    #[test]
    fn test_mutation_fails_verify() {
        let mut body = sample();
        derive(&mut body, "d").unwrap();
        body["s"] = json!("2");
        assert!(!verify(&body, "d"));
    }

    #[test]
    fn test_tampered_version_fails_verify() {
        let mut body = sample();
        derive(&mut body, "d").unwrap();
        body["v"] = json!("KERI10JSON000001_");
        assert!(!verify(&body, "d"));
    }

    #[test]
    fn test_check_reports_claimed_and_computed() {
        let mut body = sample();
        let said = derive(&mut body, "d").unwrap();
        body["a"] = json!([{"x": 1}]);
        match check(&body, &["d"]) {
            Err(ValidationError::SaidMismatch { claimed, computed }) => {
                assert_eq!(claimed, said);
                assert_ne!(computed, said);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_derive_many_sets_all_labels() {
        let mut body = json!({"v": "KERI10JSON000000_", "t": "icp", "d": "", "i": "", "s": "0"});
        let said = derive_many(&mut body, &["d", "i"]).unwrap();
        assert_eq!(body["d"], body["i"]);
        assert_eq!(body["i"], json!(said.as_str()));
        assert!(verify_many(&body, &["d", "i"]));
        // Checking only `d` treats `i` as ordinary content.
        assert!(!verify(&body, "d"));
    }

    #[test]
    fn test_missing_or_garbage_digest() {
        let body = json!({"t": "ixn"});
        assert!(!verify(&body, "d"));
        let body = json!({"t": "ixn", "d": "not-a-said"});
        assert!(matches!(
            check(&body, &["d"]),
            Err(ValidationError::MalformedInput(_))
        ));
    }
}
