//! Stored-vector decoding and similarity scoring.
//!
//! The corpus stores embeddings as an opaque column that has accumulated
//! several shapes over time: a native JSON numeric array, a JSON-encoded
//! string containing such an array, and (from a bad historical write path)
//! a stringified array nested one level too deep. Everything outside this
//! module only ever sees a decoded `Vec<f32>`.

use serde_json::Value;
use thiserror::Error;

/// Errors raised while decoding a stored vector. All variants are
/// per-document and non-fatal to a scan.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Decoded form contained no elements
    #[error("stored vector is empty")]
    EmptyVector,

    /// Value is not a numeric array (wrong JSON type, or non-numeric
    /// elements)
    #[error("stored vector has wrong type: {0}")]
    TypeMismatch(&'static str),

    /// String form did not parse as JSON
    #[error("stored vector failed to parse: {0}")]
    ParseFailure(String),
}

/// Vectors handed to the scorer did not have the same length.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("vector dimension mismatch: {left} vs {right}")]
pub struct DimensionMismatch {
    /// Length of the first vector
    pub left: usize,
    /// Length of the second vector
    pub right: usize,
}

/// Decode a stored vector column into a fixed-length float array.
///
/// Accepts either a native numeric array or a JSON-encoded string
/// representation of one. Rejects any value whose decoded form is empty or
/// whose first element is not numeric; the latter guards against the
/// historical storage bug where a stringified array was nested inside
/// another array.
pub fn decode_embedding(raw: &Value) -> Result<Vec<f32>, DecodeError> {
    match raw {
        Value::Array(items) => decode_array(items),
        Value::String(text) => {
            let parsed: Value = serde_json::from_str(text)
                .map_err(|e| DecodeError::ParseFailure(e.to_string()))?;
            match parsed {
                Value::Array(items) => decode_array(&items),
                _ => Err(DecodeError::TypeMismatch("string did not contain an array")),
            }
        }
        Value::Null => Err(DecodeError::EmptyVector),
        _ => Err(DecodeError::TypeMismatch("not an array or string")),
    }
}

fn decode_array(items: &[Value]) -> Result<Vec<f32>, DecodeError> {
    if items.is_empty() {
        return Err(DecodeError::EmptyVector);
    }
    // A string in the first slot means the row holds a nested stringified
    // array, not numbers.
    if !items[0].is_number() {
        return Err(DecodeError::TypeMismatch("first element is not numeric"));
    }
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or(DecodeError::TypeMismatch("non-numeric element"))
        })
        .collect()
}

/// Compute cosine similarity between two vectors.
///
/// Accumulates the dot product and norms in double precision. Returns
/// `Ok(0.0)` when either vector has zero magnitude: a zero vector has no
/// defined direction, but callers need a total ordering, not an error.
///
/// # Errors
/// Returns [`DimensionMismatch`] when the vectors differ in length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    if a.len() != b.len() {
        return Err(DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cosine_identity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-6);

        let b = vec![0.3, -0.7, 0.2];
        assert!((cosine_similarity(&b, &b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).unwrap().abs() < 1e-6);

        let c = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &c).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let err = cosine_similarity(&a, &b).unwrap_err();
        assert_eq!(err, DimensionMismatch { left: 2, right: 3 });
    }

    #[test]
    fn test_cosine_zero_norm_is_zero() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&v, &zero).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero).unwrap(), 0.0);
    }

    #[test]
    fn test_decode_native_array() {
        let raw = json!([0.1, 0.2, 0.3]);
        let decoded = decode_embedding(&raw).unwrap();
        assert_eq!(decoded.len(), 3);
        assert!((decoded[0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_decode_json_string_matches_native() {
        let native = json!([0.5, -0.25, 1.0]);
        let stringified = json!("[0.5, -0.25, 1.0]");
        assert_eq!(
            decode_embedding(&native).unwrap(),
            decode_embedding(&stringified).unwrap()
        );
    }

    #[test]
    fn test_decode_empty_array() {
        assert!(matches!(
            decode_embedding(&json!([])),
            Err(DecodeError::EmptyVector)
        ));
        assert!(matches!(
            decode_embedding(&json!("[]")),
            Err(DecodeError::EmptyVector)
        ));
    }

    #[test]
    fn test_decode_nested_stringified_array() {
        // The bad historical shape: an array whose first element is itself
        // a stringified array.
        let raw = json!(["[0.1, 0.2]"]);
        assert!(matches!(
            decode_embedding(&raw),
            Err(DecodeError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_decode_wrong_types() {
        assert!(matches!(
            decode_embedding(&json!({"vector": [1.0]})),
            Err(DecodeError::TypeMismatch(_))
        ));
        assert!(matches!(
            decode_embedding(&json!(42)),
            Err(DecodeError::TypeMismatch(_))
        ));
        assert!(matches!(
            decode_embedding(&serde_json::Value::Null),
            Err(DecodeError::EmptyVector)
        ));
    }

    #[test]
    fn test_decode_unparsable_string() {
        let raw = json!("not json at all");
        assert!(matches!(
            decode_embedding(&raw),
            Err(DecodeError::ParseFailure(_))
        ));
    }
}
