use serde_json::Value;
use tracing::warn;

/// Serialize an embedding to the JSON number array stored with each fragment
#[inline]
pub fn encode_embedding(embedding: &[f32]) -> String {
    serde_json::to_string(embedding).unwrap_or_else(|_| "[]".to_string())
}

/// Parse a stored embedding. Entries that are not numbers are skipped and
/// anything that is not a JSON array decodes to an empty vector.
#[inline]
pub fn decode_embedding(json: &str) -> Vec<f32> {
    if json.trim().is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Value>(json) {
        Ok(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_f64)
            .map(|v| v as f32)
            .collect(),
        Ok(_) => {
            warn!("Stored embedding is not an array");
            Vec::new()
        }
        Err(e) => {
            warn!("Failed to decode stored embedding: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_as_json_array() {
        assert_eq!(encode_embedding(&[0.5, -1.0]), "[0.5,-1.0]");
        assert_eq!(encode_embedding(&[]), "[]");
    }

    #[test]
    fn decode_is_lenient() {
        assert_eq!(decode_embedding("[0.5, -1, 2.25]"), vec![0.5, -1.0, 2.25]);
        assert_eq!(decode_embedding("[1, \"x\", null, 3]"), vec![1.0, 3.0]);
        assert!(decode_embedding("").is_empty());
        assert!(decode_embedding("not json").is_empty());
        assert!(decode_embedding("{\"a\": 1}").is_empty());
    }

    #[test]
    fn stored_vector_survives_storage() {
        let vector = vec![0.125, 0.25, 0.75];
        assert_eq!(decode_embedding(&encode_embedding(&vector)), vector);
    }
}
