//! Codecs for stored node values

use crate::error::CodecError;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

/// Encode and decode values for the key-value backend
pub trait Codec<T>: Send + Sync {
    /// Encode a value to its stored byte representation
    fn encode(&self, value: &T) -> Result<Bytes, CodecError>;

    /// Decode a value from its stored byte representation
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// DAG-CBOR codec over serde
#[derive(Clone, Copy, Debug, Default)]
pub struct CborCodec;

impl<T> Codec<T> for CborCodec
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn encode(&self, value: &T) -> Result<Bytes, CodecError> {
        serde_ipld_dagcbor::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| CodecError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_ipld_dagcbor::from_slice(bytes)
            .map_err(|e| CodecError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        name: String,
        tags: Vec<u64>,
    }

    #[test]
    fn test_cbor_roundtrip() {
        let value = Sample {
            name: "node".to_string(),
            tags: vec![1, 2, 3],
        };

        let bytes = CborCodec.encode(&value).unwrap();
        let decoded: Sample = CborCodec.decode(&bytes).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: Result<Sample, _> = CborCodec.decode(b"\xff\xff\xff");
        assert!(matches!(result, Err(CodecError::Deserialization(_))));
    }
}
