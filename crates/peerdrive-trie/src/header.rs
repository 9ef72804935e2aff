//! The trie header block.

use prost::Message;

use crate::error::TrieError;

/// Type tag written into every header.
pub(crate) const TRIE_TYPE: &str = "peerdrive/trie";

/// Header record stored at block 0 of the metadata feed. The `metadata`
/// field carries the content feed's public key (raw bytes).
#[derive(Clone, PartialEq, Message)]
pub(crate) struct Header {
    #[prost(string, required, tag = "1")]
    pub r#type: String,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub metadata: Option<Vec<u8>>,
}

pub(crate) fn encode_header(metadata: Option<&[u8]>) -> Vec<u8> {
    Header {
        r#type: TRIE_TYPE.to_string(),
        metadata: metadata.map(<[u8]>::to_vec),
    }
    .encode_to_vec()
}

pub(crate) fn decode_header(blob: &[u8]) -> Result<Header, TrieError> {
    let header = Header::decode(blob).map_err(|e| TrieError::HeaderDecode { message: e.to_string() })?;
    if header.r#type != TRIE_TYPE {
        return Err(TrieError::HeaderDecode {
            message: format!("unexpected type tag {:?}", header.r#type),
        });
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let blob = encode_header(Some(&[9u8; 32]));
        let header = decode_header(&blob).unwrap();
        assert_eq!(header.metadata.as_deref(), Some(&[9u8; 32][..]));
    }

    #[test]
    fn wrong_type_tag_is_rejected() {
        let blob = Header {
            r#type: "something/else".into(),
            metadata: None,
        }
        .encode_to_vec();
        assert!(decode_header(&blob).is_err());
    }
}
