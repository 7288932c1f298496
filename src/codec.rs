use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::packet::{format_mem_address, Body, Header};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty payload string")]
    Empty,
    #[error("malformed payload token '{token}' at position {pos}")]
    MalformedToken { pos: usize, token: String },
}

/// A record shape the store can persist. Key fields are extracted into
/// their own columns so collections can be filtered without parsing JSON.
pub trait Document: Serialize {
    fn board_id(&self) -> &str;
    fn mem_address(&self) -> Option<&str>;
}

/// Persisted form of a header packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderDoc {
    pub header_type: String,
    #[serde(rename = "CRC")]
    pub crc: u32,
    #[serde(rename = "TTL")]
    pub ttl: u32,
    pub board_id: String,
    pub creation_time: Timestamp,
}

/// Persisted form of a body packet. `data` holds the payload as comma
/// separated decimal bytes to keep stored documents human readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyDoc {
    pub body_type: String,
    #[serde(rename = "CRC")]
    pub crc: u32,
    pub board_id: String,
    pub creation_time: Timestamp,
    pub mem_address: String,
    pub data: String,
}

impl Document for HeaderDoc {
    fn board_id(&self) -> &str {
        &self.board_id
    }
    fn mem_address(&self) -> Option<&str> {
        None
    }
}

impl Document for BodyDoc {
    fn board_id(&self) -> &str {
        &self.board_id
    }
    fn mem_address(&self) -> Option<&str> {
        Some(&self.mem_address)
    }
}

pub fn header_to_doc(header: &Header) -> HeaderDoc {
    HeaderDoc {
        header_type: header.kind.name().to_string(),
        crc: header.crc,
        ttl: header.ttl,
        board_id: header.board.to_string(),
        creation_time: header.created,
    }
}

pub fn body_to_doc(body: &Body) -> BodyDoc {
    BodyDoc {
        body_type: body.kind.name().to_string(),
        crc: body.crc,
        board_id: body.board.to_string(),
        creation_time: body.created,
        mem_address: format_mem_address(body.mem_address),
        data: encode_payload(&body.data),
    }
}

/// Every payload byte as its decimal value, in order, single comma
/// between tokens and no trailing comma
pub fn encode_payload(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Exact inverse of [`encode_payload`]. Any token that is not an
/// unsigned byte fails the whole decode.
pub fn decode_payload(s: &str) -> Result<Vec<u8>, CodecError> {
    if s.is_empty() {
        return Err(CodecError::Empty);
    }
    s.split(',')
        .enumerate()
        .map(|(pos, token)| {
            token.parse::<u8>().map_err(|_| CodecError::MalformedToken {
                pos,
                token: token.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::{BoardId, Body, BodyType, Header, HeaderType, PAYLOAD_LEN};

    fn body(data: [u8; PAYLOAD_LEN]) -> Body {
        Body {
            kind: BodyType::Memory,
            crc: 0xCAFE,
            board: BoardId::new(0x1, 0x2, 0x3),
            mem_address: 0x10,
            created: Timestamp::UNIX_EPOCH,
            data,
        }
    }

    #[test]
    fn test_encode_payload() {
        assert_eq!(encode_payload(&[0, 1, 2]), "0,1,2");
        assert_eq!(encode_payload(&[255]), "255");
        assert_eq!(encode_payload(&[]), "");
    }

    #[test]
    fn test_decode_payload() {
        assert_eq!(decode_payload("0,1,2").unwrap(), vec![0, 1, 2]);
        assert_eq!(decode_payload("255").unwrap(), vec![255]);

        assert_eq!(decode_payload("").unwrap_err(), CodecError::Empty);
        assert_eq!(
            decode_payload("12,x,3").unwrap_err(),
            CodecError::MalformedToken {
                pos: 1,
                token: "x".to_string()
            }
        );
        assert_eq!(
            decode_payload("300").unwrap_err(),
            CodecError::MalformedToken {
                pos: 0,
                token: "300".to_string()
            }
        );
        // a trailing comma produces an empty final token, which is malformed
        assert!(decode_payload("1,2,").is_err());
    }

    #[test]
    fn test_payload_round_trip() {
        let mut data = [0u8; PAYLOAD_LEN];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 256) as u8;
        }
        assert_eq!(decode_payload(&encode_payload(&data)).unwrap(), data);
    }

    #[test]
    fn test_body_to_doc() {
        let mut data = [0u8; PAYLOAD_LEN];
        data[0] = 7;
        data[PAYLOAD_LEN - 1] = 42;
        let doc = body_to_doc(&body(data));

        assert_eq!(doc.body_type, "MEMORY");
        assert_eq!(doc.crc, 0xCAFE);
        assert_eq!(doc.board_id, "0x000000010000000200000003");
        assert_eq!(doc.mem_address, "0x00000010");

        // exactly one token per payload byte, values not indices
        let tokens: Vec<&str> = doc.data.split(',').collect();
        assert_eq!(tokens.len(), PAYLOAD_LEN);
        assert_eq!(tokens[0], "7");
        assert_eq!(tokens[1], "0");
        assert_eq!(tokens[PAYLOAD_LEN - 1], "42");

        assert_eq!(decode_payload(&doc.data).unwrap(), data);
    }

    #[test]
    fn test_header_to_doc() {
        let header = Header {
            kind: HeaderType::Ping,
            crc: 9,
            ttl: 3,
            board: BoardId::new(0, 0, 0xB0A7),
            created: Timestamp::UNIX_EPOCH,
        };
        let doc = header_to_doc(&header);
        assert_eq!(doc.header_type, "PING");
        assert_eq!(doc.crc, 9);
        assert_eq!(doc.ttl, 3);
        assert_eq!(doc.board_id, "0x00000000000000000000B0A7");
    }

    #[test]
    fn test_doc_json_field_names() {
        let doc = body_to_doc(&body([0u8; PAYLOAD_LEN]));
        let json = serde_json::to_value(&doc).unwrap();
        for field in [
            "body_type",
            "CRC",
            "board_id",
            "creation_time",
            "mem_address",
            "data",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
    }
}
