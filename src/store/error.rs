use thiserror::Error;

use crate::codec::CodecError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("reference already captured for board {board_id} address {mem_address}")]
    DuplicateReference {
        board_id: String,
        mem_address: String,
    },
    #[error("no reference for board {board_id} address {mem_address}")]
    NotFound {
        board_id: String,
        mem_address: String,
    },
    #[error("invalid collection name '{0}'")]
    InvalidCollection(String),
    #[error("malformed document {id}: {source}")]
    MalformedDocument { id: i64, source: CodecError },
    #[error("store unavailable: {0}")]
    Unavailable(#[from] tokio_rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
