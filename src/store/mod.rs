use rusqlite::{params, ErrorCode};
use tokio_rusqlite::Connection;
use tracing::warn;

use crate::codec::{self, BodyDoc, CodecError, Document};
use crate::config::StoreConfig;

pub mod error;

pub use error::StoreError;

/// Fixed collection holding one baseline document per (board, address)
pub const REFERENCES: &str = "references";

/// Handle to the document store. Cheap to share behind an Arc, every
/// operation is a single round trip to the database task.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (or creates) the database file and the reference collection.
    /// The unique index is what holds the at-most-one-reference invariant,
    /// a caller-side existence check is advisory only.
    pub async fn connect(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let conn = Connection::open(cfg.file()).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            Ok(conn.execute(
                "CREATE TABLE IF NOT EXISTS \"references\" (
                    id          INTEGER PRIMARY KEY,
                    board_id    TEXT NOT NULL,
                    mem_address TEXT NOT NULL,
                    doc         TEXT NOT NULL,
                    UNIQUE (board_id, mem_address)
                )",
                (),
            )?)
        })
        .await?;
        Ok(Self { conn })
    }

    /// True if a baseline was already captured for this board and address.
    /// Both arguments are canonical hex strings, matched exactly.
    pub async fn reference_exists(
        &self,
        board_id: &str,
        mem_address: &str,
    ) -> Result<bool, StoreError> {
        let board_id = board_id.to_string();
        let mem_address = mem_address.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT EXISTS (
                        SELECT 1 FROM \"references\" WHERE board_id = ?1 AND mem_address = ?2
                    )",
                )?;
                Ok(stmt.query_row(params![board_id, mem_address], |row| row.get::<_, bool>(0))?)
            })
            .await?;
        Ok(exists)
    }

    /// Stores a baseline document. A second insert for the same
    /// (board, address) key fails with `DuplicateReference`, so under
    /// concurrent ingestion exactly one caller wins.
    pub async fn insert_reference(&self, doc: &BodyDoc) -> Result<i64, StoreError> {
        let json = serde_json::to_string(doc)?;
        let board_id = doc.board_id.clone();
        let mem_address = doc.mem_address.clone();

        let res = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO \"references\" (board_id, mem_address, doc) VALUES (?1, ?2, ?3)",
                    params![board_id, mem_address, json],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await;

        match res {
            Ok(id) => Ok(id),
            Err(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateReference {
                    board_id: doc.board_id.clone(),
                    mem_address: doc.mem_address.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Appends a document to the named collection, creating the
    /// collection on first use. No uniqueness constraint, samples for
    /// one key accumulate without limit.
    pub async fn insert_document<D: Document>(
        &self,
        doc: &D,
        collection: &str,
    ) -> Result<i64, StoreError> {
        let table = valid_collection(collection)?;
        if table == REFERENCES {
            // baselines only go through insert_reference
            return Err(StoreError::InvalidCollection(table));
        }

        let json = serde_json::to_string(doc)?;
        let board_id = doc.board_id().to_string();
        let mem_address = doc.mem_address().map(str::to_string);

        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "CREATE TABLE IF NOT EXISTS \"{table}\" (
                            id          INTEGER PRIMARY KEY,
                            board_id    TEXT NOT NULL,
                            mem_address TEXT,
                            doc         TEXT NOT NULL
                        )"
                    ),
                    (),
                )?;
                conn.execute(
                    &format!(
                        "INSERT INTO \"{table}\" (board_id, mem_address, doc) VALUES (?1, ?2, ?3)"
                    ),
                    params![board_id, mem_address, json],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// Decodes the payload of every document in `collection` matching the
    /// key, in query order. A document whose data field fails to decode is
    /// skipped and reported instead of aborting the fetch.
    pub async fn fetch_payloads(
        &self,
        collection: &str,
        board_id: &str,
        mem_address: &str,
    ) -> Result<FetchedPayloads, StoreError> {
        let table = valid_collection(collection)?;
        let board_id = board_id.to_string();
        let mem_address = mem_address.to_string();

        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, doc FROM \"{table}\" WHERE board_id = ?1 AND mem_address = ?2 ORDER BY id"
                ))?;
                let rows = stmt
                    .query_map(params![board_id, mem_address], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut fetched = FetchedPayloads::default();
        for (id, json) in rows {
            let doc: BodyDoc = serde_json::from_str(&json)?;
            match codec::decode_payload(&doc.data) {
                Ok(bytes) => fetched.decoded.push(bytes),
                Err(e) => {
                    warn!("skipping malformed document {id}: {e}");
                    fetched.skipped.push((id, e));
                }
            }
        }
        Ok(fetched)
    }

    /// The baseline payload for a key. `NotFound` if no reference exists,
    /// a reference that fails to decode is a hard error since nothing can
    /// be compared against it.
    pub async fn fetch_reference_payload(
        &self,
        board_id: &str,
        mem_address: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let mut fetched = self
            .fetch_payloads(REFERENCES, board_id, mem_address)
            .await?;
        if let Some((id, source)) = fetched.skipped.pop() {
            return Err(StoreError::MalformedDocument { id, source });
        }
        fetched.decoded.pop().ok_or_else(|| StoreError::NotFound {
            board_id: board_id.to_string(),
            mem_address: mem_address.to_string(),
        })
    }
}

/// Result of a multi-document payload fetch
#[derive(Debug, Default)]
pub struct FetchedPayloads {
    pub decoded: Vec<Vec<u8>>,
    pub skipped: Vec<(i64, CodecError)>,
}

/// Collection names become table names, so only identifier characters
/// are allowed
fn valid_collection(name: &str) -> Result<String, StoreError> {
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(c) => {
            (c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if ok {
        Ok(name.to_string())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}
