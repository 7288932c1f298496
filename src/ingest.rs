use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, span, warn, Level};

use crate::codec;
use crate::config::CollectionsConfig;
use crate::divergence::{self, DivergenceReport, LengthMismatch};
use crate::packet::{Body, Header, Packet};
use crate::store::{Store, StoreError};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("compare error: {0}")]
    Compare(#[from] LengthMismatch),
}

/// How an inbound body was filed
#[derive(Debug)]
pub enum BodyOutcome {
    /// First capture for this board/address, stored as the baseline
    Reference { id: i64 },
    /// Later capture, stored as a sample and compared against the baseline
    Sample { id: i64, report: DivergenceReport },
}

pub async fn ingest_header(
    store: &Store,
    collections: &CollectionsConfig,
    header: &Header,
) -> Result<i64, IngestError> {
    let doc = codec::header_to_doc(header);
    Ok(store.insert_document(&doc, &collections.headers).await?)
}

/// Files a body packet: the first capture for a (board, address) key
/// becomes the reference, every later one becomes a sample and is
/// compared against the stored reference payload.
pub async fn ingest_body(
    store: &Store,
    collections: &CollectionsConfig,
    body: &Body,
) -> Result<BodyOutcome, IngestError> {
    let doc = codec::body_to_doc(body);

    if !store
        .reference_exists(&doc.board_id, &doc.mem_address)
        .await?
    {
        match store.insert_reference(&doc).await {
            Ok(id) => return Ok(BodyOutcome::Reference { id }),
            // a concurrent ingest won the race, file this one as a sample
            Err(StoreError::DuplicateReference { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let reference = store
        .fetch_reference_payload(&doc.board_id, &doc.mem_address)
        .await?;
    let id = store
        .insert_document(&doc, collections.for_body(body.kind))
        .await?;
    let report = divergence::compare(&reference, &body.data)?;
    Ok(BodyOutcome::Sample { id, report })
}

/// Receives parsed packets from the transport and files each one in its
/// own task. The store is the only shared resource.
pub async fn task(store: Arc<Store>, collections: CollectionsConfig, mut rx: mpsc::Receiver<Packet>) {
    let span = span!(Level::INFO, "Ingest");
    let _enter = span.enter();
    info!("running");

    while let Some(packet) = rx.recv().await {
        let store = store.clone();
        let collections = collections.clone();
        tokio::spawn(async move {
            if let Err(e) = handle(&store, &collections, packet).await {
                error!("{e}");
            }
        });
    }
}

async fn handle(
    store: &Store,
    collections: &CollectionsConfig,
    packet: Packet,
) -> Result<(), IngestError> {
    match packet {
        Packet::Header(header) => {
            let id = ingest_header(store, collections, &header).await?;
            info!("{} header {id} stored for {}", header.kind.name(), header.board);
        }
        Packet::Body(body) => {
            let board = body.board.to_string();
            match ingest_body(store, collections, &body).await? {
                BodyOutcome::Reference { id } => {
                    info!("reference {id} stored for {board}");
                }
                BodyOutcome::Sample { id, report } if report.is_clean() => {
                    info!("sample {id} stored for {board}, no divergence");
                }
                BodyOutcome::Sample { id, report } => {
                    warn!(
                        "sample {id} for {board} diverges from reference: {} bytes, {} bits flipped",
                        report.byte_count, report.bit_count
                    );
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use jiff::Timestamp;

    use super::*;
    use crate::packet::{BoardId, BodyType, HeaderType, PAYLOAD_LEN};

    fn body(mem_address: u32, data: [u8; PAYLOAD_LEN]) -> Body {
        Body {
            kind: BodyType::Memory,
            crc: 0x1234,
            board: BoardId::new(0, 0, 1),
            mem_address,
            created: Timestamp::UNIX_EPOCH,
            data,
        }
    }

    #[tokio::test]
    async fn test_first_capture_becomes_reference() {
        let store = Store::open_in_memory().await.unwrap();
        let collections = CollectionsConfig::default();
        let b = body(0x10, [0xAA; PAYLOAD_LEN]);

        let outcome = ingest_body(&store, &collections, &b).await.unwrap();
        assert!(matches!(outcome, BodyOutcome::Reference { .. }));
        assert!(store
            .reference_exists("0x000000000000000000000001", "0x00000010")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_second_capture_becomes_sample() {
        let store = Store::open_in_memory().await.unwrap();
        let collections = CollectionsConfig::default();

        let reference = body(0x10, [0xAA; PAYLOAD_LEN]);
        ingest_body(&store, &collections, &reference).await.unwrap();

        // flip one bit at index 0 and a whole byte at index 7
        let mut upset = [0xAA; PAYLOAD_LEN];
        upset[0] = 0xAB;
        upset[7] = 0x55;
        let outcome = ingest_body(&store, &collections, &body(0x10, upset))
            .await
            .unwrap();

        let BodyOutcome::Sample { report, .. } = outcome else {
            panic!("expected sample outcome");
        };
        assert_eq!(report.byte_count, 2);
        assert_eq!(report.bit_count, 1 + 8);
        for diff in &report.diffs {
            assert_eq!(
                diff.reference ^ diff.sample,
                reference.data[diff.index] ^ upset[diff.index]
            );
        }
    }

    #[tokio::test]
    async fn test_identical_sample_is_clean() {
        let store = Store::open_in_memory().await.unwrap();
        let collections = CollectionsConfig::default();
        let b = body(0x20, [3; PAYLOAD_LEN]);

        ingest_body(&store, &collections, &b).await.unwrap();
        let outcome = ingest_body(&store, &collections, &b).await.unwrap();

        let BodyOutcome::Sample { report, .. } = outcome else {
            panic!("expected sample outcome");
        };
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_samples_accumulate_per_key() {
        let store = Store::open_in_memory().await.unwrap();
        let collections = CollectionsConfig::default();
        let b = body(0x30, [7; PAYLOAD_LEN]);

        ingest_body(&store, &collections, &b).await.unwrap();
        ingest_body(&store, &collections, &b).await.unwrap();
        ingest_body(&store, &collections, &b).await.unwrap();

        let fetched = store
            .fetch_payloads("memory", "0x000000000000000000000001", "0x00000030")
            .await
            .unwrap();
        assert_eq!(fetched.decoded.len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_header() {
        let store = Store::open_in_memory().await.unwrap();
        let collections = CollectionsConfig::default();
        let header = Header {
            kind: HeaderType::Ping,
            crc: 1,
            ttl: 16,
            board: BoardId::new(0, 0, 2),
            created: Timestamp::UNIX_EPOCH,
        };

        ingest_header(&store, &collections, &header).await.unwrap();
        ingest_header(&store, &collections, &header).await.unwrap();
    }
}
