use crate::batch::Bulk;
use chrono::{DateTime, Utc};
use flate2::{Compression, write::GzEncoder};
use serde::Serialize;
use std::io::Write;

/// Wire form of a bulk as posted to the orchestrator.
#[derive(Debug, Serialize)]
pub struct BulkPayload<'a, M> {
    pub bulk_id: &'a str,
    pub created_at: DateTime<Utc>,
    pub weight: u64,
    pub worker_version: &'static str,
    pub messages: &'a [M],
}

#[derive(Debug, Clone, Default)]
pub struct BulkSerializer;

impl BulkSerializer {
    pub fn new() -> Self {
        Self
    }

    pub fn serialize<M: Serialize>(&self, bulk: &Bulk<M>) -> Result<Vec<u8>, serde_json::Error> {
        let payload = BulkPayload {
            bulk_id: bulk.id(),
            created_at: bulk.created_at(),
            weight: bulk.weight(),
            worker_version: env!("CARGO_PKG_VERSION"),
            messages: bulk.messages(),
        };
        serde_json::to_vec(&payload)
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::fast());
        encoder.write_all(data)?;
        encoder.finish()
    }
}
