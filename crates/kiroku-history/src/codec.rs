//! Change codecs.
//!
//! The canonical wire encoding is a collaborator concern; the core only needs
//! `decode(bytes) -> Change`. [`PostcardCodec`] is the encoding kiroku writes.

use kiroku_types::ChangeId;

use crate::change::{Change, ChangeRecord};
use crate::{HistoryError, Result};

pub trait ChangeCodec: Send + Sync {
    fn decode(&self, id: &ChangeId, bytes: &[u8]) -> Result<Change>;

    fn encode(&self, record: &ChangeRecord) -> Result<Vec<u8>>;
}

/// Postcard envelope, content ops nested as postcard bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct PostcardCodec;

impl ChangeCodec for PostcardCodec {
    fn decode(&self, id: &ChangeId, bytes: &[u8]) -> Result<Change> {
        let record: ChangeRecord =
            postcard::from_bytes(bytes).map_err(|e| HistoryError::decode(id, e))?;
        Ok(Change::from_record(id.clone(), record))
    }

    fn encode(&self, record: &ChangeRecord) -> Result<Vec<u8>> {
        postcard::to_allocvec(record).map_err(|e| HistoryError::Encode(e.to_string()))
    }
}

/// Content address of encoded record bytes: blake3, hex encoded.
pub fn content_address(bytes: &[u8]) -> ChangeId {
    ChangeId::from(hex::encode(blake3::hash(bytes).as_bytes()))
}
