pub mod codec;
pub mod document;
pub mod packet;
pub mod replication;

pub use codec::{PacketReader, PacketWriter, WireError};
pub use document::{Document, DOCUMENT_KEY};
pub use packet::{decode_batch, encode_batch, ScalePayload, ScaleSyncMessage, FIXED_PREFIX_LEN};
pub use replication::{apply_sync_message, flush_dirty, tracking_snapshot};
