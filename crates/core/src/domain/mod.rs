pub mod contract;
pub mod snapshot;

pub use snapshot::{Document, DocumentMeta, Items, Snapshot, TradeDate};
