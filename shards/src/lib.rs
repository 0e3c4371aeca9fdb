pub mod batch;
pub mod cache;
pub mod codec;
pub mod csv;
mod discover;
pub mod error;
mod prefetch;
pub mod producer;
pub mod schema;
pub mod table;

pub use batch::Batch;
pub use cache::{ShardCache, StalePolicy};
pub use codec::SourceStamp;
pub use discover::discover;
pub use error::{Result, ShardErr};
pub use prefetch::Prefetcher;
pub use producer::{BatchProducer, BatchSource, MISSING_FILL};
pub use schema::{ColumnType, FeatureSpec, Schema};
pub use table::{Column, ColumnKind, Table};
