//! Repository traits for store operations.

pub mod batches;
pub mod clients;
pub mod files;
pub mod records;
pub mod sessions;
pub mod stats;

pub use batches::{BatchRepo, ClaimedBatch, CompletedBatch};
pub use clients::{ClientRepo, ClientWithStats};
pub use files::FileRepo;
pub use records::{AggregatedLocation, RecordPage, RecordRepo};
pub use sessions::SessionRepo;
pub use stats::{StatsRepo, StatsSnapshot};
