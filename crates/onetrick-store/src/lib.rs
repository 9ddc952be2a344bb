pub mod aggregates;
pub mod database;
pub mod error;
pub mod row_helpers;
pub mod schema;
pub mod sessions;
pub mod snapshots;

pub use aggregates::{AggregateRepo, AggregateRow, AggregateWrite};
pub use database::Database;
pub use error::StoreError;
pub use sessions::{SessionRepo, SessionRow, SessionStatus};
pub use snapshots::{HistoryRow, NewSnapshot, PutOutcome, SnapshotRepo, SnapshotRow};
