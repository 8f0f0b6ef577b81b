#![forbid(unsafe_code)]

pub mod file_store;
pub mod repository;
pub mod snapshot;
pub mod sqlite;

pub use file_store::FileSnapshotStore;
pub use repository::{
    AttemptRepository, InMemoryAttemptRepository, InMemorySnapshotStore, SnapshotStore, Storage,
    StorageError,
};
pub use snapshot::{
    PersistenceGateway, Restoration, RestoredSession, SNAPSHOT_KEY, SNAPSHOT_VERSION,
    SessionSnapshot, SnapshotOffer, StaleReason,
};
