pub mod error;
pub mod checkpoint;
pub mod memory;
pub mod verify;

pub use checkpoint::{CheckpointRecord, CheckpointStore, FileCheckpointStore, DEFAULT_CHECKPOINT_PATH};
pub use error::{PersistenceError, Result};
pub use memory::MemoryCheckpointStore;
pub use verify::{verify_convergence, Convergence};
