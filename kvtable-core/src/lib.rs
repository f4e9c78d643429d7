pub mod error;
pub mod types;
pub mod codec;
pub mod config;
pub mod engine;
pub mod memory_engine;
pub mod log_engine;
pub mod query;

pub use config::{EngineConfig, StorageUri, TableConfig, DEFAULT_FETCH_BATCH_SIZE};
pub use engine::{open_engine, KvEngine, WriteBatch};
pub use error::{Error, Result};
pub use log_engine::LogEngine;
pub use memory_engine::MemoryEngine;
pub use query::{field, MatchOptions, Op, F, Q};
pub use types::*;
