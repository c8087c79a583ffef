pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod storage;

pub use api::{ChatApi, HttpChatApi};
pub use chat::{ChatState, ChatStore};
pub use config::Config;
pub use error::{ApiError, ConfigError, StorageError, StoreError};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
