mod error;
mod paths;
mod schema;
mod storage;
mod store;

pub use error::StoreError;
pub use paths::{record_file_name, sanitize_key, store_root};
pub use schema::{Conversation, Message, Role, StoreSnapshot};
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
pub use store::{ConversationStore, STORE_KEY};
