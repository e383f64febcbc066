pub mod file;
pub mod memory;
pub mod models;
pub mod store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use models::*;
pub use store::Store;
