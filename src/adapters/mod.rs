pub mod api_server;
pub mod memory;
pub mod postgres;
pub mod transaction_manager;

pub use api_server::start_api_server;
pub use memory::{MemoryLogStore, MemoryQueue, MemorySequencer};
pub use postgres::PostgresStore;
pub use transaction_manager::{ManagedTransaction, TransactionManager, TransactionScope};
