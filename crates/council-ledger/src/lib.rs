pub mod error;
pub mod ledger;
pub mod memory;
pub mod sqlite;

pub use error::LedgerError;
pub use ledger::SessionLedger;
pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
