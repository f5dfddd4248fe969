pub mod error;
mod pg;
mod rows;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
mod memory;
#[cfg(feature = "test-utils")]
pub mod testutil;

pub use error::{Result, StoreError};
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use store::{ReportStore, ResetScope};
