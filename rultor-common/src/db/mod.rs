//! Document store abstraction and backends

pub mod document;
#[cfg(feature = "sqlx")]
pub mod init;
pub mod memory;
#[cfg(feature = "sqlx")]
pub mod sqlite;
pub mod store;

pub use document::*;
#[cfg(feature = "sqlx")]
pub use init::*;
pub use memory::*;
#[cfg(feature = "sqlx")]
pub use sqlite::*;
pub use store::*;
