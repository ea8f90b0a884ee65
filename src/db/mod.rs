//! Database access: the primary/replica router and the check archive.

pub mod checks;
pub mod health;
pub mod router;

pub use router::{read_your_writes, DbRouter, RouterError, RouterStats};
