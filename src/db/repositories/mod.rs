//! Repository layer
//!
//! Data access traits and their SQLx implementations. Services depend on
//! the traits (`Arc<dyn ...Repository>`), so tests can swap in fakes and
//! the SQLite/MySQL split stays contained to this layer.

pub mod session;
pub mod usage;
pub mod user;

pub use session::{SessionRepository, SqlxSessionRepository};
pub use usage::{SqlxUsageRepository, UsageRepository};
pub use user::{SqlxUserRepository, UserRepository};
