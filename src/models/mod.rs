//! Data models
//!
//! Entities owned by the authentication subsystem: sessions, users and
//! usage readings.

pub mod session;
pub mod usage;
pub mod user;

pub use session::Session;
pub use usage::UsageReading;
pub use user::User;
