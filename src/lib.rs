//! Confmate - conference companion auth backend
//!
//! Session and authentication lifecycle for a conference-companion web
//! backend: OAuth login sessions, an administrator gate with brute-force
//! lockout, and a periodically persisted request usage counter.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
