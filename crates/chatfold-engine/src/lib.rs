//! Virtualization core for live, continuously-mutating chat documents.
//!
//! The engine decides which conversation turns stay fully materialized
//! and which collapse into cheap placeholders, without ever disturbing
//! the user's scroll position or touching content that is still being
//! streamed by the host application. It owns no I/O: everything it does
//! goes through the [`chatfold_host::HostPage`] surface, and everything
//! it reacts to arrives as host events forwarded by a driver.

pub mod anchor;
pub mod collapse;
pub mod engine;
pub mod item;
pub mod lock;
pub mod measure;
pub mod streaming;
pub mod timers;
pub mod tracker;
pub mod visibility;

pub use engine::{EngineStatus, Virtualizer};
pub use item::{ItemMeta, Materialization};
