//! Host-document surface for the chatfold virtualization engine.
//!
//! The engine never talks to a real browser document; it talks to the
//! [`HostPage`] trait defined here. [`SimPage`] is the in-memory
//! implementation used by tests and the simulation CLI. The settings
//! store lives here too, since persistence is owned by the host
//! environment rather than the engine.

pub mod error;
pub mod node;
pub mod page;
pub mod settings;
pub mod sim;

pub use error::{HostError, SettingsError};
pub use node::{
    Marker, MutationBatch, MutationKind, NodeId, PlaceholderSpec, SelectorFamily, VisibilityEvent,
};
pub use page::HostPage;
pub use settings::{CollapsePolicy, MemoryStore, Settings, SettingsStore, TomlSettingsStore};
pub use sim::{ContentToken, DetachedNode, SimPage, TurnSpec};
