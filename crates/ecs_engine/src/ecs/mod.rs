//! Entity-Component-System runtime
//!
//! Entities are named containers of components, systems are event-driven units
//! of per-frame behaviour and scenes own the entity storage that ties both
//! together. Systems never touch storage directly; the owning [`Scene`]
//! injects accessors when a system is attached.

pub mod component;
pub mod entity;
pub mod factory;
pub mod scene;
pub mod system;

pub use component::{Component, Record};
pub use entity::{Entity, WeakEntity};
pub use factory::{AsyncFactory, Factory, Names};
pub use scene::{ComponentIndexer, IndexValue, Scene, MAX_UPDATE_RATE};
pub use system::{SceneAccess, System};

use thiserror::Error;

/// ECS usage and lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// A system accessor was used before the system was attached to a scene
    #[error("System '{0}' is not mounted on a scene")]
    SystemNotMounted(String),

    /// No scene is registered under the requested name
    #[error("Unknown scene: {0}")]
    UnknownScene(String),

    /// Component data did not have the expected shape
    #[error("Invalid component data: {0}")]
    InvalidComponentData(String),
}
