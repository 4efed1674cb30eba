//! Per-tick spawn orchestration

mod entity;
mod pass;

pub use entity::{BindingEntities, BindingEntity, EntityHandle, EntityTags};
pub use pass::{PassReport, SpawnablesPass};
