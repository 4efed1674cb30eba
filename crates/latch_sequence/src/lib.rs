//! Latch Sequence
//!
//! Binding resolution and spawn lifecycle for sequence playback:
//! - Binding reference tables (locator and custom bindings)
//! - Spawnable and replaceable bindings
//! - Spawn registers (standard and reusing)
//! - Per-tick spawnables evaluation pass

mod handle;

pub mod binding;
pub mod custom;
pub mod evaluation;
pub mod ids;
pub mod locator;
pub mod playback;
pub mod sequence;
pub mod settings;
pub mod spawn;
pub mod stats;
pub mod time;
pub mod world;

pub use binding::{
    BindingKind, BindingPayload, BindingReference, BindingReferenceTable, BindingResolveParams,
    BindingResolveResult, BindingResolver,
};
pub use custom::{
    CustomBinding, CustomBindingKind, ReplaceableBinding, SpawnTemplate, SpawnableBinding,
};
pub use evaluation::{BindingEntities, EntityHandle, EntityTags, PassReport, SpawnablesPass};
pub use ids::{BindingId, BindingIndex, SequenceId, SequenceInstanceId};
pub use locator::{Locator, ResolveContext, ResolveFlags};
pub use playback::{BindingOverrides, PlaybackState, RuntimeBindingResolver};
pub use sequence::{InstanceHandle, Sequence, SequenceInstance, SequenceInstances, SequenceLibrary};
pub use settings::{SequencerSettings, SettingsError};
pub use spawn::{
    ObjectSpawner, ReuseSettings, ReusingSpawnRegister, SpawnEvent, SpawnEventLog, SpawnKey,
    SpawnObserver, SpawnOwnership, SpawnRegister, SpawnRegisterEntry, StandardSpawnRegister,
    WorldSpawner,
};
pub use stats::RegisterStats;
pub use time::EvaluationClock;
pub use world::{ObjectClass, ObjectHandle, ObjectTags, RuntimeObject, World, WorldError, WorldKind};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
