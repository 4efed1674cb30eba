//! Spawn registers and their collaborators

mod key;
mod observer;
mod preanimated;
mod register;
mod reuse;
pub(crate) mod spawner;

pub use key::{SpawnKey, SpawnOwnership, SpawnRegisterEntry};
pub use observer::{SpawnEvent, SpawnEventLog, SpawnObserver};
pub use preanimated::{PreAnimatedSnapshot, PreAnimatedStateStore};
pub use register::{SpawnRegister, StandardSpawnRegister};
pub use reuse::{ReuseSettings, ReusingSpawnRegister};
pub use spawner::{ObjectSpawner, WorldSpawner};
