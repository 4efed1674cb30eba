use crate::ids::{BindingId, BindingIndex, SequenceId, SequenceInstanceId};
use crate::world::ObjectHandle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique ownership key for one spawned object.
///
/// At most one live object is registered per key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpawnKey {
    pub binding_id: BindingId,
    pub instance: SequenceInstanceId,
    pub index: BindingIndex,
}

impl SpawnKey {
    pub fn new(binding_id: BindingId, instance: SequenceInstanceId, index: BindingIndex) -> Self {
        Self {
            binding_id,
            instance,
            index,
        }
    }
}

impl fmt::Display for SpawnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}[{}]", self.binding_id, self.instance, self.index)
    }
}

/// Who is responsible for tearing a spawned object down.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnOwnership {
    /// Destroyed when the sequence instance that spawned it ends.
    #[default]
    InnerSequence,
    /// Lives for the whole root sequence playback.
    RootSequence,
    /// Never destroyed by the register; the caller owns its lifetime.
    External,
}

/// A live entry in a spawn register.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SpawnRegisterEntry {
    pub key: SpawnKey,
    pub handle: ObjectHandle,
    pub ownership: SpawnOwnership,
    /// Sequence whose binding produced the object.
    pub sequence: SequenceId,
}
