use super::SpawnableBinding;
use crate::binding::BindingResolveParams;
use crate::ids::BindingIndex;
use crate::playback::PlaybackState;
use crate::spawn::SpawnRegister;
use crate::world::{ObjectClass, ObjectHandle};
use serde::{Deserialize, Serialize};

/// Binding that previews as a spawnable in editor worlds and defers to the
/// runtime resolver everywhere else.
///
/// It keeps no spawn state of its own; preview spawns go through the register
/// like any other spawnable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReplaceableBinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preview: Option<SpawnableBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_class: Option<ObjectClass>,
}

impl ReplaceableBinding {
    pub fn new(bound_class: impl Into<ObjectClass>) -> Self {
        Self {
            preview: None,
            bound_class: Some(bound_class.into()),
        }
    }

    /// Use `spawnable` as the editor preview. It is always tagged as a
    /// preview spawn.
    pub fn with_preview(mut self, mut spawnable: SpawnableBinding) -> Self {
        spawnable.preview = true;
        self.preview = Some(spawnable);
        self
    }

    pub fn preview(&self) -> Option<&SpawnableBinding> {
        self.preview.as_ref()
    }

    pub fn preview_mut(&mut self) -> Option<&mut SpawnableBinding> {
        self.preview.as_mut()
    }

    pub fn bound_object_class(&self) -> Option<&ObjectClass> {
        self.bound_class
            .as_ref()
            .or_else(|| self.preview.as_ref().map(|spawnable| spawnable.bound_object_class()))
    }

    pub fn will_spawn_object(&self, state: &PlaybackState<'_>) -> bool {
        state.is_preview() && self.preview.is_some()
    }

    /// The preview spawnable, only in preview worlds.
    pub fn as_spawnable(&self, preview: bool) -> Option<&SpawnableBinding> {
        self.preview.as_ref().filter(|_| preview)
    }

    pub fn resolve_binding(
        &self,
        params: &BindingResolveParams,
        index: BindingIndex,
        register: &mut dyn SpawnRegister,
        state: &mut PlaybackState<'_>,
    ) -> Option<ObjectHandle> {
        if state.is_preview() {
            let preview = self.preview.as_ref()?;
            return preview.resolve_binding(params, index, register, state);
        }
        let resolver = state.runtime_resolver?;
        resolver.resolve_runtime_binding(params, index, state.world)
    }
}
