use crate::custom::CustomBinding;
use crate::ids::BindingId;
use crate::locator::{Locator, ResolveFlags};
use serde::{Deserialize, Serialize};

/// Which resolution strategy a reference uses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BindingKind {
    StaticLocator,
    Spawnable,
    Replaceable,
}

/// What a reference points at: a locator or a custom binding.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingPayload {
    Locator(Locator),
    Custom(CustomBinding),
}

impl From<Locator> for BindingPayload {
    fn from(locator: Locator) -> Self {
        Self::Locator(locator)
    }
}

impl From<CustomBinding> for BindingPayload {
    fn from(custom: CustomBinding) -> Self {
        Self::Custom(custom)
    }
}

/// One object bound under a `BindingId`.
///
/// A present custom binding decides resolution on its own; the locator is
/// kept for tooling but never consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingReference {
    pub id: BindingId,
    #[serde(default, skip_serializing_if = "Locator::is_empty")]
    pub locator: Locator,
    #[serde(default)]
    pub resolve_flags: ResolveFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_binding: Option<CustomBinding>,
}

impl BindingReference {
    pub fn new(id: BindingId, payload: BindingPayload) -> Self {
        let mut reference = Self {
            id,
            locator: Locator::empty(),
            resolve_flags: ResolveFlags::None,
            custom_binding: None,
        };
        reference.set_payload(payload);
        reference
    }

    /// Swap what this reference points at, keeping its id and flags.
    pub fn set_payload(&mut self, payload: BindingPayload) {
        match payload {
            BindingPayload::Locator(locator) => {
                self.locator = locator;
                self.custom_binding = None;
            }
            BindingPayload::Custom(custom) => {
                self.locator = Locator::empty();
                self.custom_binding = Some(custom);
            }
        }
    }

    pub fn with_resolve_flags(mut self, flags: ResolveFlags) -> Self {
        self.resolve_flags = flags;
        self
    }

    pub fn kind(&self) -> BindingKind {
        match &self.custom_binding {
            Some(custom) => custom.kind(),
            None => BindingKind::StaticLocator,
        }
    }
}
