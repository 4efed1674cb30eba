// table.rs - Sorted id -> [reference] multimap
//
// References live in one array sorted by binding id. Entries that share an id
// are contiguous and in binding-index order, so every lookup is a pair of
// binary searches over the array.

use super::reference::{BindingPayload, BindingReference};
use crate::custom::CustomBinding;
use crate::ids::{BindingId, BindingIndex};
use crate::locator::{Locator, ResolveContext};
use crate::world::ObjectHandle;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::ops::Range;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<BindingReference>", into = "Vec<BindingReference>")]
pub struct BindingReferenceTable {
    references: Vec<BindingReference>,
}

impl BindingReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lower_bound(&self, id: BindingId) -> usize {
        self.references.partition_point(|reference| reference.id < id)
    }

    fn upper_bound(&self, id: BindingId) -> usize {
        self.references.partition_point(|reference| reference.id <= id)
    }

    fn range_of(&self, id: BindingId) -> Range<usize> {
        self.lower_bound(id)..self.upper_bound(id)
    }

    /// All references for `id`, in binding-index order. Empty if unknown.
    pub fn references(&self, id: BindingId) -> &[BindingReference] {
        &self.references[self.range_of(id)]
    }

    /// The reference at `index`, if the binding has that many.
    pub fn reference(&self, id: BindingId, index: BindingIndex) -> Option<&BindingReference> {
        self.references(id).get(index)
    }

    pub fn reference_mut(
        &mut self,
        id: BindingId,
        index: BindingIndex,
    ) -> Option<&mut BindingReference> {
        let range = self.range_of(id);
        self.references[range].get_mut(index)
    }

    pub fn has_binding(&self, id: BindingId) -> bool {
        !self.range_of(id).is_empty()
    }

    pub fn custom_binding(&self, id: BindingId, index: BindingIndex) -> Option<&CustomBinding> {
        self.reference(id, index)?.custom_binding.as_ref()
    }

    pub fn custom_binding_mut(
        &mut self,
        id: BindingId,
        index: BindingIndex,
    ) -> Option<&mut CustomBinding> {
        self.reference_mut(id, index)?.custom_binding.as_mut()
    }

    /// Append a reference after any existing ones for `id`.
    pub fn add_binding(
        &mut self,
        id: BindingId,
        payload: impl Into<BindingPayload>,
    ) -> &mut BindingReference {
        self.insert_reference(BindingReference::new(id, payload.into()))
    }

    /// Append a locator reference.
    pub fn add_locator(&mut self, id: BindingId, locator: Locator) -> &mut BindingReference {
        self.add_binding(id, locator)
    }

    /// Append a custom-binding reference with an empty locator.
    pub fn add_custom_binding(
        &mut self,
        id: BindingId,
        custom: CustomBinding,
    ) -> &mut BindingReference {
        self.add_binding(id, custom)
    }

    /// Insert a fully built reference at the upper bound of its id.
    pub fn insert_reference(&mut self, reference: BindingReference) -> &mut BindingReference {
        let at = self.upper_bound(reference.id);
        self.references.insert(at, reference);
        &mut self.references[at]
    }

    /// Replace the payload at `(id, index)` in place, or append when absent.
    pub fn add_or_replace_binding(
        &mut self,
        id: BindingId,
        payload: impl Into<BindingPayload>,
        index: BindingIndex,
    ) -> &mut BindingReference {
        let range = self.range_of(id);
        if index < range.len() {
            let at = range.start + index;
            self.references[at].set_payload(payload.into());
            &mut self.references[at]
        } else {
            self.add_binding(id, payload)
        }
    }

    /// Remove every reference for `id`. Returns how many were removed.
    pub fn remove_binding(&mut self, id: BindingId) -> usize {
        let range = self.range_of(id);
        let removed = range.len();
        self.references.drain(range);
        removed
    }

    /// Keep only references whose id is in `valid`.
    pub fn remove_invalid_bindings(&mut self, valid: &HashSet<BindingId>) -> usize {
        let before = self.references.len();
        self.references
            .retain(|reference| valid.contains(&reference.id));
        before - self.references.len()
    }

    /// Resolve every static reference of `id`, skipping custom bindings and
    /// references that do not resolve.
    pub fn resolve_binding(
        &self,
        id: BindingId,
        ctx: &ResolveContext<'_>,
    ) -> SmallVec<[ObjectHandle; 2]> {
        self.references(id)
            .iter()
            .filter(|reference| reference.custom_binding.is_none())
            .filter_map(|reference| reference.locator.resolve(ctx))
            .collect()
    }

    /// Distinct binding ids in ascending order.
    pub fn binding_ids(&self) -> impl Iterator<Item = BindingId> + '_ {
        let mut previous = None;
        self.references.iter().filter_map(move |reference| {
            if previous == Some(reference.id) {
                None
            } else {
                previous = Some(reference.id);
                Some(reference.id)
            }
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindingReference> {
        self.references.iter()
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

impl From<Vec<BindingReference>> for BindingReferenceTable {
    fn from(mut references: Vec<BindingReference>) -> Self {
        references.sort_by_key(|reference| reference.id);
        Self { references }
    }
}

impl From<BindingReferenceTable> for Vec<BindingReference> {
    fn from(table: BindingReferenceTable) -> Self {
        table.references
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::SpawnableBinding;
    use crate::world::{World, WorldKind};

    const A: BindingId = BindingId::from_u128(0xA);
    const B: BindingId = BindingId::from_u128(0xB);
    const C: BindingId = BindingId::from_u128(0xC);

    fn paths(references: &[BindingReference]) -> Vec<&str> {
        references
            .iter()
            .map(|reference| reference.locator.path().unwrap_or(""))
            .collect()
    }

    #[test]
    fn repeated_adds_keep_index_order() {
        let mut table = BindingReferenceTable::new();
        table.add_locator(B, Locator::from_path("b0"));
        table.add_locator(C, Locator::from_path("c0"));
        table.add_locator(B, Locator::from_path("b1"));
        table.add_locator(A, Locator::from_path("a0"));
        table.add_locator(B, Locator::from_path("b2"));

        assert_eq!(paths(table.references(B)), ["b0", "b1", "b2"]);
        assert_eq!(paths(table.references(A)), ["a0"]);
        assert_eq!(paths(table.references(C)), ["c0"]);
        assert_eq!(table.binding_ids().collect::<Vec<_>>(), [A, B, C]);
    }

    #[test]
    fn missing_index_is_not_found() {
        let mut table = BindingReferenceTable::new();
        table.add_locator(A, Locator::from_path("a0"));
        assert!(table.reference(A, 0).is_some());
        assert!(table.reference(A, 1).is_none());
        assert!(table.reference(B, 0).is_none());
        assert!(table.references(B).is_empty());
        assert!(!table.has_binding(B));
    }

    #[test]
    fn add_or_replace_keeps_slot_position() {
        let mut table = BindingReferenceTable::new();
        table.add_locator(A, Locator::from_path("a0"));
        table.add_locator(A, Locator::from_path("a1"));

        let spawnable = CustomBinding::Spawnable(SpawnableBinding::new("Actor"));
        table.add_or_replace_binding(A, spawnable.clone(), 0);
        assert_eq!(table.custom_binding(A, 0), Some(&spawnable));
        assert!(table.reference(A, 0).unwrap().locator.is_empty());
        assert_eq!(table.references(A)[1].locator.path(), Some("a1"));

        // Past the end behaves as an append.
        table.add_or_replace_binding(A, Locator::from_path("a2"), 5);
        assert_eq!(table.references(A).len(), 3);
        assert_eq!(table.references(A)[2].locator.path(), Some("a2"));
    }

    #[test]
    fn remove_binding_drops_whole_range() {
        let mut table = BindingReferenceTable::new();
        table.add_locator(A, Locator::from_path("a0"));
        table.add_locator(B, Locator::from_path("b0"));
        table.add_locator(B, Locator::from_path("b1"));
        assert_eq!(table.remove_binding(B), 2);
        assert_eq!(table.remove_binding(B), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn static_resolution_skips_custom_and_dead_references() {
        let mut world = World::new(WorldKind::Game);
        world.register_class("Actor");
        let lamp = world.create_object(&"Actor".into(), "Lamp", None).unwrap();

        let mut table = BindingReferenceTable::new();
        table.add_locator(A, Locator::from_path("Lamp"));
        table.add_locator(A, Locator::from_path("Missing"));
        table.add_custom_binding(A, CustomBinding::Spawnable(SpawnableBinding::new("Actor")));

        let resolved = table.resolve_binding(A, &ResolveContext::new(&world));
        assert_eq!(resolved.as_slice(), &[lamp]);
    }

    #[test]
    fn deserialized_tables_are_sorted() {
        let json = serde_json::json!([
            { "id": C.as_uuid(), "locator": "c0" },
            { "id": A.as_uuid(), "locator": "a0" },
            { "id": C.as_uuid(), "locator": "c1" },
        ]);
        let table: BindingReferenceTable = serde_json::from_value(json).unwrap();
        assert_eq!(table.binding_ids().collect::<Vec<_>>(), [A, C]);
        assert_eq!(paths(table.references(C)), ["c0", "c1"]);
    }
}
