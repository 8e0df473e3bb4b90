//! Authoritative mapping of connection id to entity.
//!
//! Backed by a `BTreeMap` so iteration order is stable (ascending id) within
//! and across ticks; cross-entity ordering such as simultaneous attacks is
//! resolved by that order.

use crate::entity::{ConnectionId, Entity};
use crate::protocol::EntitySnapshot;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: BTreeMap<ConnectionId, Entity>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new entity. Returns false, leaving the store untouched, if
    /// the id is already present.
    pub fn add(&mut self, entity: Entity) -> bool {
        if self.entities.contains_key(&entity.id) {
            return false;
        }
        self.entities.insert(entity.id, entity);
        true
    }

    /// Removes an entity; absent ids are a no-op returning `None`.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn for_each<F: FnMut(&Entity)>(&self, mut f: F) {
        for entity in self.entities.values() {
            f(entity);
        }
    }

    pub fn for_each_mut<F: FnMut(&mut Entity)>(&mut self, mut f: F) {
        for entity in self.entities.values_mut() {
            f(entity);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.entities.keys().copied().collect()
    }

    /// Two distinct entities borrowed mutably at once.
    pub fn pair_mut(
        &mut self,
        a: ConnectionId,
        b: ConnectionId,
    ) -> Option<(&mut Entity, &mut Entity)> {
        if a == b {
            return None;
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let mut range = self.entities.range_mut(low..=high);
        let first = range.next().filter(|(id, _)| **id == low)?.1;
        let second = range.next_back().filter(|(id, _)| **id == high)?.1;
        if a < b {
            Some((first, second))
        } else {
            Some((second, first))
        }
    }

    pub fn alive_count(&self) -> usize {
        self.entities.values().filter(|e| e.is_alive()).count()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Owned, rounded copy of every entity, safe to hand to an async sender.
    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        self.entities.values().map(EntitySnapshot::from).collect()
    }
}
