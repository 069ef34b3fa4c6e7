//! WriteBatch buffers the entity writes of one transaction.
//!
//! Writes made while a transaction is open are accumulated here and applied
//! to the committed tables only when the outermost unit of work succeeds. An
//! overlay keyed by `(entity type, id)` gives reads inside the transaction a
//! view of their own uncommitted writes.

use super::EntityId;
use crate::entity::Entity;
use std::collections::{HashMap, VecDeque};

/// Type of write operation in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or replace an entity.
    Put {
        /// Entity type name
        entity_type: String,
        /// Identifier of the entity
        id: EntityId,
        /// The entity as stored
        entity: Entity,
    },
    /// Remove an entity.
    Delete {
        /// Entity type name
        entity_type: String,
        /// Identifier of the entity
        id: EntityId,
    },
}

/// Latest buffered state of one entity.
#[derive(Debug, Clone)]
enum CachedValue {
    Put(Entity),
    Delete,
}

/// WriteBatch accumulates the writes of an open transaction.
#[derive(Debug, Default)]
pub struct WriteBatch {
    operations: VecDeque<WriteOp>,
    cache: HashMap<(String, EntityId), CachedValue>,
}

impl WriteBatch {
    /// Creates a new empty WriteBatch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a Put operation to the batch.
    pub fn put(&mut self, id: EntityId, entity: Entity) {
        let entity_type = entity.entity_type().to_string();
        self.cache
            .insert((entity_type.clone(), id.clone()), CachedValue::Put(entity.clone()));
        self.operations.push_back(WriteOp::Put { entity_type, id, entity });
    }

    /// Adds a Delete operation to the batch.
    pub fn delete(&mut self, entity_type: &str, id: EntityId) {
        self.cache.insert((entity_type.to_string(), id.clone()), CachedValue::Delete);
        self.operations.push_back(WriteOp::Delete { entity_type: entity_type.to_string(), id });
    }

    /// Looks up the buffered state of an entity.
    ///
    /// Returns `None` if the batch never touched it, `Some(None)` if the
    /// batch deleted it and `Some(Some(_))` if the batch wrote it.
    pub fn lookup(&self, entity_type: &str, id: &EntityId) -> Option<Option<&Entity>> {
        self.cache.get(&(entity_type.to_string(), id.clone())).map(|cached| match cached {
            CachedValue::Put(entity) => Some(entity),
            CachedValue::Delete => None,
        })
    }

    /// Iterates over the latest buffered state of every touched entity of a type.
    pub fn touched<'a>(
        &'a self,
        entity_type: &'a str,
    ) -> impl Iterator<Item = (&'a EntityId, Option<&'a Entity>)> + 'a {
        self.cache.iter().filter(move |((ty, _), _)| ty.as_str() == entity_type).map(|((_, id), cached)| {
            match cached {
                CachedValue::Put(entity) => (id, Some(entity)),
                CachedValue::Delete => (id, None),
            }
        })
    }

    /// Clears all operations from the batch.
    pub fn clear(&mut self) {
        self.operations.clear();
        self.cache.clear();
    }

    /// Returns the number of operations in the batch.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the batch contains no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Consumes the batch, yielding operations in the order they were made.
    pub(crate) fn into_operations(self) -> impl Iterator<Item = WriteOp> {
        self.operations.into_iter()
    }
}
