//! Persistence collaborators used by fixture scripts.
//!
//! The loader does not persist anything itself. It delimits transactions
//! through a [`Transaction`] and reaches entities through the [`Dao`] that a
//! [`DaoRegistry`] hands out for each entity type. [`crate::store::MemoryStore`]
//! implements both for tests and embedding; real applications plug in their
//! own database layer.

use crate::entity::Entity;
use crate::value::Value;
use crate::Result;
use std::sync::Arc;

/// Generic data access for one entity type.
pub trait Dao {
    /// Persists a new entity and returns the stored form (e.g. with an
    /// assigned identifier).
    fn create(&self, entity: Entity) -> Result<Entity>;

    /// Finds an entity by identifier. An unknown identifier is `Ok(None)`.
    fn find_by_id(&self, id: &Value) -> Result<Option<Entity>>;

    /// Returns every stored entity of this type.
    fn find_all(&self) -> Result<Vec<Entity>>;

    /// Replaces a stored entity and returns the stored form.
    fn update(&self, entity: Entity) -> Result<Entity>;

    /// Removes a stored entity and returns it.
    fn delete(&self, entity: &Entity) -> Result<Entity>;

    /// Persists several entities in order.
    fn create_all(&self, entities: Vec<Entity>) -> Result<Vec<Entity>> {
        entities.into_iter().map(|entity| self.create(entity)).collect()
    }

    /// Finds the entities matching any of the identifiers. Unknown
    /// identifiers are skipped.
    fn find_by_ids(&self, ids: &[Value]) -> Result<Vec<Entity>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.find_by_id(id)? {
                found.push(entity);
            }
        }
        Ok(found)
    }
}

/// Lookup from entity type to its data access object.
pub trait DaoRegistry: Send + Sync {
    /// Returns the DAO responsible for the named entity type.
    fn get(&self, entity_type: &str) -> Result<Arc<dyn Dao>>;

    /// Returns the DAO responsible for the entity's runtime type.
    fn get_for(&self, entity: &Entity) -> Result<Arc<dyn Dao>> {
        self.get(entity.entity_type())
    }
}

/// A transactional boundary around a unit of work.
pub trait Transaction: Send + Sync {
    /// Executes `work` atomically.
    ///
    /// On failure the implementation decides whether and how to roll back;
    /// the error is returned to the caller either way.
    fn exec(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}

impl dyn Transaction + '_ {
    /// Executes a value-returning unit of work inside [`Transaction::exec`].
    pub fn run<T>(&self, work: impl FnOnce() -> Result<T>) -> Result<T> {
        run_in(self, work)
    }
}

/// Executes a value-returning unit of work inside any transaction.
pub fn run_in<X, T>(transaction: &X, work: impl FnOnce() -> Result<T>) -> Result<T>
where
    X: Transaction + ?Sized,
{
    let mut work = Some(work);
    let mut output = None;
    transaction.exec(&mut || {
        if let Some(work) = work.take() {
            output = Some(work()?);
        }
        Ok(())
    })?;
    output.ok_or_else(|| crate::Error::invalid_state("transaction did not run its unit of work"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::Error;
    use parking_lot::Mutex;

    struct Passthrough;

    impl Transaction for Passthrough {
        fn exec(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
            work()
        }
    }

    struct Skipping;

    impl Transaction for Skipping {
        fn exec(&self, _work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
            Ok(())
        }
    }

    struct VecDao {
        entities: Mutex<Vec<Entity>>,
    }

    impl Dao for VecDao {
        fn create(&self, entity: Entity) -> Result<Entity> {
            self.entities.lock().push(entity.clone());
            Ok(entity)
        }

        fn find_by_id(&self, id: &Value) -> Result<Option<Entity>> {
            Ok(self.entities.lock().iter().find(|e| e.get("id") == Some(id)).cloned())
        }

        fn find_all(&self) -> Result<Vec<Entity>> {
            Ok(self.entities.lock().clone())
        }

        fn update(&self, entity: Entity) -> Result<Entity> {
            Ok(entity)
        }

        fn delete(&self, entity: &Entity) -> Result<Entity> {
            Ok(entity.clone())
        }
    }

    #[test]
    fn test_run_returns_work_output() {
        let tx: &dyn Transaction = &Passthrough;
        assert_eq!(tx.run(|| Ok(42)).unwrap(), 42);

        let err = tx.run(|| -> Result<()> { Err(Error::persistence("nope")) }).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[test]
    fn test_run_detects_skipped_work() {
        let err = run_in(&Skipping, || Ok(1)).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_find_by_ids_skips_unknown() {
        let ty = EntityType::new("Tag");
        let dao = VecDao { entities: Mutex::new(Vec::new()) };
        let mut tag = ty.instantiate().unwrap();
        tag.set("id", 1).unwrap();
        dao.create_all(vec![tag]).unwrap();

        assert!(dao.find_by_ids(&[]).unwrap().is_empty());
        let found = dao.find_by_ids(&[Value::from(1), Value::from(2)]).unwrap();
        assert_eq!(found.len(), 1);
    }
}
