//! In-memory persistence with transactional write batches.
//!
//! [`MemoryStore`] implements both collaborators the loader needs: it is a
//! [`Transaction`] and a [`DaoRegistry`]. It is what the integration tests
//! seed, and it is small enough to embed where a real database is not wanted.
//!
//! # Transactions
//!
//! ```text
//! exec (outermost)  ->  open WriteBatch
//!   exec (nested)   ->  join the open batch
//!   dao.create(e)   ->  batch.put (visible to reads in the same transaction)
//! success           ->  apply batch to committed tables
//! failure           ->  discard batch
//! ```
//!
//! A nested unit of work that fails marks the whole transaction
//! rollback-only: even if the outer work swallows the error, nothing is
//! committed and the outermost `exec` reports the rollback.

pub mod write_batch;

pub use write_batch::{WriteBatch, WriteOp};

use crate::dao::{run_in, Dao, DaoRegistry, Transaction};
use crate::entity::{Entity, EntityRegistry, EntityType};
use crate::value::Value;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Normalised entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    /// Numeric identifier. Whole floats normalise to this form.
    Int(i64),
    /// Textual identifier.
    Text(String),
}

impl EntityId {
    /// Converts an attribute value into an identifier.
    pub fn from_value(value: &Value) -> Result<Self> {
        if let Some(i) = value.as_i64() {
            return Ok(EntityId::Int(i));
        }
        match value {
            Value::String(s) => Ok(EntityId::Text(s.clone())),
            other => Err(Error::invalid_argument(format!(
                "a {} cannot be used as an entity identifier",
                other.kind()
            ))),
        }
    }

    /// Converts the identifier back into an attribute value.
    pub fn to_value(&self) -> Value {
        match self {
            EntityId::Int(i) => Value::Integer(*i),
            EntityId::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(i) => write!(f, "{}", i),
            EntityId::Text(s) => write!(f, "{:?}", s),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    /// Committed entities per type
    tables: HashMap<String, BTreeMap<EntityId, Entity>>,

    /// Last identifier handed out per type
    sequences: HashMap<String, i64>,

    /// Writes of the open transaction, if any
    pending: Option<WriteBatch>,

    /// Nesting depth of `exec` calls
    depth: usize,

    /// Set when a nested unit of work failed
    rollback_only: bool,

    commits: u64,
    rollbacks: u64,
}

impl StoreState {
    fn lookup(&self, entity_type: &str, id: &EntityId) -> Option<Entity> {
        if let Some(found) = self.pending.as_ref().and_then(|b| b.lookup(entity_type, id)) {
            return found.cloned();
        }
        self.tables.get(entity_type).and_then(|table| table.get(id)).cloned()
    }

    fn all(&self, entity_type: &str) -> Vec<Entity> {
        let mut merged = self.tables.get(entity_type).cloned().unwrap_or_default();
        if let Some(batch) = &self.pending {
            for (id, entity) in batch.touched(entity_type) {
                match entity {
                    Some(entity) => merged.insert(id.clone(), entity.clone()),
                    None => merged.remove(id),
                };
            }
        }
        merged.into_values().collect()
    }

    fn batch(&mut self) -> &mut WriteBatch {
        self.pending.get_or_insert_with(WriteBatch::new)
    }

    fn next_id(&mut self, entity_type: &str) -> i64 {
        let sequence = self.sequences.entry(entity_type.to_string()).or_insert(0);
        *sequence += 1;
        *sequence
    }

    /// Keeps generated identifiers clear of explicitly assigned ones.
    fn observe_id(&mut self, entity_type: &str, id: &EntityId) {
        if let EntityId::Int(n) = id {
            let sequence = self.sequences.entry(entity_type.to_string()).or_insert(0);
            *sequence = (*sequence).max(*n);
        }
    }

    fn apply(&mut self, batch: WriteBatch) {
        for op in batch.into_operations() {
            match op {
                WriteOp::Put { entity_type, id, entity } => {
                    self.tables.entry(entity_type).or_default().insert(id, entity);
                }
                WriteOp::Delete { entity_type, id } => {
                    if let Some(table) = self.tables.get_mut(&entity_type) {
                        table.remove(&id);
                    }
                }
            }
        }
    }
}

/// One `exec` level. Closing the outermost scope commits or discards the
/// open batch; dropping an unfinished scope counts as failure.
struct TransactionScope<'a> {
    state: &'a Mutex<StoreState>,
    outermost: bool,
    finished: bool,
}

impl<'a> TransactionScope<'a> {
    fn begin(state: &'a Mutex<StoreState>) -> Self {
        let mut guard = state.lock();
        guard.depth += 1;
        let outermost = guard.depth == 1;
        if outermost {
            guard.pending = Some(WriteBatch::new());
            guard.rollback_only = false;
        }
        Self { state, outermost, finished: false }
    }

    fn finish(mut self, success: bool) -> Result<()> {
        self.finished = true;
        self.close(success)
    }

    fn close(&self, success: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.depth = state.depth.saturating_sub(1);

        if !self.outermost {
            if !success {
                state.rollback_only = true;
            }
            return Ok(());
        }

        let batch = state.pending.take().unwrap_or_default();
        if success && !state.rollback_only {
            log::debug!("Committing {} buffered write(s)", batch.len());
            state.apply(batch);
            state.commits += 1;
            return Ok(());
        }

        log::warn!("Rolling back {} buffered write(s)", batch.len());
        state.rollbacks += 1;
        if success {
            // The outer work succeeded but a nested unit of work failed.
            return Err(Error::persistence(
                "transaction rolled back because a nested unit of work failed",
            ));
        }
        Ok(())
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.close(false);
        }
    }
}

/// In-memory entity store implementing [`Transaction`] and [`DaoRegistry`].
///
/// # Thread Safety
///
/// The store is `Send + Sync`, but there is a single open transaction at a
/// time: units of work from different threads must not interleave.
///
/// # Example
///
/// ```rust
/// use fixture_loader::{EntityRegistry, EntityType, MemoryStore};
/// use fixture_loader::dao::DaoRegistry;
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), fixture_loader::Error> {
/// let types = Arc::new(EntityRegistry::new().with(EntityType::new("User").attribute("name")));
/// let store = MemoryStore::new(types);
///
/// let mut user = store.entity_types().require("User")?.instantiate()?;
/// user.set("name", "alice")?;
/// let user = store.get("User")?.create(user)?;
///
/// assert_eq!(user.get("id").and_then(|id| id.as_i64()), Some(1));
/// assert_eq!(store.count("User"), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    entity_types: Arc<EntityRegistry>,
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    /// Creates an empty store for the given entity types.
    pub fn new(entity_types: Arc<EntityRegistry>) -> Self {
        Self { entity_types, state: Arc::new(Mutex::new(StoreState::default())) }
    }

    /// Returns the entity types this store accepts.
    pub fn entity_types(&self) -> &Arc<EntityRegistry> {
        &self.entity_types
    }

    /// Returns the DAO for the named type.
    pub fn dao(&self, entity_type: &str) -> Result<MemoryDao> {
        let entity_type = self.entity_types.get(entity_type).ok_or_else(|| {
            Error::not_found(format!("no DAO registered for entity type '{}'", entity_type))
        })?;
        Ok(MemoryDao { store: self.clone(), entity_type })
    }

    /// Number of entities of a type visible right now, including writes of
    /// the open transaction.
    pub fn count(&self, entity_type: &str) -> usize {
        self.state.lock().all(entity_type).len()
    }

    /// Returns true while a unit of work is executing.
    pub fn in_transaction(&self) -> bool {
        self.state.lock().depth > 0
    }

    /// Number of committed transactions.
    pub fn commit_count(&self) -> u64 {
        self.state.lock().commits
    }

    /// Number of rolled back transactions.
    pub fn rollback_count(&self) -> u64 {
        self.state.lock().rollbacks
    }
}

impl Transaction for MemoryStore {
    fn exec(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let scope = TransactionScope::begin(&self.state);
        let result = work();
        let outcome = scope.finish(result.is_ok());
        result.and(outcome)
    }
}

impl DaoRegistry for MemoryStore {
    fn get(&self, entity_type: &str) -> Result<Arc<dyn Dao>> {
        Ok(Arc::new(self.dao(entity_type)?))
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryStore")
            .field("entity_types", &self.entity_types.len())
            .field("depth", &state.depth)
            .field("commits", &state.commits)
            .field("rollbacks", &state.rollbacks)
            .finish()
    }
}

/// DAO for one entity type of a [`MemoryStore`].
///
/// Every operation runs as its own unit of work, joining the store's open
/// transaction when there is one.
#[derive(Clone)]
pub struct MemoryDao {
    store: MemoryStore,
    entity_type: Arc<EntityType>,
}

impl MemoryDao {
    /// Returns the entity type this DAO serves.
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    fn check_type(&self, entity: &Entity) -> Result<()> {
        if entity.entity_type() != self.entity_type.name() {
            return Err(Error::invalid_argument(format!(
                "{} DAO cannot store a {}",
                self.entity_type.name(),
                entity.entity_type()
            )));
        }
        Ok(())
    }

    fn id_of(&self, entity: &Entity) -> Result<EntityId> {
        let id_name = self.entity_type.id_name();
        match entity.get(id_name) {
            Some(value) if !value.is_nil() => EntityId::from_value(value),
            _ => Err(Error::invalid_argument(format!(
                "{} has no value for identifier '{}'",
                self.entity_type.name(),
                id_name
            ))),
        }
    }

    fn require_existing(&self, state: &StoreState, id: &EntityId) -> Result<Entity> {
        state.lookup(self.entity_type.name(), id).ok_or_else(|| {
            Error::not_found(format!("{} with id {}", self.entity_type.name(), id))
        })
    }
}

impl Dao for MemoryDao {
    fn create(&self, entity: Entity) -> Result<Entity> {
        self.check_type(&entity)?;
        run_in(&self.store, move || {
            let mut entity = entity;
            let mut state = self.store.state.lock();
            let name = self.entity_type.name();
            let id_name = self.entity_type.id_name();

            let id = match entity.get(id_name).filter(|v| !v.is_nil()).cloned() {
                Some(value) => {
                    let id = EntityId::from_value(&value)?;
                    state.observe_id(name, &id);
                    id
                }
                None => {
                    let next = state.next_id(name);
                    entity.set(id_name, next)?;
                    EntityId::Int(next)
                }
            };

            if state.lookup(name, &id).is_some() {
                return Err(Error::persistence(format!("{} with id {} already exists", name, id)));
            }

            state.batch().put(id, entity.clone());
            Ok(entity)
        })
    }

    fn find_by_id(&self, id: &Value) -> Result<Option<Entity>> {
        let id = EntityId::from_value(id)?;
        run_in(&self.store, || Ok(self.store.state.lock().lookup(self.entity_type.name(), &id)))
    }

    fn find_all(&self) -> Result<Vec<Entity>> {
        run_in(&self.store, || Ok(self.store.state.lock().all(self.entity_type.name())))
    }

    fn update(&self, entity: Entity) -> Result<Entity> {
        self.check_type(&entity)?;
        let id = self.id_of(&entity)?;
        run_in(&self.store, move || {
            let mut state = self.store.state.lock();
            self.require_existing(&state, &id)?;
            state.batch().put(id, entity.clone());
            Ok(entity)
        })
    }

    fn delete(&self, entity: &Entity) -> Result<Entity> {
        self.check_type(entity)?;
        let id = self.id_of(entity)?;
        run_in(&self.store, || {
            let mut state = self.store.state.lock();
            let existing = self.require_existing(&state, &id)?;
            state.batch().delete(self.entity_type.name(), id.clone());
            Ok(existing)
        })
    }
}
