//! ScriptExecutor runs batches of fixture scripts.
//!
//! Each script of a batch runs in its own Lua VM and its own transaction.
//! What the script defines at the top level is captured and folded into a
//! running variable map that the next script starts from:
//!
//! ```text
//! variables = inputs
//! for script in batch:
//!     bind DSL functions, entity types, variables
//!     start capture
//!     transaction { run script }
//!     outputs = globals defined by the script
//!     no namespace:  variables += outputs      (last write wins)
//!     namespace ns:  variables[ns] = outputs
//! return variables
//! ```
//!
//! `load(...)` called from inside a script re-enters the same algorithm and
//! hands the resulting map back to the calling script.

use crate::config::LoaderOptions;
use crate::dao::{DaoRegistry, Transaction};
use crate::entity::EntityRegistry;
use crate::resource::{FileResourceLoader, ResourceLoader};
use crate::script::binding::NamespacedBinding;
use crate::script::context::ContextStack;
use crate::script::dsl;
use crate::script::reference::Script;
use crate::store::MemoryStore;
use crate::value::{Value, Variables};
use crate::{Error, Result};
use mlua::Lua;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Loads fixture scripts against a persistence layer.
///
/// Cloning is cheap and clones share the entity context stack, so a clone
/// must not run scripts concurrently with the original. Recursive `load()`
/// calls from scripts are expected and run on the calling thread.
///
/// # Example
///
/// ```rust
/// use fixture_loader::{EntityRegistry, EntityType, MemoryResourceLoader, MemoryStore, ScriptExecutor};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), fixture_loader::Error> {
/// let types = EntityRegistry::new().with(EntityType::new("User").attributes(["name", "age"]));
/// let store = MemoryStore::new(Arc::new(types));
///
/// let scripts = MemoryResourceLoader::new().with_script(
///     "users.lua",
///     r#"
///         users = table(User, {"name", "age"}, function()
///             alice = row("Alice", 30)
///             row("Bob", 25)
///         end)
///     "#,
/// );
/// let executor = ScriptExecutor::in_memory(&store).with_resource_loader(scripts);
///
/// let variables = executor.load(["users.lua"])?;
/// assert_eq!(variables["users"].as_list().map(|users| users.len()), Some(2));
/// assert_eq!(store.count("User"), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ScriptExecutor {
    /// DAO lookup used by `row` and `find`
    dao_registry: Arc<dyn DaoRegistry>,

    /// Boundary wrapped around every script
    transaction: Arc<dyn Transaction>,

    /// Entity types installed as script globals
    entity_types: Arc<EntityRegistry>,

    /// Source of script text
    resources: Arc<dyn ResourceLoader>,

    /// Script directory, inputs and limits
    options: Arc<LoaderOptions>,

    /// Open `table` blocks
    stack: Arc<Mutex<ContextStack>>,

    /// Nesting of active `load` calls
    load_depth: Arc<AtomicUsize>,
}

impl ScriptExecutor {
    /// Creates an executor with no entity types, default options and
    /// scripts read from the filesystem.
    pub fn new(dao_registry: Arc<dyn DaoRegistry>, transaction: Arc<dyn Transaction>) -> Self {
        Self {
            dao_registry,
            transaction,
            entity_types: Arc::new(EntityRegistry::new()),
            resources: Arc::new(FileResourceLoader),
            options: Arc::new(LoaderOptions::default()),
            stack: Arc::new(Mutex::new(ContextStack::new())),
            load_depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates an executor persisting into `store`, with the store's entity types.
    pub fn in_memory(store: &MemoryStore) -> Self {
        let store = Arc::new(store.clone());
        let entity_types = Arc::clone(store.entity_types());
        Self::new(store.clone(), store).with_entity_types(entity_types)
    }

    /// Sets the entity types scripts can create and find.
    pub fn with_entity_types(mut self, entity_types: Arc<EntityRegistry>) -> Self {
        self.entity_types = entity_types;
        self
    }

    /// Sets where script text comes from.
    pub fn with_resource_loader(mut self, loader: impl ResourceLoader + 'static) -> Self {
        self.resources = Arc::new(loader);
        self
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    /// Sets the directory script names are resolved against.
    pub fn set_script_directory(&mut self, dir: impl AsRef<Path>) {
        Arc::make_mut(&mut self.options).script_directory = Some(dir.as_ref().to_path_buf());
    }

    /// Sets the variables visible to every script.
    pub fn set_inputs(&mut self, inputs: Variables) {
        Arc::make_mut(&mut self.options).inputs = inputs;
    }

    /// Returns the options.
    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Returns the entity types installed into scripts.
    pub fn entity_types(&self) -> &EntityRegistry {
        &self.entity_types
    }

    /// Number of `table` blocks currently open.
    pub fn context_depth(&self) -> usize {
        self.stack.lock().depth()
    }

    /// Returns a clone with its own, empty entity context stack. The load
    /// depth counter stays shared.
    pub(crate) fn with_fresh_context(&self) -> Self {
        Self { stack: Arc::new(Mutex::new(ContextStack::new())), ..self.clone() }
    }

    pub(crate) fn stack(&self) -> &Arc<Mutex<ContextStack>> {
        &self.stack
    }

    pub(crate) fn dao_registry(&self) -> &dyn DaoRegistry {
        self.dao_registry.as_ref()
    }

    /// Loads scripts in order and returns the accumulated variables.
    ///
    /// Accepts bare names and [`Script`] references alike; bare names merge
    /// their outputs into the top level, namespaced scripts nest theirs.
    ///
    /// # Arguments
    ///
    /// * `scripts` - Script names or references, run in order
    ///
    /// # Example
    ///
    /// ```
    /// use fixture_loader::{EntityRegistry, MemoryResourceLoader, MemoryStore, ScriptExecutor, Value};
    /// use std::sync::Arc;
    ///
    /// let store = MemoryStore::new(Arc::new(EntityRegistry::new()));
    /// let scripts = MemoryResourceLoader::new()
    ///     .with_script("one.lua", "value = 1")
    ///     .with_script("two.lua", "value = value + 1");
    /// let executor = ScriptExecutor::in_memory(&store).with_resource_loader(scripts);
    ///
    /// let variables = executor.load(["one.lua", "two.lua"]).unwrap();
    /// assert_eq!(variables["value"], Value::Integer(2));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a script, its resource or its
    /// transaction. Scripts after the failing one are not run.
    pub fn load<I, S>(&self, scripts: I) -> Result<Variables>
    where
        I: IntoIterator<Item = S>,
        S: Into<Script>,
    {
        let scripts: Vec<Script> = scripts.into_iter().map(Into::into).collect();
        self.load_namespaced(&scripts)
    }

    /// Loads script references in order and returns the accumulated variables.
    ///
    /// # Arguments
    ///
    /// * `scripts` - References to run in order; a namespaced reference
    ///   stores its outputs as a map under its namespace
    ///
    /// # Example
    ///
    /// ```
    /// use fixture_loader::{EntityRegistry, MemoryResourceLoader, MemoryStore, Script, ScriptExecutor, Value};
    /// use std::sync::Arc;
    ///
    /// let store = MemoryStore::new(Arc::new(EntityRegistry::new()));
    /// let scripts = MemoryResourceLoader::new()
    ///     .with_script("base.lua", "region = 'eu'")
    ///     .with_script("shop.lua", "region = 'us'; currency = 'USD'");
    /// let executor = ScriptExecutor::in_memory(&store).with_resource_loader(scripts);
    ///
    /// let variables = executor
    ///     .load_namespaced(&[Script::script("base.lua"), Script::with("shop.lua", "shop")])
    ///     .unwrap();
    /// assert_eq!(variables["region"], Value::from("eu"));
    /// assert_eq!(variables["shop"].as_map().unwrap()["region"], Value::from("us"));
    /// ```
    pub fn load_namespaced(&self, scripts: &[Script]) -> Result<Variables> {
        self.options.validate()?;
        let _depth = LoadDepth::enter(&self.load_depth, self.options.max_load_depth, scripts)?;

        let mut variables = self.options.inputs.clone();
        for script in scripts {
            let outputs = self.run_script(script, &variables)?;
            match script.namespace() {
                Some(namespace) => {
                    variables.insert(namespace.to_string(), Value::Map(outputs));
                }
                None => variables.extend(outputs),
            }
        }
        Ok(variables)
    }

    /// Runs one script with `variables` bound and returns what it defined.
    fn run_script(&self, script: &Script, variables: &Variables) -> Result<Variables> {
        let start_time = Instant::now();
        let location = self.options.resolve(script.name());
        log::debug!("Loading fixture script {} from {}", script, location.display());

        let lua = Lua::new();
        let mut binding = NamespacedBinding::new(&lua);
        dsl::install(&lua, &binding, self)?;
        for (name, value) in variables {
            binding.set_variable(name, value)?;
        }
        binding.start_capture()?;

        let content = self.resources.load(&location)?;
        let result = self.transaction.run(|| self.execute(&lua, script.name(), &content));
        if let Err(e) = result {
            log::warn!("Fixture script {} failed: {}", script, e);
            return Err(e);
        }

        let outputs = binding.namespaced_variables()?;
        log::info!(
            "Fixture script {} executed successfully in {:?} ({} variable(s) captured)",
            script,
            start_time.elapsed(),
            outputs.len()
        );
        Ok(outputs)
    }

    /// Evaluates script text against the globals of `lua`.
    fn execute(&self, lua: &Lua, name: &str, content: &str) -> Result<()> {
        lua.load(content).set_name(name).exec()?;
        Ok(())
    }
}

/// Counts nested `load` calls for as long as it is alive.
struct LoadDepth<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> LoadDepth<'a> {
    fn enter(counter: &'a AtomicUsize, max: usize, scripts: &[Script]) -> Result<Self> {
        let depth = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if depth > max {
            counter.fetch_sub(1, Ordering::SeqCst);
            let names: Vec<String> = scripts.iter().map(ToString::to_string).collect();
            return Err(Error::usage(format!(
                "load() nested deeper than {} levels while loading [{}]; do the scripts load each other?",
                max,
                names.join(", ")
            )));
        }
        Ok(Self { counter })
    }
}

impl Drop for LoadDepth<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
