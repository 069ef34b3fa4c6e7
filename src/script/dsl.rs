//! The fixture DSL: `table`, `row`, `find` and `load`.
//!
//! These four functions are the only way a script touches persistence. They
//! are bound into every script's globals before capture starts, each closing
//! over a clone of the [`ScriptExecutor`] that runs the script.
//!
//! ```lua
//! users = table(User, {"name", "age"}, function()
//!     alice = row("Alice", 30)
//!     row("Bob", 25)
//! end)
//! again = find(User, alice.id)
//! shared = load({ orders = "orders.lua" })
//! ```
//!
//! `table` shadows Lua's table library by name only: the library table stays
//! in place and the DSL function is its `__call` metamethod, so
//! `table.insert(...)` keeps working.

use crate::entity::{Entity, EntityType};
use crate::script::binding::NamespacedBinding;
use crate::script::context::ContextFrame;
use crate::script::convert::{entity_to_lua, from_lua, variables_to_table, LuaEntityType};
use crate::script::executor::ScriptExecutor;
use crate::script::reference::Script;
use crate::value::Value;
use crate::{Error, Result};
use mlua::{Lua, Variadic};
use std::sync::Arc;

const TABLE_USAGE: &str =
    "table() expects an entity type, a list of attribute names and a function";
const FIND_USAGE: &str = "find() expects an entity type and an identifier";
const LOAD_USAGE: &str =
    "load() expects a map of namespace to script name, or one or more script names";

impl ScriptExecutor {
    /// Opens an entity creation context for `entity_type`, runs `block` and
    /// returns the entities created by `row` calls inside it.
    ///
    /// The context is closed on every exit path.
    ///
    /// # Arguments
    ///
    /// * `entity_type` - Type of the entities created in the block
    /// * `attributes` - Attribute names `row` values are paired with
    /// * `block` - Work run while the context is open
    ///
    /// # Example
    ///
    /// ```
    /// use fixture_loader::{EntityRegistry, EntityType, MemoryStore, ScriptExecutor, Value};
    /// use std::sync::Arc;
    ///
    /// let types = EntityRegistry::new().with(EntityType::new("User").attributes(["name", "age"]));
    /// let store = MemoryStore::new(Arc::new(types));
    /// let executor = ScriptExecutor::in_memory(&store);
    /// let user = executor.entity_types().require("User").unwrap();
    ///
    /// let users = executor
    ///     .table(user, vec!["name".to_string(), "age".to_string()], || {
    ///         executor.row(vec![Value::from("Alice"), Value::from(30)])?;
    ///         executor.row(vec![Value::from("Bob")])?;
    ///         Ok(())
    ///     })
    ///     .unwrap();
    /// assert_eq!(users.len(), 2);
    /// assert_eq!(users[1].get("age"), Some(&Value::Nil));
    /// ```
    pub fn table<F>(
        &self,
        entity_type: Arc<EntityType>,
        attributes: Vec<String>,
        block: F,
    ) -> Result<Vec<Entity>>
    where
        F: FnOnce() -> Result<()>,
    {
        if let Some(unknown) = attributes.iter().find(|name| !entity_type.has_attribute(name)) {
            return Err(Error::usage(format!(
                "table() lists attribute '{}', which {} does not declare",
                unknown,
                entity_type.name()
            )));
        }

        let frame = ContextFrame::enter(self.stack(), entity_type, attributes);
        block()?;
        let context =
            frame.finish().ok_or_else(|| Error::invalid_state("entity context stack is empty"))?;
        Ok(context.into_created())
    }

    /// Creates and persists one entity of the active context's type, pairing
    /// `values` positionally with the context's attribute names.
    ///
    /// Attributes without a value keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a usage error if no [`table`](Self::table) block is open or
    /// if there are more values than attribute names, and an instantiation
    /// error if the active type is abstract.
    pub fn row(&self, values: Vec<Value>) -> Result<Entity> {
        let (entity_type, attributes) = {
            let stack = self.stack().lock();
            let context = stack
                .peek()
                .ok_or_else(|| Error::usage("row() must be called inside a table() block"))?;
            (Arc::clone(context.entity_type()), context.attributes().to_vec())
        };

        if values.len() > attributes.len() {
            return Err(Error::usage(format!(
                "row() got {} value(s) but the {} table declares {} attribute(s)",
                values.len(),
                entity_type.name(),
                attributes.len()
            )));
        }

        let mut instance = entity_type.instantiate()?;
        for (name, value) in attributes.iter().zip(values) {
            instance.set(name, value)?;
        }
        let created = self.dao_registry().get_for(&instance)?.create(instance)?;

        let mut stack = self.stack().lock();
        let context = stack
            .peek_mut()
            .ok_or_else(|| Error::invalid_state("entity context closed while creating a row"))?;
        context.push_created(created.clone());
        Ok(created)
    }

    /// Looks up a persisted entity. An unknown identifier is `Ok(None)`.
    pub fn find(&self, entity_type: &EntityType, id: &Value) -> Result<Option<Entity>> {
        self.dao_registry().get(entity_type.name())?.find_by_id(id)
    }
}

/// Binds the entity types and the DSL functions into a script's globals.
pub(crate) fn install<'lua>(
    lua: &'lua Lua,
    binding: &NamespacedBinding<'lua>,
    executor: &ScriptExecutor,
) -> Result<()> {
    for entity_type in executor.entity_types().iter() {
        let userdata = lua.create_userdata(LuaEntityType(Arc::clone(entity_type)))?;
        binding.set_lua_variable(entity_type.name(), mlua::Value::UserData(userdata))?;
    }

    let table_library = match lua.globals().raw_get::<_, mlua::Value<'_>>("table")? {
        mlua::Value::Table(library) => library,
        _ => lua.create_table()?,
    };
    let metatable = lua.create_table()?;
    let ex = executor.clone();
    metatable.raw_set(
        "__call",
        lua.create_function(move |lua, args| table_call(&ex, lua, args))?,
    )?;
    table_library.set_metatable(Some(metatable));
    binding.set_lua_variable("table", mlua::Value::Table(table_library))?;

    let ex = executor.clone();
    let row = lua.create_function(move |lua, args| row_call(&ex, lua, args))?;
    binding.set_lua_variable("row", mlua::Value::Function(row))?;

    let ex = executor.clone();
    let find = lua.create_function(move |lua, args| find_call(&ex, lua, args))?;
    binding.set_lua_variable("find", mlua::Value::Function(find))?;

    let ex = executor.clone();
    let load = lua.create_function(move |lua, args| load_call(&ex, lua, args))?;
    binding.set_lua_variable("load", mlua::Value::Function(load))?;

    Ok(())
}

fn table_call<'lua>(
    executor: &ScriptExecutor,
    lua: &'lua Lua,
    args: Variadic<mlua::Value<'lua>>,
) -> mlua::Result<mlua::Value<'lua>> {
    // The first argument is the table library the call was made on.
    let args = args.get(1..).unwrap_or(&[]);
    if args.len() != 3 {
        return Err(Error::usage(format!("{}; got {} argument(s)", TABLE_USAGE, args.len())).into());
    }

    let entity_type = entity_type_arg(executor, &args[0], TABLE_USAGE)?;
    let attributes = attribute_names_arg(&args[1])?;
    let block = match &args[2] {
        mlua::Value::Function(block) => block.clone(),
        other => {
            return Err(Error::usage(format!(
                "{}; the third argument is a {}",
                TABLE_USAGE,
                other.type_name()
            ))
            .into())
        }
    };

    let created = executor.table(entity_type, attributes, || {
        block.call::<_, ()>(())?;
        Ok(())
    })?;

    let result = lua.create_table()?;
    for (i, entity) in created.iter().enumerate() {
        result.raw_set(i + 1, entity_to_lua(lua, entity)?)?;
    }
    Ok(mlua::Value::Table(result))
}

fn row_call<'lua>(
    executor: &ScriptExecutor,
    lua: &'lua Lua,
    args: Variadic<mlua::Value<'lua>>,
) -> mlua::Result<mlua::Value<'lua>> {
    let values = args
        .iter()
        .enumerate()
        .map(|(i, arg)| -> Result<Value> {
            from_lua(arg)?.ok_or_else(|| {
                Error::usage(format!("row() value {} is a {}, not data", i + 1, arg.type_name()))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let entity = executor.row(values)?;
    entity_to_lua(lua, &entity)
}

fn find_call<'lua>(
    executor: &ScriptExecutor,
    lua: &'lua Lua,
    args: Variadic<mlua::Value<'lua>>,
) -> mlua::Result<mlua::Value<'lua>> {
    if args.len() != 2 {
        return Err(Error::usage(format!("{}; got {} argument(s)", FIND_USAGE, args.len())).into());
    }

    let entity_type = entity_type_arg(executor, &args[0], FIND_USAGE)?;
    let id = from_lua(&args[1])?.ok_or_else(|| {
        Error::usage(format!("{}; the identifier is a {}", FIND_USAGE, args[1].type_name()))
    })?;

    match executor.find(&entity_type, &id)? {
        Some(entity) => entity_to_lua(lua, &entity),
        None => Ok(mlua::Value::Nil),
    }
}

fn load_call<'lua>(
    executor: &ScriptExecutor,
    lua: &'lua Lua,
    args: Variadic<mlua::Value<'lua>>,
) -> mlua::Result<mlua::Value<'lua>> {
    let scripts = load_args(&args)?;
    // Loaded scripts open their own table() blocks; row() there must not
    // reach into the caller's open context.
    let variables = executor.with_fresh_context().load_namespaced(&scripts)?;
    Ok(mlua::Value::Table(variables_to_table(lua, &variables)?))
}

/// Interprets `load()` arguments as script references.
fn load_args(args: &[mlua::Value<'_>]) -> Result<Vec<Script>> {
    let first = args.first().ok_or_else(|| Error::usage(LOAD_USAGE))?;

    match first {
        mlua::Value::Table(_) => {
            if args.len() > 1 {
                return Err(Error::usage(format!("{}; got a table plus extra arguments", LOAD_USAGE)));
            }
            match from_lua(first)? {
                Some(Value::Map(scripts)) => scripts
                    .into_iter()
                    .map(|(namespace, name)| match name {
                        Value::String(name) => Ok(Script::with(name, namespace)),
                        other => Err(Error::usage(format!(
                            "{}; the script for namespace '{}' is a {}",
                            LOAD_USAGE,
                            namespace,
                            other.kind()
                        ))),
                    })
                    .collect(),
                Some(Value::List(names)) => names.iter().map(script_name).collect(),
                _ => Err(Error::usage(LOAD_USAGE)),
            }
        }
        mlua::Value::String(_) => args
            .iter()
            .map(|arg| match arg {
                mlua::Value::String(name) => Ok(Script::script(name.to_string_lossy().into_owned())),
                other => Err(Error::usage(format!(
                    "{}; got a {} among the script names",
                    LOAD_USAGE,
                    other.type_name()
                ))),
            })
            .collect(),
        other => Err(Error::usage(format!("{}; got a {}", LOAD_USAGE, other.type_name()))),
    }
}

fn script_name(value: &Value) -> Result<Script> {
    match value {
        Value::String(name) => Ok(Script::script(name.as_str())),
        other => Err(Error::usage(format!(
            "{}; got a {} among the script names",
            LOAD_USAGE,
            other.kind()
        ))),
    }
}

/// Accepts an installed entity type global or the name of a registered type.
fn entity_type_arg(
    executor: &ScriptExecutor,
    value: &mlua::Value<'_>,
    usage: &str,
) -> Result<Arc<EntityType>> {
    match value {
        mlua::Value::UserData(userdata) => match userdata.borrow::<LuaEntityType>() {
            Ok(entity_type) => Ok(Arc::clone(&entity_type.0)),
            Err(_) => Err(Error::usage(format!("{}; the entity type is foreign userdata", usage))),
        },
        mlua::Value::String(name) => {
            let name = name.to_string_lossy();
            executor
                .entity_types()
                .get(&name)
                .ok_or_else(|| Error::usage(format!("unknown entity type '{}'", name)))
        }
        other => Err(Error::usage(format!("{}; the entity type is a {}", usage, other.type_name()))),
    }
}

fn attribute_names_arg(value: &mlua::Value<'_>) -> Result<Vec<String>> {
    let invalid = || Error::usage(format!("{}; attribute names must be a list of strings", TABLE_USAGE));
    match value {
        mlua::Value::Table(_) => match from_lua(value)? {
            Some(Value::List(names)) => names
                .into_iter()
                .map(|name| match name {
                    Value::String(name) => Ok(name),
                    _ => Err(invalid()),
                })
                .collect(),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}
