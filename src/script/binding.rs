//! Namespaced binding environment over a Lua globals table.
//!
//! Before a script runs, the DSL functions, the entity types and the input
//! variables are bound into its globals. [`NamespacedBinding::start_capture`]
//! then moves every existing binding into a fallback table reachable through
//! the `__index` metamethod of the globals, leaving the globals themselves
//! empty:
//!
//! ```text
//! before capture    _G = { print, table, row, User, env, ... }
//! after capture     _G = {}  --__index-->  { print, table, row, User, env, ... }
//! script runs       _G = { users, env }    (reads fall through, writes land in _G)
//! ```
//!
//! Every assignment a script makes, including one to a name that was already
//! bound, becomes a raw key of the globals. Those keys are the script's
//! outputs, returned by [`NamespacedBinding::namespaced_variables`].

use crate::script::convert::{from_lua, to_lua};
use crate::value::{Value, Variables};
use crate::{Error, Result};
use mlua::{Lua, Table};
use std::collections::HashSet;

/// The variable scope one script executes against.
pub struct NamespacedBinding<'lua> {
    lua: &'lua Lua,
    globals: Table<'lua>,
    prepopulated: Option<Table<'lua>>,
}

impl<'lua> NamespacedBinding<'lua> {
    /// Wraps the globals of `lua`.
    pub fn new(lua: &'lua Lua) -> Self {
        Self { lua, globals: lua.globals(), prepopulated: None }
    }

    /// Binds `name` to `value`, replacing any previous binding.
    ///
    /// After capture has started the binding counts as a script output.
    pub fn set_variable(&self, name: &str, value: &Value) -> Result<()> {
        self.set_lua_variable(name, to_lua(self.lua, value)?)
    }

    /// Binds `name` to a Lua value such as a DSL function.
    pub fn set_lua_variable(&self, name: &str, value: mlua::Value<'lua>) -> Result<()> {
        self.globals.raw_set(name, value)?;
        Ok(())
    }

    /// Returns the names currently visible, bound before or after capture.
    pub fn variable_names(&self) -> Result<HashSet<String>> {
        let mut names = HashSet::new();
        for table in self.prepopulated.iter().chain(std::iter::once(&self.globals)) {
            for pair in table.clone().pairs::<mlua::Value<'lua>, mlua::Value<'lua>>() {
                if let (mlua::Value::String(name), _) = pair? {
                    names.insert(name.to_string_lossy().into_owned());
                }
            }
        }
        Ok(names)
    }

    /// Moves the current bindings behind the globals' `__index` so that
    /// only assignments made from now on are captured.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if capture was already started.
    pub fn start_capture(&mut self) -> Result<()> {
        if self.prepopulated.is_some() {
            return Err(Error::invalid_state("variable capture already started"));
        }

        let prepopulated = self.lua.create_table()?;
        let mut keys = Vec::new();
        for pair in self.globals.clone().pairs::<mlua::Value<'lua>, mlua::Value<'lua>>() {
            let (key, value) = pair?;
            prepopulated.raw_set(key.clone(), value)?;
            keys.push(key);
        }
        for key in keys {
            self.globals.raw_set(key, mlua::Value::Nil)?;
        }

        let metatable = self.lua.create_table()?;
        metatable.raw_set("__index", prepopulated.clone())?;
        self.globals.set_metatable(Some(metatable));
        self.prepopulated = Some(prepopulated);
        Ok(())
    }

    /// Returns every visible variable that holds data. Values assigned since
    /// capture started shadow the prepopulated ones.
    pub fn variables(&self) -> Result<Variables> {
        let mut variables = Variables::new();
        if let Some(prepopulated) = &self.prepopulated {
            collect(prepopulated, &mut variables)?;
        }
        collect(&self.globals, &mut variables)?;
        Ok(variables)
    }

    /// Returns the variables assigned since [`start_capture`](Self::start_capture).
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if capture was never started.
    pub fn namespaced_variables(&self) -> Result<Variables> {
        if self.prepopulated.is_none() {
            return Err(Error::invalid_state("variable capture was not started"));
        }
        let mut variables = Variables::new();
        collect(&self.globals, &mut variables)?;
        Ok(variables)
    }
}

fn collect<'lua>(table: &Table<'lua>, variables: &mut Variables) -> Result<()> {
    for pair in table.clone().pairs::<mlua::Value<'lua>, mlua::Value<'lua>>() {
        let (key, value) = pair?;
        let name = match key {
            mlua::Value::String(name) => name.to_string_lossy().into_owned(),
            _ => continue,
        };
        match from_lua(&value)? {
            Some(value) => {
                variables.insert(name, value);
            }
            None => log::debug!("Not capturing '{}': a {} is not data", name, value.type_name()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_excludes_untouched_names() {
        let lua = Lua::new();
        let mut binding = NamespacedBinding::new(&lua);
        binding.set_variable("env", &Value::from("test")).unwrap();
        binding.set_variable("region", &Value::from("eu")).unwrap();
        binding.start_capture().unwrap();

        lua.load("user_count = 2; label = env .. '-' .. region; local hidden = 1").exec().unwrap();

        let captured = binding.namespaced_variables().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured["user_count"], Value::Integer(2));
        assert_eq!(captured["label"], Value::from("test-eu"));
    }

    #[test]
    fn test_capture_includes_redefined_names() {
        let lua = Lua::new();
        let mut binding = NamespacedBinding::new(&lua);
        binding.set_variable("env", &Value::from("test")).unwrap();
        binding.set_variable("count", &Value::from(1)).unwrap();
        binding.start_capture().unwrap();

        lua.load("env = 'prod'; count = count + 1").exec().unwrap();

        let captured = binding.namespaced_variables().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured["env"], Value::from("prod"));
        assert_eq!(captured["count"], Value::Integer(2));
        assert_eq!(binding.variables().unwrap()["env"], Value::from("prod"));
    }

    #[test]
    fn test_prepopulated_names_still_readable() {
        let lua = Lua::new();
        let mut binding = NamespacedBinding::new(&lua);
        binding.set_variable("ids", &Value::List(vec![Value::from(4), Value::from(5)])).unwrap();
        binding.start_capture().unwrap();

        lua.load("total = 0 for _, id in ipairs(ids) do total = total + id end n = #_G.ids")
            .exec()
            .unwrap();

        let captured = binding.namespaced_variables().unwrap();
        assert_eq!(captured["total"], Value::Integer(9));
        assert_eq!(captured["n"], Value::Integer(2));
        assert!(!captured.contains_key("ids"));
    }

    #[test]
    fn test_capture_skips_functions() {
        let lua = Lua::new();
        let mut binding = NamespacedBinding::new(&lua);
        binding.start_capture().unwrap();

        lua.load("function helper() end; name = 'x'").exec().unwrap();

        let captured = binding.namespaced_variables().unwrap();
        assert_eq!(captured.keys().collect::<Vec<_>>(), ["name"]);
    }

    #[test]
    fn test_capture_must_start_once() {
        let lua = Lua::new();
        let mut binding = NamespacedBinding::new(&lua);
        assert!(matches!(binding.namespaced_variables(), Err(Error::InvalidState(_))));

        binding.start_capture().unwrap();
        assert!(matches!(binding.start_capture(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_variables_includes_inputs() {
        let lua = Lua::new();
        let mut binding = NamespacedBinding::new(&lua);
        binding.set_variable("env", &Value::from("test")).unwrap();

        let all = binding.variables().unwrap();
        assert_eq!(all["env"], Value::from("test"));
        assert!(binding.variable_names().unwrap().contains("print"));

        binding.start_capture().unwrap();
        assert_eq!(binding.variables().unwrap()["env"], Value::from("test"));
        assert!(binding.variable_names().unwrap().contains("print"));
    }
}
