//! Conversions between Lua values and [`Value`].
//!
//! Entities and entity types cross into Lua as userdata; everything else maps
//! onto native Lua values. Going back, a table whose keys are exactly
//! `1..=n` (including the empty table) becomes a list and any other table a
//! map. Map keys are strings; integer keys are stored in their decimal form
//! and turned back into integer keys when the map is handed to Lua again.
//! Functions, coroutines and foreign userdata are not data and convert to
//! `None`.

use crate::entity::{Entity, EntityType};
use crate::value::{Value, Variables};
use crate::{Error, Result};
use mlua::{AnyUserData, Lua, MetaMethod, Table, UserData, UserDataMethods};
use std::sync::Arc;

/// Deepest table nesting accepted when reading script values.
pub const MAX_VALUE_DEPTH: usize = 64;

/// An entity exposed to Lua. Attributes are readable as fields.
#[derive(Debug, Clone)]
pub struct LuaEntity(pub Entity);

impl UserData for LuaEntity {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            match this.0.get(&key) {
                Some(value) => to_lua(lua, value),
                None => Ok(mlua::Value::Nil),
            }
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.0.to_string()));
    }
}

/// An entity type exposed to Lua as a global named after the type.
#[derive(Debug, Clone)]
pub struct LuaEntityType(pub Arc<EntityType>);

impl UserData for LuaEntityType {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            match key.as_str() {
                "name" => Ok(mlua::Value::String(lua.create_string(this.0.name())?)),
                "id_attribute" => Ok(mlua::Value::String(lua.create_string(this.0.id_name())?)),
                _ => Ok(mlua::Value::Nil),
            }
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.0.name().to_string()));
    }
}

/// Converts a value into a Lua value owned by `lua`.
pub fn to_lua<'lua>(lua: &'lua Lua, value: &Value) -> mlua::Result<mlua::Value<'lua>> {
    Ok(match value {
        Value::Nil => mlua::Value::Nil,
        Value::Bool(b) => mlua::Value::Boolean(*b),
        Value::Integer(i) => mlua::Value::Integer(*i),
        Value::Number(n) => mlua::Value::Number(*n),
        Value::String(s) => mlua::Value::String(lua.create_string(s)?),
        Value::List(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, to_lua(lua, item)?)?;
            }
            mlua::Value::Table(table)
        }
        Value::Map(map) => {
            let table = lua.create_table()?;
            for (key, item) in map {
                match key.parse::<i64>() {
                    Ok(index) if index.to_string() == *key => table.raw_set(index, to_lua(lua, item)?)?,
                    _ => table.raw_set(key.as_str(), to_lua(lua, item)?)?,
                }
            }
            mlua::Value::Table(table)
        }
        Value::Entity(entity) => entity_to_lua(lua, entity)?,
    })
}

/// Converts a variable map into a Lua table.
pub fn variables_to_table<'lua>(lua: &'lua Lua, variables: &Variables) -> mlua::Result<Table<'lua>> {
    let table = lua.create_table()?;
    for (name, value) in variables {
        table.raw_set(name.as_str(), to_lua(lua, value)?)?;
    }
    Ok(table)
}

/// Wraps an entity as Lua userdata.
pub fn entity_to_lua<'lua>(lua: &'lua Lua, entity: &Entity) -> mlua::Result<mlua::Value<'lua>> {
    Ok(mlua::Value::UserData(lua.create_userdata(LuaEntity(entity.clone()))?))
}

/// Converts a Lua value into a [`Value`], or `None` if it is not data.
pub fn from_lua<'lua>(value: &mlua::Value<'lua>) -> Result<Option<Value>> {
    convert(value, &mut Vec::new())
}

fn convert<'lua>(value: &mlua::Value<'lua>, ancestors: &mut Vec<Table<'lua>>) -> Result<Option<Value>> {
    Ok(match value {
        mlua::Value::Nil => Some(Value::Nil),
        mlua::Value::Boolean(b) => Some(Value::Bool(*b)),
        mlua::Value::Integer(i) => Some(Value::Integer(*i)),
        mlua::Value::Number(n) => Some(Value::Number(*n)),
        mlua::Value::String(s) => Some(Value::String(s.to_string_lossy().into_owned())),
        mlua::Value::Table(table) => table_to_value(table, ancestors)?,
        mlua::Value::UserData(ud) => userdata_to_value(ud),
        _ => None,
    })
}

fn table_to_value<'lua>(
    table: &Table<'lua>,
    ancestors: &mut Vec<Table<'lua>>,
) -> Result<Option<Value>> {
    if ancestors.iter().any(|ancestor| ancestor == table) {
        log::debug!("Skipping self-referencing table");
        return Ok(None);
    }
    if ancestors.len() >= MAX_VALUE_DEPTH {
        return Err(Error::usage(format!(
            "table nesting exceeds {} levels",
            MAX_VALUE_DEPTH
        )));
    }

    let mut entries = Vec::new();
    for pair in table.clone().pairs::<mlua::Value<'lua>, mlua::Value<'lua>>() {
        entries.push(pair?);
    }

    ancestors.push(table.clone());
    let result = entries_to_value(table.raw_len(), &entries, ancestors);
    ancestors.pop();
    result.map(Some)
}

fn entries_to_value<'lua>(
    len: usize,
    entries: &[(mlua::Value<'lua>, mlua::Value<'lua>)],
    ancestors: &mut Vec<Table<'lua>>,
) -> Result<Value> {
    let sequence_index = |key: &mlua::Value<'lua>| match key {
        mlua::Value::Integer(i) if *i >= 1 && (*i as usize) <= len => Some(*i as usize - 1),
        _ => None,
    };

    if entries.len() == len && entries.iter().all(|(k, _)| sequence_index(k).is_some()) {
        let mut items = vec![Value::Nil; len];
        for (key, value) in entries {
            if let Some(index) = sequence_index(key) {
                items[index] = convert(value, ancestors)?.unwrap_or_default();
            }
        }
        return Ok(Value::List(items));
    }

    let mut map = Variables::new();
    for (key, value) in entries {
        let key = match key {
            mlua::Value::String(s) => s.to_string_lossy().into_owned(),
            mlua::Value::Integer(i) => i.to_string(),
            other => {
                log::debug!("Skipping table entry with {} key", other.type_name());
                continue;
            }
        };
        match convert(value, ancestors)? {
            Some(value) => {
                map.insert(key, value);
            }
            None => log::debug!("Skipping table entry '{}' holding a {}", key, value.type_name()),
        }
    }
    Ok(Value::Map(map))
}

fn userdata_to_value(ud: &AnyUserData<'_>) -> Option<Value> {
    if let Ok(entity) = ud.borrow::<LuaEntity>() {
        return Some(Value::Entity(entity.0.clone()));
    }
    if let Ok(entity_type) = ud.borrow::<LuaEntityType>() {
        return Some(Value::String(entity_type.0.name().to_string()));
    }
    None
}
