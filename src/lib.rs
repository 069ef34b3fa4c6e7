//! # fixture-loader - Lua Fixture Scripts for Entity Persistence
//!
//! fixture-loader populates a persistence layer with test or seed data
//! described in Lua scripts. Scripts create entities through a small DSL,
//! bind whatever they want to hand on as globals, and can load other scripts.
//!
//! ## Architecture
//!
//! The loader consists of several key components:
//!
//! - **ScriptExecutor**: Runs scripts in order, one Lua state and one
//!   transaction per script, and threads captured variables forward
//! - **DSL**: `table`, `row`, `find` and `load`, bound into every script
//! - **Entity model**: Entity types with declared attributes and the
//!   entities instantiated from them
//! - **Persistence seams**: The [`Dao`], [`DaoRegistry`] and [`Transaction`]
//!   traits, with [`MemoryStore`] as an in-process implementation
//! - **Resources**: Script text comes from a [`ResourceLoader`], either the
//!   filesystem or an in-memory map
//!
//! ## Example Usage
//!
//! ```rust
//! use fixture_loader::{EntityRegistry, EntityType, MemoryResourceLoader, MemoryStore, ScriptExecutor, Value};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), fixture_loader::Error> {
//! // Declare the entity types scripts may create
//! let types = EntityRegistry::new().with(EntityType::new("User").attributes(["name", "age"]));
//! let store = MemoryStore::new(Arc::new(types));
//!
//! let scripts = MemoryResourceLoader::new().with_script(
//!     "users.lua",
//!     r#"
//!         table(User, {"name", "age"}, function()
//!             alice = row("Alice", 30)
//!         end)
//!         alice_again = find(User, alice.id)
//!     "#,
//! );
//!
//! // Run the script and read back what it bound
//! let executor = ScriptExecutor::in_memory(&store).with_resource_loader(scripts);
//! let variables = executor.load(["users.lua"])?;
//!
//! let alice = variables["alice"].as_entity().unwrap();
//! assert_eq!(alice.get("name"), Some(&Value::from("Alice")));
//! assert_eq!(variables["alice_again"], variables["alice"]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod dao;
pub mod entity;
pub mod error;
pub mod resource;
pub mod script;
pub mod store;
pub mod value;

// Re-exports
pub use config::LoaderOptions;
pub use dao::{Dao, DaoRegistry, Transaction};
pub use entity::{Entity, EntityRegistry, EntityType};
pub use error::{Error, Result};
pub use resource::{FileResourceLoader, MemoryResourceLoader, ResourceLoader};
pub use script::{Script, ScriptExecutor};
pub use store::{EntityId, MemoryDao, MemoryStore};
pub use value::{Value, Variables};
