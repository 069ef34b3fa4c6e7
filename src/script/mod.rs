//! Lua fixture scripts.
//!
//! Fixture scripts are Lua programs that create persistent entities through a
//! small DSL and expose whatever they bind as globals to the caller.
//!
//! # Architecture
//!
//! - **ScriptExecutor**: runs scripts, each in a fresh Lua state and its own
//!   transaction, and threads their outputs forward
//! - **NamespacedBinding**: tracks which globals a script assigned
//! - **ContextStack**: nests the `table(...)` blocks `row(...)` writes into
//! - **convert**: moves values and entities across the Lua boundary
//!
//! # Example
//!
//! ```rust
//! use fixture_loader::{EntityRegistry, EntityType, MemoryResourceLoader, MemoryStore, ScriptExecutor};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), fixture_loader::Error> {
//! let types = EntityRegistry::new().with(EntityType::new("User").attribute("name"));
//! let store = MemoryStore::new(Arc::new(types));
//!
//! let scripts = MemoryResourceLoader::new()
//!     .with_script("users.lua", r#"
//!         admins = table(User, {"name"}, function()
//!             root = row("root")
//!         end)
//!     "#)
//!     .with_script("audit.lua", r#"owner = root.name"#);
//!
//! let executor = ScriptExecutor::in_memory(&store).with_resource_loader(scripts);
//! let variables = executor.load(["users.lua", "audit.lua"])?;
//!
//! assert_eq!(variables["owner"].as_str(), Some("root"));
//! assert_eq!(store.count("User"), 1);
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod context;
pub mod convert;
mod dsl;
pub mod executor;
pub mod reference;

pub use binding::NamespacedBinding;
pub use context::{ContextStack, EntityCreationContext};
pub use executor::ScriptExecutor;
pub use reference::Script;
