//! Example: Seeding Fixtures from Lua Scripts
//!
//! This example loads a small batch of fixture scripts into an in-memory
//! store, shows how namespaced loads nest their outputs, and how a failing
//! script rolls back everything it created.
//!
//! Run with `RUST_LOG=debug` to see each script being loaded.

use fixture_loader::{
    EntityRegistry, EntityType, LoaderOptions, MemoryResourceLoader, MemoryStore, Script,
    ScriptExecutor,
};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("=== Fixture Loader Example ===\n");

    let types = EntityRegistry::new()
        .with(EntityType::new("User").attributes(["name", "email"]))
        .with(EntityType::new("Order").attributes(["owner", "total"]).default_value("total", 0));
    let store = MemoryStore::new(Arc::new(types));

    let scripts = MemoryResourceLoader::new()
        .with_script(
            "fixtures/users.lua",
            r#"
            users = table(User, {"name", "email"}, function()
                alice = row("Alice", "alice@" .. domain)
                bob = row("Bob", "bob@" .. domain)
            end)
            "#,
        )
        .with_script(
            "fixtures/orders.lua",
            r#"
            orders = table(Order, {"owner", "total"}, function()
                row(alice.id, 120.5)
                row(bob.id)
            end)
            first_owner = find(User, alice.id)
            "#,
        )
        .with_script(
            "fixtures/broken.lua",
            r#"
            table(User, {"name"}, function()
                row("Mallory")
                error("refusing to seed Mallory")
            end)
            "#,
        );

    let executor = ScriptExecutor::in_memory(&store).with_resource_loader(scripts).with_options(
        LoaderOptions::new().script_directory("fixtures").input("domain", "example.com"),
    );

    // Example 1: flat batch, outputs merge into one map
    println!("Example 1: Flat batch");
    println!("-----------------------------------");
    let variables = executor.load(["users.lua", "orders.lua"])?;
    for (name, value) in &variables {
        println!("  {} = {}", name, value);
    }
    println!("  Users stored: {}, orders stored: {}\n", store.count("User"), store.count("Order"));

    // Example 2: namespaced batch, outputs nest under their labels
    println!("Example 2: Namespaced batch");
    println!("-----------------------------------");
    let variables = executor.load([Script::with("users.lua", "staff")])?;
    println!("{}\n", serde_json::to_string_pretty(&variables)?);

    // Example 3: failing script, its rows are rolled back
    println!("Example 3: Failing script");
    println!("-----------------------------------");
    let before = store.count("User");
    match executor.load(["broken.lua"]) {
        Ok(_) => println!("  Unexpected success"),
        Err(e) => println!("  Script failed: {}", e),
    }
    println!("  Users before: {}, after: {}", before, store.count("User"));
    println!("  Commits: {}, rollbacks: {}", store.commit_count(), store.rollback_count());

    Ok(())
}
