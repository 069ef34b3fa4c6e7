// End-to-End Tests for fixture-loader
// These tests run fixture scripts from disk against an in-memory store and
// verify captured variables, persisted entities and transaction behavior.

use fixture_loader::{
    Dao, EntityRegistry, EntityType, Error, FileResourceLoader, LoaderOptions, MemoryStore, Script,
    ScriptExecutor, Value, Variables,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn entity_types() -> EntityRegistry {
    EntityRegistry::new()
        .with(EntityType::new("User").attributes(["name", "age"]))
        .with(EntityType::new("Order").attributes(["total", "owner"]))
        .with(EntityType::new("Account").attribute("name").abstract_type())
}

/// Writes `scripts` into a fresh directory and returns an executor reading from it.
fn setup(scripts: &[(&str, &str)]) -> (TempDir, MemoryStore, ScriptExecutor) {
    init_logging();
    let dir = TempDir::new().unwrap();
    for (name, body) in scripts {
        fs::write(dir.path().join(name), body).unwrap();
    }

    let store = MemoryStore::new(Arc::new(entity_types()));
    let executor = ScriptExecutor::in_memory(&store)
        .with_resource_loader(FileResourceLoader)
        .with_options(LoaderOptions::new().script_directory(dir.path()));
    (dir, store, executor)
}

/// Test the canonical inputs-plus-table scenario
#[test]
fn test_e2e_inputs_and_table() {
    let (_dir, store, mut executor) = setup(&[(
        "users.lua",
        r#"
        users = table(User, {"name"}, function()
            alice = row("alice")
        end)
        label = env
        "#,
    )]);
    let mut inputs = Variables::new();
    inputs.insert("env".to_string(), Value::from("test"));
    executor.set_inputs(inputs);

    let variables = executor.load(["users.lua"]).unwrap();

    assert_eq!(variables["env"], Value::from("test"));
    assert_eq!(variables["label"], Value::from("test"));
    let alice = variables["alice"].as_entity().unwrap();
    assert_eq!(alice.get("name"), Some(&Value::from("alice")));
    assert_eq!(variables["users"], Value::List(vec![Value::Entity(alice.clone())]));
    assert_eq!(store.count("User"), 1);
    assert_eq!(executor.context_depth(), 0);
}

/// Test row() pairs values with the declared attributes
#[test]
fn test_e2e_row_values() {
    let (_dir, store, executor) = setup(&[(
        "users.lua",
        r#"
        users = table(User, {"name", "age"}, function()
            row("Alice", 30)
        end)
        "#,
    )]);

    let variables = executor.load(["users.lua"]).unwrap();
    let users = variables["users"].as_list().unwrap();
    assert_eq!(users.len(), 1);

    let alice = users[0].as_entity().unwrap();
    assert_eq!(alice.entity_type(), "User");
    assert_eq!(alice.get("name"), Some(&Value::from("Alice")));
    assert_eq!(alice.get("age"), Some(&Value::Integer(30)));

    let persisted = store.dao("User").unwrap();
    let id = alice.get("id").unwrap();
    assert_eq!(persisted.find_by_id(id).unwrap().as_ref(), Some(alice));
}

/// Test namespaced and flat outputs side by side
#[test]
fn test_e2e_namespacing() {
    let (_dir, _store, executor) = setup(&[("a.lua", "shared = 'a'; only_a = 1"), ("b.lua", "shared = 'b'")]);

    let variables = executor
        .load([Script::script("a.lua"), Script::with("b.lua", "b")])
        .unwrap();

    assert_eq!(variables.len(), 3);
    assert_eq!(variables["shared"], Value::from("a"));
    assert_eq!(variables["only_a"], Value::Integer(1));
    let mut expected = Variables::new();
    expected.insert("shared".to_string(), Value::from("b"));
    assert_eq!(variables["b"], Value::Map(expected));
}

/// Test last-write-wins across flat scripts
#[test]
fn test_e2e_last_write_wins() {
    let (_dir, _store, executor) = setup(&[("one.lua", "value = 1"), ("two.lua", "value = 2")]);

    let variables = executor.load(["one.lua", "two.lua"]).unwrap();
    assert_eq!(variables["value"], Value::Integer(2));

    let variables = executor.load(["two.lua", "one.lua"]).unwrap();
    assert_eq!(variables["value"], Value::Integer(1));
}

/// Test later scripts see earlier entities
#[test]
fn test_e2e_entities_flow_between_scripts() {
    let (_dir, store, executor) = setup(&[
        ("users.lua", "table(User, {'name'}, function() bob = row('bob') end)"),
        (
            "orders.lua",
            r#"
            orders = table(Order, {"total", "owner"}, function()
                row(10, bob.name)
                row(20.5, bob.name)
            end)
            owner = find(User, bob.id)
            "#,
        ),
    ]);

    let variables = executor.load(["users.lua", "orders.lua"]).unwrap();
    assert_eq!(variables["owner"], variables["bob"]);
    assert_eq!(variables["orders"].as_list().unwrap().len(), 2);
    assert_eq!(store.count("Order"), 2);
}

/// Test find() for an unknown id yields nil
#[test]
fn test_e2e_find_missing() {
    let (_dir, _store, executor) = setup(&[(
        "find.lua",
        r#"
        missing = find(User, 424242)
        is_missing = missing == nil
        "#,
    )]);

    let variables = executor.load(["find.lua"]).unwrap();
    assert!(!variables.contains_key("missing"));
    assert_eq!(variables["is_missing"], Value::Bool(true));
    assert_eq!(executor.context_depth(), 0);
}

/// Test a failing table block leaves no context and no entities behind
#[test]
fn test_e2e_failure_rolls_back() {
    let (_dir, store, executor) = setup(&[
        ("good.lua", "table(User, {'name'}, function() row('kept') end)"),
        (
            "bad.lua",
            r#"
            table(User, {"name"}, function()
                row("discarded")
                table(Order, {"total"}, function()
                    row(1)
                    error("order import failed")
                end)
            end)
            "#,
        ),
    ]);

    let err = executor.load(["good.lua", "bad.lua"]).unwrap_err();
    assert!(matches!(err, Error::Script(ref msg) if msg.contains("order import failed")));

    assert_eq!(executor.context_depth(), 0);
    assert_eq!(store.count("User"), 1);
    assert_eq!(store.count("Order"), 0);
    assert_eq!(store.commit_count(), 1);
    assert_eq!(store.rollback_count(), 1);
}

/// Test load() from a script, positional form
#[test]
fn test_e2e_nested_load() {
    let (_dir, store, executor) = setup(&[
        ("base.lua", "table(User, {'name'}, function() admin = row('admin') end)"),
        (
            "main.lua",
            r#"
            local base = load("base.lua")
            admin_name = base.admin.name
            "#,
        ),
    ]);

    let variables = executor.load(["main.lua"]).unwrap();
    assert_eq!(variables["admin_name"], Value::from("admin"));
    assert!(!variables.contains_key("admin"));
    assert_eq!(store.count("User"), 1);
}

/// Test load() from a script, namespace map form
#[test]
fn test_e2e_nested_load_namespaced() {
    let (_dir, _store, executor) = setup(&[
        ("a.lua", "x = 1"),
        ("b.lua", "x = 2"),
        ("main.lua", "loaded = load({ first = 'a.lua', second = 'b.lua' })"),
    ]);

    let variables = executor.load(["main.lua"]).unwrap();
    let loaded = variables["loaded"].as_map().unwrap();
    assert_eq!(loaded["first"].as_map().unwrap()["x"], Value::Integer(1));
    assert_eq!(loaded["second"].as_map().unwrap()["x"], Value::Integer(2));
}

/// Test a script that loads itself stops at the depth limit
#[test]
fn test_e2e_cyclic_load() {
    let (_dir, _store, executor) = setup(&[("ping.lua", "load('pong.lua')"), ("pong.lua", "load('ping.lua')")]);
    let options = executor.options().clone().max_load_depth(8);
    let executor = executor.with_options(options);

    let err = executor.load(["ping.lua"]).unwrap_err();
    assert!(err.is_usage(), "unexpected error: {}", err);
    assert!(err.to_string().contains("nested deeper than 8"));
    assert_eq!(executor.context_depth(), 0);

    // The counter is released, so a fresh batch still runs
    let (_dir, _store, executor) = setup(&[("ok.lua", "x = 1")]);
    assert!(executor.load(["ok.lua"]).is_ok());
}

/// Test abstract entity types cannot be created
#[test]
fn test_e2e_abstract_type() {
    let (_dir, store, executor) = setup(&[("bad.lua", "table(Account, {'name'}, function() row('x') end)")]);

    match executor.load(["bad.lua"]).unwrap_err() {
        Error::Instantiation { entity_type, .. } => assert_eq!(entity_type, "Account"),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(store.count("Account"), 0);
}

/// Test malformed DSL calls are usage errors
#[test]
fn test_e2e_usage_errors() {
    for body in [
        "row('orphan')",
        "table(User, {'name'})",
        "table(User, {'name'}, function() row('a', 'b') end)",
        "load()",
        "find(User)",
    ] {
        let (_dir, store, executor) = setup(&[("bad.lua", body)]);
        let err = executor.load(["bad.lua"]).unwrap_err();
        assert!(err.is_usage(), "{} should be a usage error, got {}", body, err);
        assert_eq!(executor.context_depth(), 0);
        assert_eq!(store.count("User"), 0);
    }
}

/// Test a missing script is an I/O error naming the path
#[test]
fn test_e2e_missing_script() {
    let (_dir, _store, executor) = setup(&[]);

    let err = executor.load(["absent.lua"]).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert!(err.to_string().contains("absent.lua"));
}

/// Test the Lua table library survives the DSL table function
#[test]
fn test_e2e_table_library() {
    let (_dir, _store, executor) = setup(&[(
        "lib.lua",
        r#"
        names = {}
        users = table(User, {"name"}, function()
            for _, name in ipairs({"a", "b", "c"}) do
                table.insert(names, row(name).name)
            end
        end)
        joined = table.concat(names, "+")
        "#,
    )]);

    let variables = executor.load(["lib.lua"]).unwrap();
    assert_eq!(variables["joined"], Value::from("a+b+c"));
    assert_eq!(variables["users"].as_list().unwrap().len(), 3);
}

/// Test reloading the same batch reproduces the output shape
#[test]
fn test_e2e_reload_same_shape() {
    let (_dir, store, executor) = setup(&[(
        "users.lua",
        "users = table(User, {'name'}, function() row('a') row('b') end) count = #users",
    )]);

    let first = executor.load(["users.lua"]).unwrap();
    let second = executor.load(["users.lua"]).unwrap();

    assert_eq!(first.keys().collect::<Vec<_>>(), second.keys().collect::<Vec<_>>());
    assert_eq!(first["count"], second["count"]);
    assert_ne!(first["users"], second["users"]);
    assert_eq!(store.count("User"), 4);
}

/// Test a later script that reassigns an input or earlier output is captured
#[test]
fn test_e2e_redefined_names_captured() {
    let (_dir, _store, mut executor) = setup(&[
        ("base.lua", "stage = 'base'"),
        ("override.lua", "stage = stage .. '+override'; env = 'prod'"),
        ("nested.lua", "stage = 'nested'"),
    ]);
    let mut inputs = Variables::new();
    inputs.insert("env".to_string(), Value::from("test"));
    executor.set_inputs(inputs);

    let variables = executor
        .load([Script::script("base.lua"), Script::script("override.lua"), Script::with("nested.lua", "n")])
        .unwrap();

    assert_eq!(variables["env"], Value::from("prod"));
    assert_eq!(variables["stage"], Value::from("base+override"));
    assert_eq!(variables["n"].as_map().unwrap()["stage"], Value::from("nested"));
}

/// Test empty lists and integer-keyed maps keep their shape between scripts
#[test]
fn test_e2e_collections_between_scripts() {
    let (_dir, _store, executor) = setup(&[
        (
            "a.lua",
            r#"
            nobody = table(User, {"name"}, function() end)
            codes = { [7] = "seven", name = "lookup" }
            "#,
        ),
        ("b.lua", "got = codes[7]; empty = #nobody"),
    ]);

    let variables = executor.load(["a.lua", "b.lua"]).unwrap();
    assert_eq!(variables["nobody"], Value::List(Vec::new()));
    assert_eq!(variables["got"], Value::from("seven"));
    assert_eq!(variables["empty"], Value::Integer(0));
}
