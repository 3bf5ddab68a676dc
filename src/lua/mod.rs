pub mod async_bridge;
pub mod builtins;

use crate::config::Target;
use crate::context::SharedContext;
use anyhow::Result;
use mlua::{Lua, LuaOptions, StdLib};
use std::collections::HashMap;
use std::rc::Rc;

/// Environment variable pointing at a global helper-module directory.
pub const MODULES_PATH_ENV: &str = "GAUNTLET_MODULES_PATH";

const DANGEROUS_GLOBALS: &[&str] = &[
    "load",
    "loadfile",
    "dofile",
    "collectgarbage",
    "print",
    "require",
];

/// Lua VM memory limit: 64 MB
const MEMORY_LIMIT: usize = 64 * 1024 * 1024;

fn lua_err(e: mlua::Error) -> anyhow::Error {
    anyhow::anyhow!("{e}")
}

/// Create a sandboxed VM wired to one suite's run state. Every suite
/// gets a fresh VM; nothing leaks between scripts.
pub fn create_vm(
    target: Rc<Target>,
    ctx: SharedContext,
    client: reqwest::Client,
) -> Result<Lua> {
    let libs = StdLib::ALL_SAFE ^ StdLib::IO ^ StdLib::OS ^ StdLib::PACKAGE;
    let lua = Lua::new_with(libs, LuaOptions::default()).map_err(lua_err)?;
    lua.set_memory_limit(MEMORY_LIMIT).map_err(lua_err)?;
    sandbox(&lua).map_err(lua_err)?;
    builtins::register_all(&lua, target, ctx, client).map_err(lua_err)?;
    Ok(lua)
}

fn sandbox(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();
    for name in DANGEROUS_GLOBALS {
        globals.set(*name, mlua::Value::Nil)?;
    }
    // string.dump leaks bytecode
    let string_table: mlua::Table = globals.get("string")?;
    string_table.set("dump", mlua::Value::Nil)?;
    Ok(())
}

/// Expose per-suite variables from the run config. `env.get` consults
/// these before the process environment.
pub fn inject_env(lua: &Lua, env: &HashMap<String, String>) -> Result<()> {
    if env.is_empty() {
        return Ok(());
    }
    let globals = lua.globals();
    let env_table: mlua::Table = globals.get("env").map_err(lua_err)?;
    let suite_env: mlua::Table = env_table.get("_suite_env").map_err(lua_err)?;
    for (key, value) in env {
        suite_env.set(key.as_str(), value.as_str()).map_err(lua_err)?;
    }
    Ok(())
}
