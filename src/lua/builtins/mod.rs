mod api;
mod cleanup;
mod cli;
mod core;
mod harness;
mod json;

pub use cleanup::drain_cleanups;
pub use harness::halt_requested;

use crate::config::Target;
use crate::context::SharedContext;
use mlua::Lua;
use std::rc::Rc;

pub fn register_all(
    lua: &Lua,
    target: Rc<Target>,
    ctx: SharedContext,
    client: reqwest::Client,
) -> mlua::Result<()> {
    harness::register_harness(lua, Rc::clone(&target), ctx.clone())?;
    cli::register_cli(lua, Rc::clone(&target), ctx.clone())?;
    cleanup::register_cleanup(lua, Rc::clone(&target), ctx.clone())?;
    api::register_api(lua, target, ctx, client)?;
    json::register_json(lua)?;
    core::register_log(lua)?;
    core::register_env(lua)?;
    core::register_sleep(lua)?;
    core::register_time(lua)?;
    core::register_fs(lua)?;
    core::register_base64(lua)?;
    core::register_regex(lua)?;
    core::register_unique(lua)?;
    core::register_require(lua)?;
    Ok(())
}
