//! The cleanup registry globals: `register_cleanup`, `defer_cleanup`,
//! and `run_cleanup`. Resource entries and deferred callbacks share one
//! ordered list so the drain interleaves them in reverse registration
//! order. Individual failures are logged and skipped; the drain itself
//! never raises.

use crate::config::Target;
use crate::context::{CleanupAction, SharedContext};
use crate::invoke;
use mlua::{Function, Lua, Table, Value};
use std::rc::Rc;
use tracing::{debug, warn};

/// Named registry key holding the Lua-side table of deferred callbacks.
const CALLBACK_REGISTRY: &str = "gauntlet.cleanups";

pub fn register_cleanup(lua: &Lua, target: Rc<Target>, ctx: SharedContext) -> mlua::Result<()> {
    lua.set_named_registry_value(CALLBACK_REGISTRY, lua.create_table()?)?;

    let register_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |_, (collection, id): (String, Value)| {
            let id = coerce_id(&id)?;
            debug!(target: "cleanup", collection = %collection, id = %id, "registered");
            ctx.borrow_mut().register_cleanup(collection, id);
            Ok(())
        })?
    };
    lua.globals().set("register_cleanup", register_fn)?;

    let defer_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |lua, callback: Function| {
            let slot = ctx.borrow_mut().defer_callback();
            let registry: Table = lua.named_registry_value(CALLBACK_REGISTRY)?;
            registry.set(slot, callback)?;
            Ok(())
        })?
    };
    lua.globals().set("defer_cleanup", defer_fn)?;

    let run_fn = lua.create_async_function(move |lua, ()| {
        let ctx = ctx.clone();
        let target = Rc::clone(&target);
        async move {
            drain_cleanups(&lua, &ctx, &target).await;
            Ok(())
        }
    })?;
    lua.globals().set("run_cleanup", run_fn)?;

    Ok(())
}

/// Delete everything registered so far, most recent first. Entries
/// registered after a drain are picked up by the next one; draining
/// twice is harmless.
pub async fn drain_cleanups(lua: &Lua, ctx: &SharedContext, target: &Target) {
    let actions = ctx.borrow_mut().take_cleanups();
    if actions.is_empty() {
        return;
    }
    debug!(target: "cleanup", count = actions.len(), "draining cleanup registry");
    for action in actions {
        match action {
            CleanupAction::Resource { collection, id } => {
                delete_resource(target, &collection, &id).await;
            }
            CleanupAction::Callback { slot } => call_callback(lua, slot).await,
        }
    }
}

/// Best-effort delete through the CLI's `do <collection> delete <id>
/// --confirm` convention. Does not touch the capture slot.
async fn delete_resource(target: &Target, collection: &str, id: &str) {
    let args = vec![
        "do".to_string(),
        collection.to_string(),
        "delete".to_string(),
        id.to_string(),
        "--confirm".to_string(),
    ];
    let output = invoke::run_command(&target.bin, &args, target.invoke_timeout).await;
    if output.status == 0 {
        debug!(target: "cleanup", collection, id, "deleted");
    } else {
        warn!(
            target: "cleanup",
            collection,
            id,
            status = output.status,
            stderr = %output.stderr.trim(),
            "delete failed"
        );
    }
}

async fn call_callback(lua: &Lua, slot: u32) {
    let callback: mlua::Result<Function> = lua
        .named_registry_value::<Table>(CALLBACK_REGISTRY)
        .and_then(|registry| registry.get(slot));
    match callback {
        Ok(callback) => {
            if let Err(e) = callback.call_async::<()>(()).await {
                warn!(target: "cleanup", slot, error = %e, "cleanup callback failed");
            }
        }
        Err(e) => warn!(target: "cleanup", slot, error = %e, "cleanup callback missing"),
    }
}

fn coerce_id(value: &Value) -> mlua::Result<String> {
    match value {
        Value::String(s) => Ok(s.to_str()?.to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(mlua::Error::runtime(format!(
            "register_cleanup: id must be a string or number, got {}",
            other.type_name()
        ))),
    }
}
