//! The `cli` table: invoke the CLI under test and capture the result.
//! Every invocation overwrites the shared capture slot the assertions
//! read, so scripts consume results before the next call.

use crate::config::Target;
use crate::context::{Capture, SharedContext};
use crate::invoke;
use mlua::{Lua, Table, Variadic};
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

pub fn register_cli(lua: &Lua, target: Rc<Target>, ctx: SharedContext) -> mlua::Result<()> {
    let cli_table = lua.create_table()?;

    // cli.json parses stdout for the JSON assertions; cli.run leaves it
    // opaque for plain success checks.
    for (name, want_json) in [("json", true), ("run", false)] {
        let target = Rc::clone(&target);
        let ctx = ctx.clone();
        let invoke_fn = lua.create_async_function(move |lua, args: Variadic<String>| {
            let target = Rc::clone(&target);
            let ctx = ctx.clone();
            async move {
                let args: Vec<String> = args.into_iter().collect();
                execute_cli(
                    &lua,
                    &ctx,
                    &target.bin,
                    args,
                    target.invoke_timeout,
                    want_json,
                )
                .await
            }
        })?;
        cli_table.set(name, invoke_fn)?;
    }

    // cli.raw runs an arbitrary program; the first argument names it.
    let raw_fn = lua.create_async_function(move |lua, args: Variadic<String>| {
        let target = Rc::clone(&target);
        let ctx = ctx.clone();
        async move {
            let mut args: Vec<String> = args.into_iter().collect();
            if args.is_empty() {
                return Err(mlua::Error::runtime("cli.raw: missing program"));
            }
            let program = args.remove(0);
            execute_cli(&lua, &ctx, &program, args, target.invoke_timeout, true).await
        }
    })?;
    cli_table.set("raw", raw_fn)?;

    lua.globals().set("cli", cli_table)?;
    Ok(())
}

async fn execute_cli(
    lua: &Lua,
    ctx: &SharedContext,
    program: &str,
    args: Vec<String>,
    limit: Duration,
    want_json: bool,
) -> mlua::Result<Table> {
    debug!(target: "cli", command = %render_argv(program, &args), "invoking");
    let output = invoke::run_command(program, &args, limit).await;
    let capture = Capture::from_command(program, &args, output);

    let result = lua.create_table()?;
    result.set("status", capture.status)?;
    result.set("output", capture.stdout.clone())?;
    result.set("stderr", capture.stderr.clone())?;
    result.set("ok", capture.status == 0)?;
    if want_json {
        match &capture.json {
            Some(doc) => result.set("json", super::json::json_value_to_lua(lua, doc)?)?,
            None if !capture.stdout.trim().is_empty() => {
                debug!(target: "cli", command = %render_argv(program, &args), "stdout is not valid JSON");
            }
            None => {}
        }
    }
    ctx.borrow_mut().record_capture(capture);
    Ok(result)
}

fn render_argv(program: &str, args: &[String]) -> String {
    let mut rendered = program.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}
