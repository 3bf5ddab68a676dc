use mlua::{FromLuaMulti, Lua};
use std::path::Path;

/// Drop a leading `#!` line so suites can be executable scripts.
pub fn strip_shebang(source: &str) -> &str {
    if let Some(rest) = source.strip_prefix("#!") {
        match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => "",
        }
    } else {
        source
    }
}

pub async fn exec_async(lua: &Lua, script: &str) -> mlua::Result<()> {
    lua.load(strip_shebang(script)).exec_async().await
}

pub async fn exec_file_async(lua: &Lua, path: &Path) -> mlua::Result<()> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| mlua::Error::runtime(format!("failed to read suite {path:?}: {e}")))?;
    lua.load(strip_shebang(&content))
        .set_name(format!("@{}", path.display()))
        .exec_async()
        .await
}

pub async fn eval_async<T: FromLuaMulti>(lua: &Lua, script: &str) -> mlua::Result<T> {
    lua.load(strip_shebang(script)).eval_async().await
}
