//! The `json` table plus the Lua/JSON value conversions shared by the
//! `cli`, `api`, and `json_get` builtins.

use mlua::{Lua, Table, Value};

pub fn register_json(lua: &Lua) -> mlua::Result<()> {
    let json_table = lua.create_table()?;

    let parse_fn = lua.create_function(|lua, text: String| {
        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| mlua::Error::runtime(format!("json.parse: {e}")))?;
        json_value_to_lua(lua, &value)
    })?;
    json_table.set("parse", parse_fn)?;

    let encode_fn = lua.create_function(|_, (value, pretty): (Value, Option<bool>)| {
        let json = lua_value_to_json(&value)?;
        let text = if pretty.unwrap_or(false) {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        }
        .map_err(|e| mlua::Error::runtime(format!("json.encode: {e}")))?;
        Ok(text)
    })?;
    json_table.set("encode", encode_fn)?;

    lua.globals().set("json", json_table)?;
    Ok(())
}

pub(crate) fn lua_value_to_json(value: &Value) -> mlua::Result<serde_json::Value> {
    Ok(match value {
        Value::Nil => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .ok_or_else(|| mlua::Error::runtime("cannot encode NaN or infinity as JSON"))?,
        Value::String(s) => serde_json::Value::String(s.to_str()?.to_string()),
        Value::Table(table) => lua_table_to_json(table)?,
        other => {
            return Err(mlua::Error::runtime(format!(
                "cannot encode {} as JSON",
                other.type_name()
            )));
        }
    })
}

/// A table keyed 1..n becomes a JSON array (the empty table included);
/// anything else becomes an object with stringified keys.
pub(crate) fn lua_table_to_json(table: &Table) -> mlua::Result<serde_json::Value> {
    let mut entries: Vec<(Value, Value)> = Vec::new();
    for pair in table.pairs::<Value, Value>() {
        entries.push(pair?);
    }

    let mut max_index: i64 = 0;
    let mut array_like = true;
    for (key, _) in &entries {
        match key {
            Value::Integer(i) if *i >= 1 => max_index = max_index.max(*i),
            _ => {
                array_like = false;
                break;
            }
        }
    }

    if array_like && max_index == entries.len() as i64 {
        let mut array = Vec::with_capacity(entries.len());
        for index in 1..=max_index {
            let item: Value = table.get(index)?;
            array.push(lua_value_to_json(&item)?);
        }
        return Ok(serde_json::Value::Array(array));
    }

    let mut object = serde_json::Map::new();
    for (key, value) in &entries {
        let key = match key {
            Value::String(s) => s.to_str()?.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(mlua::Error::runtime(format!(
                    "cannot encode table key of type {}",
                    other.type_name()
                )));
            }
        };
        object.insert(key, lua_value_to_json(value)?);
    }
    Ok(serde_json::Value::Object(object))
}

pub(crate) fn json_value_to_lua(lua: &Lua, value: &serde_json::Value) -> mlua::Result<Value> {
    Ok(match value {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Number(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::String(lua.create_string(s)?),
        serde_json::Value::Array(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (index, item) in items.iter().enumerate() {
                table.set(index + 1, json_value_to_lua(lua, item)?)?;
            }
            Value::Table(table)
        }
        serde_json::Value::Object(map) => {
            let table = lua.create_table_with_capacity(0, map.len())?;
            for (key, item) in map {
                table.set(key.as_str(), json_value_to_lua(lua, item)?)?;
            }
            Value::Table(table)
        }
    })
}
