//! The `api` table: direct JSON:API requests for data the CLI does not
//! expose (raw relationship lookups, endpoints without a CLI verb).
//! Requests carry the JSON:API media type and the bearer token resolved
//! from the target environment.

use crate::config::Target;
use crate::context::{Capture, SharedContext};
use mlua::{Lua, MultiValue, Table, Value};
use std::rc::Rc;
use tracing::debug;

const MEDIA_TYPE: &str = "application/vnd.api+json";

pub fn register_api(
    lua: &Lua,
    target: Rc<Target>,
    ctx: SharedContext,
    client: reqwest::Client,
) -> mlua::Result<()> {
    let api_table = lua.create_table()?;

    for method in ["get", "post", "patch", "put", "delete"] {
        let target = Rc::clone(&target);
        let ctx = ctx.clone();
        let client = client.clone();
        let method_fn = lua.create_async_function(move |lua, args: MultiValue| {
            let target = Rc::clone(&target);
            let ctx = ctx.clone();
            let client = client.clone();
            async move { execute_api_request(&lua, &target, &ctx, &client, method, args).await }
        })?;
        api_table.set(method, method_fn)?;
    }

    let base_url_fn = {
        let target = Rc::clone(&target);
        lua.create_function(move |_, ()| Ok(target.base_url.clone()))?
    };
    api_table.set("base_url", base_url_fn)?;

    let token_fn = lua.create_function(move |_, ()| Ok(target.token.clone()))?;
    api_table.set("token", token_fn)?;

    lua.globals().set("api", api_table)?;
    Ok(())
}

/// Arguments are `(path)` for get/delete and `(path [, body [, opts]])`
/// for the body-carrying methods. `body` is a raw string or a table
/// encoded as JSON; `opts.headers` adds request headers.
async fn execute_api_request(
    lua: &Lua,
    target: &Target,
    ctx: &SharedContext,
    client: &reqwest::Client,
    method: &str,
    args: MultiValue,
) -> mlua::Result<Table> {
    let mut args = args.into_iter();

    let path = match args.next() {
        Some(Value::String(s)) => s.to_str()?.to_string(),
        _ => {
            return Err(mlua::Error::runtime(format!(
                "api.{method}: expected a path string"
            )));
        }
    };

    let has_body = matches!(method, "post" | "patch" | "put");
    let mut body: Option<String> = None;
    if has_body {
        match args.next() {
            None | Some(Value::Nil) => {}
            Some(Value::String(s)) => body = Some(s.to_str()?.to_string()),
            Some(Value::Table(table)) => {
                body = Some(super::json::lua_table_to_json(&table)?.to_string());
            }
            Some(other) => {
                return Err(mlua::Error::runtime(format!(
                    "api.{method}: body must be a string or table, got {}",
                    other.type_name()
                )));
            }
        }
    }
    let opts = match args.next() {
        Some(Value::Table(table)) => Some(table),
        _ => None,
    };

    let url = match resolve_url(target, &path) {
        Ok(url) => url,
        Err(message) => return error_table(lua, ctx, None, message),
    };

    debug!(target: "api", method, url = %url, "requesting");

    let mut request = match method {
        "get" => client.get(&url),
        "post" => client.post(&url),
        "patch" => client.patch(&url),
        "put" => client.put(&url),
        "delete" => client.delete(&url),
        other => {
            return Err(mlua::Error::runtime(format!(
                "unsupported method: {other}"
            )));
        }
    };

    request = request.header("Accept", MEDIA_TYPE);
    if let Some(token) = &target.token {
        request = request.bearer_auth(token);
    }
    if let Some(body) = body {
        request = request.header("Content-Type", MEDIA_TYPE).body(body);
    }
    if let Some(ref opts_table) = opts
        && let Ok(headers_table) = opts_table.get::<Table>("headers")
    {
        for pair in headers_table.pairs::<String, String>() {
            let (name, value) = pair?;
            request = request.header(name, value);
        }
    }

    let exchange = match request.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let mut header_pairs = Vec::new();
            for (name, value) in response.headers() {
                if let Ok(value) = value.to_str() {
                    header_pairs.push((name.as_str().to_string(), value.to_string()));
                }
            }
            match response.text().await {
                Ok(body) => Ok((status, header_pairs, body)),
                Err(e) => Err(format!("reading response body: {:#}", anyhow::Error::new(e))),
            }
        }
        // Keep the cause chain; reqwest's Display alone drops the
        // "connection refused" detail triage needs.
        Err(e) => Err(format!("request failed: {:#}", anyhow::Error::new(e))),
    };

    match exchange {
        Ok((status, header_pairs, body)) => {
            let capture = Capture::from_http(method, &url, status, body.clone());

            let headers_table = lua.create_table()?;
            for (name, value) in header_pairs {
                headers_table.set(name, value)?;
            }
            let result = lua.create_table()?;
            result.set("status", status)?;
            result.set("body", body)?;
            if let Some(doc) = &capture.json {
                result.set("json", super::json::json_value_to_lua(lua, doc)?)?;
            }
            result.set("headers", headers_table)?;
            result.set("ok", (200..300).contains(&status))?;

            ctx.borrow_mut().record_capture(capture);
            Ok(result)
        }
        Err(message) => error_table(lua, ctx, Some((method, &url)), message),
    }
}

/// A `{error = message}` result, recorded as a transport failure when
/// the request got as far as a resolved URL.
fn error_table(
    lua: &Lua,
    ctx: &SharedContext,
    exchange: Option<(&str, &str)>,
    message: String,
) -> mlua::Result<Table> {
    if let Some((method, url)) = exchange {
        ctx.borrow_mut()
            .record_capture(Capture::http_transport_failure(method, url, &message));
    }
    let result = lua.create_table()?;
    result.set("error", message)?;
    Ok(result)
}

fn resolve_url(target: &Target, path: &str) -> Result<String, String> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Ok(path.to_string());
    }
    match &target.base_url {
        Some(base) => Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )),
        None => Err(format!(
            "no base URL configured (set {})",
            target.base_url_env
        )),
    }
}
