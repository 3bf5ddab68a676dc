//! The test lifecycle globals: `describe`, `test_name`, `pass`/`fail`/`skip`,
//! the `assert_*` family, `json_get`, `failure_kind`, and `run_tests`.
//!
//! Assertions record a failure and return `false` rather than raising, so
//! a script keeps running after a failed check. Finalization is
//! first-wins: once an assertion fails the open test, a later `pass()`
//! in the same block is ignored.

use crate::classify;
use crate::classify::FailureKind;
use crate::config::Target;
use crate::context::{Capture, Outcome, SharedContext};
use crate::jsonpath;
use mlua::{Lua, Value};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Sentinel carried through the Lua error channel when `run_tests`
/// stops the script. Not a failure; the runner unwraps it.
#[derive(Debug)]
pub struct HaltRequest;

impl fmt::Display for HaltRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "test run finished")
    }
}

impl std::error::Error for HaltRequest {}

/// Whether `error` is (or wraps) the `run_tests` halt sentinel.
pub fn halt_requested(error: &mlua::Error) -> bool {
    match error {
        mlua::Error::CallbackError { cause, .. } => halt_requested(cause),
        mlua::Error::WithContext { cause, .. } => halt_requested(cause),
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<HaltRequest>().is_some(),
        _ => false,
    }
}

pub fn register_harness(lua: &Lua, target: Rc<Target>, ctx: SharedContext) -> mlua::Result<()> {
    let globals = lua.globals();

    let describe_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |_, name: String| {
            info!(target: "suite", "{}", name);
            ctx.borrow_mut().set_describe(name);
            Ok(())
        })?
    };
    globals.set("describe", describe_fn)?;

    let test_name_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |_, name: String| {
            if let Some(dangling) = ctx.borrow_mut().open_test(name) {
                warn!(target: "test", test = %dangling, "no result recorded before next test");
            }
            Ok(())
        })?
    };
    globals.set("test_name", test_name_fn)?;

    let pass_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |_, message: Option<String>| {
            finish_test(&ctx, Outcome::Pass, message);
            Ok(())
        })?
    };
    globals.set("pass", pass_fn)?;

    let fail_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |_, message: Option<String>| {
            finish_test(&ctx, Outcome::Fail, message);
            Ok(())
        })?
    };
    globals.set("fail", fail_fn)?;

    let skip_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |_, message: Option<String>| {
            finish_test(&ctx, Outcome::Skip, message);
            Ok(())
        })?
    };
    globals.set("skip", skip_fn)?;

    let assert_success_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |_, ()| {
            let failure = match captured(&ctx) {
                Err(message) => Some(message),
                Ok(capture) if capture.status != 0 => Some(format!(
                    "expected exit 0, got {}{}",
                    capture.status,
                    output_excerpt(&capture)
                )),
                Ok(_) => None,
            };
            Ok(check(&ctx, failure))
        })?
    };
    globals.set("assert_success", assert_success_fn)?;

    let assert_failure_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |_, ()| {
            let failure = match captured(&ctx) {
                Err(message) => Some(message),
                Ok(capture) if capture.status == 0 => Some(format!(
                    "expected nonzero exit, got 0{}",
                    output_excerpt(&capture)
                )),
                Ok(_) => None,
            };
            Ok(check(&ctx, failure))
        })?
    };
    globals.set("assert_failure", assert_failure_fn)?;

    let assert_json_is_array_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |_, ()| {
            let failure = match captured_json(&ctx) {
                Err(message) => Some(message),
                Ok(serde_json::Value::Array(_)) => None,
                Ok(other) => Some(format!(
                    "expected a JSON array, got {}",
                    jsonpath::type_name(&other)
                )),
            };
            Ok(check(&ctx, failure))
        })?
    };
    globals.set("assert_json_is_array", assert_json_is_array_fn)?;

    let assert_json_has_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |_, path: String| {
            let failure = match lookup_path(&ctx, &path) {
                Err(message) => Some(message),
                Ok(None) => Some(format!("expected a value at {path}, found none")),
                Ok(Some(serde_json::Value::Null)) => {
                    Some(format!("expected a non-null value at {path}, got null"))
                }
                Ok(Some(_)) => None,
            };
            Ok(check(&ctx, failure))
        })?
    };
    globals.set("assert_json_has", assert_json_has_fn)?;

    let assert_json_equals_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |_, (path, expected): (String, Value)| {
            let failure = match expected_to_string(&expected) {
                Err(message) => Some(message),
                Ok(expected) => match lookup_path(&ctx, &path) {
                    Err(message) => Some(message),
                    Ok(None) => Some(format!(
                        "expected {expected:?} at {path}, found no value"
                    )),
                    Ok(Some(actual)) => {
                        let rendered = jsonpath::render(&actual);
                        if rendered == expected {
                            None
                        } else {
                            Some(format!("expected {expected:?} at {path}, got {rendered:?}"))
                        }
                    }
                },
            };
            Ok(check(&ctx, failure))
        })?
    };
    globals.set("assert_json_equals", assert_json_equals_fn)?;

    let assert_json_bool_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |_, (path, expected): (String, Value)| {
            let failure = match expected_bool(&expected) {
                Err(message) => Some(message),
                Ok(want) => match lookup_path(&ctx, &path) {
                    Err(message) => Some(message),
                    Ok(Some(serde_json::Value::Bool(got))) if got == want => None,
                    Ok(Some(other)) => Some(format!(
                        "expected {want} at {path}, got {}",
                        jsonpath::render(&other)
                    )),
                    Ok(None) => Some(format!("expected {want} at {path}, found no value")),
                },
            };
            Ok(check(&ctx, failure))
        })?
    };
    globals.set("assert_json_bool", assert_json_bool_fn)?;

    let json_get_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |lua, path: String| {
            let segments = jsonpath::parse(&path)
                .map_err(|e| mlua::Error::runtime(format!("json_get: {e}")))?;
            let found = ctx
                .borrow()
                .capture()
                .and_then(|capture| capture.json.as_ref())
                .and_then(|doc| jsonpath::lookup(doc, &segments).cloned());
            match found {
                Some(value) => Ok((super::json::json_value_to_lua(lua, &value)?, true)),
                None => Ok((Value::Nil, false)),
            }
        })?
    };
    globals.set("json_get", json_get_fn)?;

    let failure_kind_fn = {
        let ctx = ctx.clone();
        lua.create_function(move |_, ()| {
            let kind = ctx
                .borrow()
                .capture()
                .map(classify::classify)
                .unwrap_or(FailureKind::Unknown);
            Ok(kind.as_str())
        })?
    };
    globals.set("failure_kind", failure_kind_fn)?;

    let run_tests_fn = lua.create_async_function(move |lua, ()| {
        let ctx = ctx.clone();
        let target = Rc::clone(&target);
        async move {
            if let Some(dangling) = ctx.borrow_mut().finish() {
                warn!(target: "test", test = %dangling, "no result recorded before end of suite");
            }
            super::cleanup::drain_cleanups(&lua, &ctx, &target).await;
            let summary = ctx.borrow().summary();
            info!(
                target: "harness",
                total = summary.total,
                passed = summary.passed,
                failed = summary.failed,
                skipped = summary.skipped,
                "test run complete"
            );
            ctx.borrow_mut().mark_halted();
            Err::<(), _>(mlua::Error::external(HaltRequest))
        }
    })?;
    globals.set("run_tests", run_tests_fn)?;

    Ok(())
}

/// Record an assertion result against the open test. Returns the bool
/// handed back to the script: true when the check held.
fn check(ctx: &SharedContext, failure: Option<String>) -> bool {
    match failure {
        Some(message) => {
            finish_test(ctx, Outcome::Fail, Some(message));
            false
        }
        None => true,
    }
}

fn finish_test(ctx: &SharedContext, outcome: Outcome, message: Option<String>) {
    let record = ctx.borrow_mut().finalize(outcome, message);
    match record {
        Some(record) => {
            info!(
                target: "test",
                test = %record.name,
                result = record.outcome.as_str(),
                message = record.message.as_deref().unwrap_or(""),
                "test finished"
            );
        }
        None => debug!(target: "test", "outcome ignored, no open test"),
    }
}

fn captured(ctx: &SharedContext) -> Result<Capture, String> {
    ctx.borrow()
        .capture()
        .cloned()
        .ok_or_else(|| "no command captured".to_string())
}

fn captured_json(ctx: &SharedContext) -> Result<serde_json::Value, String> {
    let capture = captured(ctx)?;
    capture
        .json
        .clone()
        .ok_or_else(|| format!("output is not valid JSON{}", output_excerpt(&capture)))
}

fn lookup_path(ctx: &SharedContext, path: &str) -> Result<Option<serde_json::Value>, String> {
    let doc = captured_json(ctx)?;
    let segments = jsonpath::parse(path).map_err(|e| format!("invalid path {path:?}: {e}"))?;
    Ok(jsonpath::lookup(&doc, &segments).cloned())
}

fn expected_to_string(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.to_str().map_err(|e| e.to_string())?.to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Boolean(b) => Ok(b.to_string()),
        other => Err(format!(
            "unsupported expected value of type {}",
            other.type_name()
        )),
    }
}

fn expected_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::String(s) => match &*s.to_str().map_err(|e| e.to_string())? {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(format!("expected \"true\" or \"false\", got {other:?}")),
        },
        other => Err(format!(
            "expected a boolean, got a {} argument",
            other.type_name()
        )),
    }
}

fn output_excerpt(capture: &Capture) -> String {
    let mut excerpt = String::new();
    let stdout = capture.stdout.trim();
    let stderr = capture.stderr.trim();
    if !stdout.is_empty() {
        excerpt.push_str("; stdout: ");
        excerpt.push_str(&truncate(stdout, 200));
    }
    if !stderr.is_empty() {
        excerpt.push_str("; stderr: ");
        excerpt.push_str(&truncate(stderr, 200));
    }
    excerpt
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
