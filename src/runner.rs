use crate::build_http_client;
use crate::config::{Config, SuiteConfig, Target};
use crate::context::{Outcome, RunContext};
use crate::lua::{self, async_bridge, builtins};
use crate::output::{RunResult, SuiteResult};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, info, warn};

pub async fn run(config: &Config) -> RunResult {
    let start = Instant::now();
    let client = build_http_client();
    let target = Rc::new(Target::resolve(config));
    let results = Arc::new(Mutex::new(Vec::with_capacity(config.suites.len())));

    let run_future = run_all_suites(config, &target, &client, Arc::clone(&results));

    match timeout(config.timeout, run_future).await {
        Ok(()) => {}
        Err(_) => {
            error!(
                timeout_secs = config.timeout.as_secs(),
                "global timeout exceeded"
            );
            let mut results = results.lock().await;
            let completed = results.len();
            for suite in config.suites.iter().skip(completed) {
                results.push(SuiteResult::failed(
                    &suite.name,
                    &suite.file,
                    format!("global timeout of {}s exceeded", config.timeout.as_secs()),
                ));
            }
        }
    }

    let results = Arc::into_inner(results)
        .expect("all references dropped")
        .into_inner();
    let duration_ms = start.elapsed().as_millis() as u64;

    RunResult::from_suites(results, duration_ms)
}

async fn run_all_suites(
    config: &Config,
    target: &Rc<Target>,
    client: &reqwest::Client,
    results: Arc<Mutex<Vec<SuiteResult>>>,
) {
    for suite in &config.suites {
        let start = Instant::now();
        let mut result = run_suite(suite, target, client).await;
        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            suite = %result.name,
            result = if result.passed { "PASS" } else { "FAIL" },
            passed = result.summary.passed,
            failed = result.summary.failed,
            skipped = result.summary.skipped,
            duration_ms = result.duration_ms,
            "suite completed"
        );
        results.lock().await.push(result);
    }
}

/// Run one suite in a fresh VM. A script-level error fails the open
/// test when one exists, otherwise the suite as a whole; either way the
/// cleanup registry is drained before the VM is dropped.
async fn run_suite(
    suite: &SuiteConfig,
    target: &Rc<Target>,
    client: &reqwest::Client,
) -> SuiteResult {
    let ctx = RunContext::shared();

    let vm = match lua::create_vm(Rc::clone(target), ctx.clone(), client.clone()) {
        Ok(vm) => vm,
        Err(e) => {
            return SuiteResult::failed(&suite.name, &suite.file, format!("creating Lua VM: {e:#}"));
        }
    };
    if let Err(e) = lua::inject_env(&vm, &suite.env) {
        return SuiteResult::failed(
            &suite.name,
            &suite.file,
            format!("preparing suite environment: {e:#}"),
        );
    }

    let mut suite_error = None;
    match async_bridge::exec_file_async(&vm, Path::new(&suite.file)).await {
        Ok(()) => {}
        Err(ref e) if builtins::halt_requested(e) => {}
        Err(e) => {
            let message = format_lua_error(&e);
            error!(suite = %suite.name, error = %message, "suite error");
            let mut ctx_mut = ctx.borrow_mut();
            if ctx_mut.current_test().is_some() {
                ctx_mut.finalize(Outcome::Fail, Some(message));
            } else {
                suite_error = Some(message);
            }
        }
    }

    if let Some(dangling) = ctx.borrow_mut().finish() {
        warn!(suite = %suite.name, test = %dangling, "no result recorded before end of suite");
    }

    // run_tests drains on its way out; draining again is a no-op.
    builtins::drain_cleanups(&vm, &ctx, target).await;

    let (describe, tests, summary) = {
        let ctx_ref = ctx.borrow();
        (
            ctx_ref.describe().map(str::to_string),
            ctx_ref.records().to_vec(),
            ctx_ref.summary(),
        )
    };

    SuiteResult {
        name: suite.name.clone(),
        file: suite.file.clone(),
        passed: summary.failed == 0 && suite_error.is_none(),
        describe,
        tests,
        summary,
        duration_ms: 0,
        error: suite_error,
    }
}

fn format_lua_error(error: &mlua::Error) -> String {
    match error {
        mlua::Error::RuntimeError(message) => message.clone(),
        mlua::Error::CallbackError { traceback, cause } => {
            format!("{}\n{}", format_lua_error(cause), traceback)
        }
        other => other.to_string(),
    }
}
