use gauntlet::config::Target;
use gauntlet::context::{RunContext, SharedContext};
use std::rc::Rc;
use std::time::Duration;

/// A sandboxed VM plus handles to the run state it is wired to, so
/// tests can inspect records and captures after a script runs.
#[allow(dead_code)]
pub struct TestVm {
    pub lua: mlua::Lua,
    pub ctx: SharedContext,
    pub target: Rc<Target>,
}

#[allow(dead_code)]
pub fn default_target() -> Target {
    Target {
        bin: "xbe".to_string(),
        invoke_timeout: Duration::from_secs(10),
        base_url: None,
        token: None,
        base_url_env: "XBE_BASE_URL".to_string(),
        token_env: "XBE_TOKEN".to_string(),
    }
}

#[allow(dead_code)]
pub fn create_vm() -> TestVm {
    create_vm_with(default_target())
}

#[allow(dead_code)]
pub fn create_vm_with(target: Target) -> TestVm {
    let target = Rc::new(target);
    let ctx = RunContext::shared();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    let lua = gauntlet::lua::create_vm(Rc::clone(&target), ctx.clone(), client).unwrap();
    TestVm { lua, ctx, target }
}

#[allow(dead_code)]
pub async fn run_lua(script: &str) -> Result<(), mlua::Error> {
    let vm = create_vm();
    gauntlet::lua::async_bridge::exec_async(&vm.lua, script).await
}

/// Run a script and hand back the VM so the test can assert on the
/// records and captures it left behind.
#[allow(dead_code)]
pub async fn run_harness(script: &str) -> (TestVm, Result<(), mlua::Error>) {
    let vm = create_vm();
    let result = gauntlet::lua::async_bridge::exec_async(&vm.lua, script).await;
    (vm, result)
}

#[allow(dead_code)]
pub async fn run_harness_with(target: Target, script: &str) -> (TestVm, Result<(), mlua::Error>) {
    let vm = create_vm_with(target);
    let result = gauntlet::lua::async_bridge::exec_async(&vm.lua, script).await;
    (vm, result)
}

#[allow(dead_code)]
pub async fn eval_lua<T: mlua::FromLuaMulti>(script: &str) -> T {
    let vm = create_vm();
    gauntlet::lua::async_bridge::eval_async(&vm.lua, script)
        .await
        .unwrap()
}

/// An executable shell script standing in for the CLI under test, plus
/// a log file it can append its argv to.
#[allow(dead_code)]
pub struct StubBin {
    pub dir: tempfile::TempDir,
    pub path: String,
    pub log: String,
}

/// Write a stub CLI. `{LOG}` in the body expands to the log file path.
#[allow(dead_code)]
pub fn stub_bin(body: &str) -> StubBin {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stub-cli");
    let log = dir.path().join("calls.log");
    let script = format!(
        "#!/bin/sh\n{}\n",
        body.replace("{LOG}", &log.to_string_lossy())
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    StubBin {
        path: path.to_string_lossy().into_owned(),
        log: log.to_string_lossy().into_owned(),
        dir,
    }
}

#[allow(dead_code)]
pub fn stub_target(stub: &StubBin) -> Target {
    Target {
        bin: stub.path.clone(),
        ..default_target()
    }
}

#[allow(dead_code)]
pub fn logged_calls(stub: &StubBin) -> Vec<String> {
    std::fs::read_to_string(&stub.log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
