//! Per-suite run state: test records, the captured command, and the
//! cleanup registry. One [`RunContext`] exists per suite execution and is
//! shared with the Lua builtins as `Rc<RefCell<_>>`.

use crate::invoke::CommandOutput;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

pub type SharedContext = Rc<RefCell<RunContext>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Fail => "fail",
            Outcome::Skip => "skip",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    pub name: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Derived from the record list, never stored, so `total` always equals
/// the number of finalized tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// The most recent command or API invocation. Assertions and `json_get`
/// read this; each new invocation overwrites it.
#[derive(Debug, Clone)]
pub struct Capture {
    pub program: String,
    pub args: Vec<String>,
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
    pub http_status: Option<u16>,
    pub timed_out: bool,
    pub json: Option<serde_json::Value>,
}

impl Capture {
    pub fn from_command(program: &str, args: &[String], output: CommandOutput) -> Self {
        let json: Option<serde_json::Value> = serde_json::from_str(output.stdout.trim()).ok();
        Capture {
            program: program.to_string(),
            args: args.to_vec(),
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
            http_status: None,
            timed_out: output.timed_out,
            json,
        }
    }

    /// A completed HTTP exchange, recorded with curl-like process
    /// semantics: exit 0 regardless of the HTTP status code.
    pub fn from_http(method: &str, url: &str, status: u16, body: String) -> Self {
        let json: Option<serde_json::Value> = serde_json::from_str(body.trim()).ok();
        Capture {
            program: "api".to_string(),
            args: vec![method.to_uppercase(), url.to_string()],
            status: 0,
            stdout: body,
            stderr: String::new(),
            http_status: Some(status),
            timed_out: false,
            json,
        }
    }

    /// An HTTP request that never completed (refused, DNS, TLS).
    pub fn http_transport_failure(method: &str, url: &str, message: &str) -> Self {
        Capture {
            program: "api".to_string(),
            args: vec![method.to_uppercase(), url.to_string()],
            status: 1,
            stdout: String::new(),
            stderr: message.to_string(),
            http_status: None,
            timed_out: false,
            json: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupAction {
    /// Delete a remote resource through the CLI under test.
    Resource { collection: String, id: String },
    /// Invoke a script-registered callback, stored Lua-side under `slot`.
    Callback { slot: u32 },
}

#[derive(Debug, Default)]
pub struct RunContext {
    describe: Option<String>,
    current: Option<String>,
    records: Vec<TestRecord>,
    capture: Option<Capture>,
    cleanups: Vec<CleanupAction>,
    next_slot: u32,
    halted: bool,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedContext {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn set_describe(&mut self, name: String) {
        self.describe = Some(name);
    }

    pub fn describe(&self) -> Option<&str> {
        self.describe.as_deref()
    }

    /// Open a new test. A still-open previous test is auto-failed so the
    /// record count stays equal to the number of opened tests; its name is
    /// returned so the caller can log it.
    pub fn open_test(&mut self, name: String) -> Option<String> {
        let dangling = self.current.take().map(|open| {
            self.records.push(TestRecord {
                name: open.clone(),
                outcome: Outcome::Fail,
                message: Some("no result recorded before next test".to_string()),
            });
            open
        });
        self.current = Some(name);
        dangling
    }

    /// Record the outcome of the open test. The first finalization wins;
    /// with no test open the call is ignored and `None` is returned.
    pub fn finalize(&mut self, outcome: Outcome, message: Option<String>) -> Option<TestRecord> {
        let name = self.current.take()?;
        let record = TestRecord {
            name,
            outcome,
            message,
        };
        self.records.push(record.clone());
        Some(record)
    }

    /// Auto-fail a test left open at the end of the script. Returns its
    /// name when one was dangling.
    pub fn finish(&mut self) -> Option<String> {
        let open = self.current.take()?;
        self.records.push(TestRecord {
            name: open.clone(),
            outcome: Outcome::Fail,
            message: Some("no result recorded before end of suite".to_string()),
        });
        Some(open)
    }

    pub fn current_test(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn record_capture(&mut self, capture: Capture) {
        self.capture = Some(capture);
    }

    pub fn capture(&self) -> Option<&Capture> {
        self.capture.as_ref()
    }

    pub fn register_cleanup(&mut self, collection: String, id: String) {
        self.cleanups.push(CleanupAction::Resource { collection, id });
    }

    /// Reserve a slot for a script-side cleanup callback. The callback
    /// itself lives in the Lua registry; the slot keeps its place in the
    /// single ordered cleanup list.
    pub fn defer_callback(&mut self) -> u32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.cleanups.push(CleanupAction::Callback { slot });
        slot
    }

    /// Remove and return all pending cleanups, most recent first. Entries
    /// registered after a drain are picked up by the next one.
    pub fn take_cleanups(&mut self) -> Vec<CleanupAction> {
        let mut actions = std::mem::take(&mut self.cleanups);
        actions.reverse();
        actions
    }

    pub fn mark_halted(&mut self) {
        self.halted = true;
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            total: self.records.len(),
            ..Default::default()
        };
        for record in &self.records {
            match record.outcome {
                Outcome::Pass => summary.passed += 1,
                Outcome::Fail => summary.failed += 1,
                Outcome::Skip => summary.skipped += 1,
            }
        }
        summary
    }
}
