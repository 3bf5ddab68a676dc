use crate::context::{Summary, TestRecord};
use serde::Serialize;
use std::process::ExitCode;

#[derive(Debug, Serialize)]
pub struct RunResult {
    pub passed: bool,
    pub suites: Vec<SuiteResult>,
    pub summary: Summary,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SuiteResult {
    pub name: String,
    pub file: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub describe: Option<String>,
    pub tests: Vec<TestRecord>,
    pub summary: Summary,
    pub duration_ms: u64,
    /// Script-level error (load failure, uncaught Lua error, timeout).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SuiteResult {
    /// A suite that never produced test records.
    pub fn failed(name: &str, file: &str, message: String) -> Self {
        SuiteResult {
            name: name.to_string(),
            file: file.to_string(),
            passed: false,
            describe: None,
            tests: Vec::new(),
            summary: Summary::default(),
            duration_ms: 0,
            error: Some(message),
        }
    }
}

impl RunResult {
    pub fn from_suites(suites: Vec<SuiteResult>, duration_ms: u64) -> Self {
        let mut summary = Summary::default();
        for suite in &suites {
            summary.total += suite.summary.total;
            summary.passed += suite.summary.passed;
            summary.failed += suite.summary.failed;
            summary.skipped += suite.summary.skipped;
        }
        let passed = suites.iter().all(|suite| suite.passed);
        RunResult {
            passed,
            suites,
            summary,
            duration_ms,
        }
    }

    pub fn print(self) -> ExitCode {
        let json = serde_json::to_string_pretty(&self).expect("failed to serialize results");
        println!("{json}");
        if self.passed {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}
