pub mod classify;
pub mod config;
pub mod context;
pub mod discovery;
pub mod invoke;
pub mod jsonpath;
pub mod lua;
pub mod metadata;
pub mod output;
pub mod runner;

use std::time::Duration;

pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("gauntlet/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("failed to build HTTP client")
}
