//! Helper-module discovery.
//!
//! Discovers gauntlet modules from three sources (in priority order):
//! 1. Project — `./modules/` relative to CWD
//! 2. Global  — `$GAUNTLET_MODULES_PATH` or `~/.gauntlet/modules/`
//! 3. BuiltIn — embedded stdlib + hardcoded Rust builtins

use include_dir::{Dir, include_dir};

use crate::metadata::{self, ModuleMetadata};

static STDLIB_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/stdlib");

/// Name prefix required of requirable helper modules.
pub const MODULE_PREFIX: &str = "gauntlet.";

/// Where a discovered module originates from.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleSource {
    /// Embedded in the binary via `include_dir!`, or a Rust builtin
    BuiltIn,
    /// Found in `./modules/` relative to CWD
    Project,
    /// Found in `$GAUNTLET_MODULES_PATH` or `~/.gauntlet/modules/`
    Global,
}

/// A module discovered during the discovery phase.
#[derive(Debug, Clone)]
pub struct DiscoveredModule {
    pub module_name: String,
    pub source: ModuleSource,
    pub metadata: ModuleMetadata,
    pub lua_source: String,
}

/// Hardcoded Rust builtins with their descriptions. These have no Lua
/// source and cannot be required; they are listed for `gauntlet modules`.
const BUILTINS: &[(&str, &str)] = &[
    ("cli", "Run the CLI under test: json, run, raw"),
    ("api", "JSON:API requests: get, post, patch, put, delete"),
    (
        "harness",
        "Test lifecycle globals: describe, test_name, pass, fail, skip, assert_*, json_get, failure_kind, run_tests",
    ),
    (
        "cleanup",
        "Cleanup registry: register_cleanup, defer_cleanup, run_cleanup",
    ),
    ("json", "JSON serialization: parse and encode"),
    ("log", "Logging: info, warn, error"),
    ("env", "Environment variables: get"),
    ("fs", "Filesystem: read and write files"),
    ("base64", "Base64 encoding and decoding"),
    ("regex", "Regular expressions: match, find, replace"),
    ("sleep", "Sleep for N seconds"),
    ("time", "Unix timestamp in seconds"),
    ("unique", "Unique fixture names and emails"),
];

/// Discover all modules: `./modules/` + `~/.gauntlet/modules/` (or
/// `$GAUNTLET_MODULES_PATH`) + embedded stdlib + Rust builtins.
///
/// Returns modules ordered by priority: Project first, then Global, then BuiltIn.
/// Callers can deduplicate by name, keeping the highest-priority (first) occurrence.
pub fn discover_modules() -> Vec<DiscoveredModule> {
    let mut modules = Vec::new();

    // Priority 1: Project modules (./modules/)
    discover_filesystem_modules(
        std::path::Path::new("./modules"),
        ModuleSource::Project,
        &mut modules,
    );

    // Priority 2: Global modules ($GAUNTLET_MODULES_PATH or ~/.gauntlet/modules/)
    let global_path = resolve_global_modules_path();
    if let Some(path) = global_path {
        discover_filesystem_modules(&path, ModuleSource::Global, &mut modules);
    }

    // Priority 3: Embedded stdlib .lua files
    discover_embedded_stdlib(&mut modules);

    // Priority 3 (continued): Hardcoded Rust builtins
    discover_rust_builtins(&mut modules);

    modules
}

/// Resolve one requirable module by its prefixed name, first match wins,
/// so a project module shadows a global one and both shadow the embedded
/// stdlib. Unprefixed names never resolve.
pub fn find_module(name: &str) -> Option<DiscoveredModule> {
    if !name.starts_with(MODULE_PREFIX) {
        return None;
    }
    discover_modules()
        .into_iter()
        .find(|module| module.module_name == name && !module.lua_source.is_empty())
}

/// Resolve the global modules directory path.
///
/// Checks `$GAUNTLET_MODULES_PATH` first, then falls back to `~/.gauntlet/modules/`.
/// Returns `None` if neither is available.
fn resolve_global_modules_path() -> Option<std::path::PathBuf> {
    if let Ok(custom) = std::env::var(crate::lua::MODULES_PATH_ENV) {
        return Some(std::path::PathBuf::from(custom));
    }
    if let Ok(home) = std::env::var("HOME") {
        return Some(std::path::Path::new(&home).join(".gauntlet/modules"));
    }
    None
}

/// Discover `.lua` files from a filesystem directory.
///
/// Silently skips if the directory does not exist.
fn discover_filesystem_modules(
    dir: &std::path::Path,
    source: ModuleSource,
    modules: &mut Vec<DiscoveredModule>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("lua") {
            continue;
        }

        let lua_source = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(_) => continue,
        };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let module_name = format!("{MODULE_PREFIX}{stem}");
        let meta = metadata::parse_metadata(&lua_source);

        modules.push(DiscoveredModule {
            module_name,
            source: source.clone(),
            metadata: meta,
            lua_source,
        });
    }
}

/// Discover embedded stdlib `.lua` files from `include_dir!`.
fn discover_embedded_stdlib(modules: &mut Vec<DiscoveredModule>) {
    for file in STDLIB_DIR.files() {
        let path = file.path();
        if path.extension().and_then(|e| e.to_str()) != Some("lua") {
            continue;
        }

        let lua_source = match file.contents_utf8() {
            Some(s) => s,
            None => continue,
        };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let module_name = format!("{MODULE_PREFIX}{stem}");
        let meta = metadata::parse_metadata(lua_source);

        modules.push(DiscoveredModule {
            module_name,
            source: ModuleSource::BuiltIn,
            metadata: meta,
            lua_source: lua_source.to_string(),
        });
    }
}

/// Add hardcoded Rust builtins (not Lua files) to the module list.
fn discover_rust_builtins(modules: &mut Vec<DiscoveredModule>) {
    for &(name, description) in BUILTINS {
        modules.push(DiscoveredModule {
            module_name: name.to_string(),
            source: ModuleSource::BuiltIn,
            lua_source: String::new(),
            metadata: ModuleMetadata {
                module_name: name.to_string(),
                description: description.to_string(),
                ..Default::default()
            },
        });
    }
}
