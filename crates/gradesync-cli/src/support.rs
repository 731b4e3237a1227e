use gradesync_core::{EngineConfig, SnapshotCollector, TargetRecord};
use gradesync_store::{FileTarget, LoadedRoster, RosterWarning, load_roster};
use std::path::Path;

pub fn yes_no(ok: bool) -> &'static str {
    if ok { "yes" } else { "no" }
}

pub fn exit_with_error(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

pub fn load_roster_or_exit(path: &str) -> LoadedRoster {
    let roster_path = Path::new(path);
    if !roster_path.exists() {
        exit_with_error(format!("roster file not found: {}", roster_path.display()));
    }
    load_roster(roster_path).unwrap_or_else(|e| {
        exit_with_error(format!("failed to load {}: {e}", roster_path.display()))
    })
}

/// Read-only snapshot of a target file; no lock is taken.
pub fn snapshot_target_or_exit(path: &str) -> Vec<TargetRecord> {
    let target_path = Path::new(path);
    if !target_path.exists() {
        exit_with_error(format!("target file not found: {}", target_path.display()));
    }
    let mut target = FileTarget::load(target_path).unwrap_or_else(|e| {
        exit_with_error(format!("failed to load {}: {e}", target_path.display()))
    });
    target.collect().unwrap_or_else(|e| exit_with_error(e))
}

pub fn load_config_or_exit(path: &str) -> EngineConfig {
    let mut config = EngineConfig::load(path).unwrap_or_else(|e| exit_with_error(e));
    config.apply_env_overrides();
    config
}

pub fn print_roster_warnings(warnings: &[RosterWarning]) {
    for warning in warnings {
        eprintln!("warning: roster line {}: {}", warning.line, warning.message);
    }
}

pub fn render_json_or_exit(payload: &serde_json::Value, what: &str) -> String {
    serde_json::to_string_pretty(payload).unwrap_or_else(|error| {
        eprintln!("error: failed to render {what} payload: {error}");
        std::process::exit(2);
    })
}
