use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Kernel subsystem an event originates from. Targets are emitted as
/// `waypoint.<component>` so a subscriber can filter per subsystem
/// (e.g. `RUST_LOG=waypoint.recovery=debug`).
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Kernel,
    ComplexityGate,
    Recovery,
    Checkpoint,
    Validation,
    Preference,
    Memory,
    Store,
    Autopilot,
    Campaign,
}

impl Component {
    fn target(self) -> &'static str {
        match self {
            Component::Kernel => "waypoint.kernel",
            Component::ComplexityGate => "waypoint.complexity_gate",
            Component::Recovery => "waypoint.recovery",
            Component::Checkpoint => "waypoint.checkpoint",
            Component::Validation => "waypoint.validation",
            Component::Preference => "waypoint.preference",
            Component::Memory => "waypoint.memory",
            Component::Store => "waypoint.store",
            Component::Autopilot => "waypoint.autopilot",
            Component::Campaign => "waypoint.campaign",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Component::Kernel => "kernel",
            Component::ComplexityGate => "complexity_gate",
            Component::Recovery => "recovery",
            Component::Checkpoint => "checkpoint",
            Component::Validation => "validation",
            Component::Preference => "preference",
            Component::Memory => "memory",
            Component::Store => "store",
            Component::Autopilot => "autopilot",
            Component::Campaign => "campaign",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingInitInfo {
    pub logs_dir: String,
    pub prefix: String,
    pub retention_days: u64,
    pub initialized_at: DateTime<Utc>,
}

/// A structured diagnostic event. `detail` should never carry a raw
/// secret or user-provided free-text field — pass it through
/// [`redact_text`] first.
#[derive(Debug, Clone, Serialize)]
pub struct KernelEvent<'a> {
    pub event: &'a str,
    pub feature_id: Option<&'a str>,
    pub bug_id: Option<&'a str>,
    pub session_id: Option<&'a str>,
    pub checkpoint_id: Option<&'a str>,
    pub status: Option<&'a str>,
    pub detail: Option<&'a str>,
}

/// Collapses free text to a length + hash so log lines never carry raw
/// sensitive content (human notes, PRD excerpts) while remaining
/// distinguishable across occurrences.
pub fn redact_text(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    format!(
        "[redacted len={} sha256={}]",
        trimmed.len(),
        short_hash(trimmed)
    )
}

pub fn short_hash(input: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

pub fn emit_event(level: Level, component: Component, event: KernelEvent<'_>) {
    macro_rules! fire {
        ($macro:ident, $target:expr) => {
            tracing::$macro!(
                target: $target,
                component = component.as_str(),
                event = event.event,
                feature_id = event.feature_id.unwrap_or(""),
                bug_id = event.bug_id.unwrap_or(""),
                session_id = event.session_id.unwrap_or(""),
                checkpoint_id = event.checkpoint_id.unwrap_or(""),
                status = event.status.unwrap_or(""),
                detail = event.detail.unwrap_or(""),
                "kernel_event"
            )
        };
    }
    macro_rules! fire_for_component {
        ($macro:ident) => {
            match component {
                Component::Kernel => fire!($macro, "waypoint.kernel"),
                Component::ComplexityGate => fire!($macro, "waypoint.complexity_gate"),
                Component::Recovery => fire!($macro, "waypoint.recovery"),
                Component::Checkpoint => fire!($macro, "waypoint.checkpoint"),
                Component::Validation => fire!($macro, "waypoint.validation"),
                Component::Preference => fire!($macro, "waypoint.preference"),
                Component::Memory => fire!($macro, "waypoint.memory"),
                Component::Store => fire!($macro, "waypoint.store"),
                Component::Autopilot => fire!($macro, "waypoint.autopilot"),
                Component::Campaign => fire!($macro, "waypoint.campaign"),
            }
        };
    }
    match level {
        Level::ERROR => fire_for_component!(error),
        Level::WARN => fire_for_component!(warn),
        Level::DEBUG => fire_for_component!(debug),
        Level::TRACE => fire_for_component!(trace),
        _ => fire_for_component!(info),
    }
}

/// Configures a daily-rotating JSONL file appender plus a compact stdout
/// layer, gated by `RUST_LOG`/[`EnvFilter`]. The returned [`WorkerGuard`]
/// must be held for the process lifetime or buffered log lines are lost
/// on drop.
pub fn init_logging(logs_dir: &Path, retention_days: u64) -> anyhow::Result<(WorkerGuard, LoggingInitInfo)> {
    fs::create_dir_all(logs_dir)?;
    cleanup_old_jsonl(logs_dir, retention_days)?;

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("waypoint")
        .filename_suffix("jsonl")
        .build(logs_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_current_span(false)
        .with_span_list(false);

    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_ansi(true);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();

    let info = LoggingInitInfo {
        logs_dir: logs_dir.display().to_string(),
        prefix: "waypoint".to_string(),
        retention_days,
        initialized_at: Utc::now(),
    };

    Ok((guard, info))
}

fn cleanup_old_jsonl(logs_dir: &Path, retention_days: u64) -> anyhow::Result<()> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
    let prefix = "waypoint.";

    for entry in fs::read_dir(logs_dir)? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if !name.starts_with(prefix) || !name.ends_with(".jsonl") {
            continue;
        }

        // expected: waypoint.YYYY-MM-DD.jsonl
        let date_part = name.trim_start_matches(prefix).trim_end_matches(".jsonl");

        let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            continue;
        };

        let Some(dt) = date.and_hms_opt(0, 0, 0) else {
            continue;
        };

        if DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc) < cutoff {
            let _ = fs::remove_file(path);
        }
    }

    Ok(())
}

pub fn canonical_logs_dir_from_root(root: &Path) -> PathBuf {
    root.join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_text_masks_content() {
        let raw = "super-secret-token-123";
        let redacted = redact_text(raw);
        assert!(redacted.contains("[redacted len="));
        assert!(!redacted.contains("super-secret-token-123"));
    }

    #[test]
    fn canonical_logs_dir_joins_logs_folder() {
        let root = PathBuf::from("/tmp/waypoint");
        let logs = canonical_logs_dir_from_root(&root);
        assert_eq!(logs, PathBuf::from("/tmp/waypoint").join("logs"));
    }

    #[test]
    fn component_targets_follow_waypoint_prefix_convention() {
        assert_eq!(Component::Recovery.target(), "waypoint.recovery");
        assert_eq!(Component::Checkpoint.target(), "waypoint.checkpoint");
    }
}
