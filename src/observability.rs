use std::net::SocketAddr;

use crate::protocol::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "slotbook_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "slotbook_command_duration_seconds";

// ── Booking metrics ─────────────────────────────────────────────

/// Counter: slot lock attempts. Labels: outcome (locked, conflict, rejected).
pub const SLOT_LOCKS_TOTAL: &str = "slotbook_slot_locks_total";

/// Counter: confirmed bookings.
pub const BOOKINGS_TOTAL: &str = "slotbook_bookings_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "slotbook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotbook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotbook_connections_rejected_total";

/// Counter: failed AUTH attempts.
pub const AUTH_FAILURES_TOTAL: &str = "slotbook_auth_failures_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Auth { .. } => "auth",
        Command::Check { .. } => "check",
        Command::Lock { .. } => "lock",
        Command::Mask { .. } => "mask",
        Command::CreateProfile { .. } => "create_profile",
        Command::ProfileById { .. } => "profile_by_id",
        Command::ProfileByHandle { .. } => "profile_by_handle",
        Command::ProfilesOf { .. } => "profiles_of",
        Command::OwnerOf { .. } => "owner_of",
        Command::CreateAvailability { .. } => "create_availability",
        Command::CreateSessionType { .. } => "create_session_type",
        Command::GetSessionType { .. } => "get_session_type",
        Command::Whitelist { .. } => "whitelist",
        Command::Book { .. } => "book",
        Command::Free { .. } => "free",
        Command::Bookings { .. } => "bookings",
        Command::Listen { .. } => "listen",
        Command::Unlisten { .. } => "unlisten",
        Command::Quit => "quit",
    }
}
