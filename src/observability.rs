use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "loadline_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "loadline_query_duration_seconds";

/// Counter: engagement admission decisions. Labels: outcome.
pub const ADMISSIONS_TOTAL: &str = "loadline_admissions_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "loadline_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "loadline_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "loadline_connections_rejected_total";

/// Counter: WAL compactions run by the background compactor.
pub const WAL_COMPACTIONS_TOTAL: &str = "loadline_wal_compactions_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "loadline_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "loadline_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
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
        Command::InsertPerson(_) => "insert_person",
        Command::UpdatePerson { .. } => "update_person",
        Command::InsertProject(_) => "insert_project",
        Command::UpdateProject { .. } => "update_project",
        Command::DeleteProject { .. } => "delete_project",
        Command::InsertEngagement(_) => "insert_engagement",
        Command::UpdateEngagement { .. } => "update_engagement",
        Command::DeleteEngagement { .. } => "delete_engagement",
        Command::SelectPeople { .. } => "select_people",
        Command::SelectProjects { .. } => "select_projects",
        Command::SelectEngagements { .. } => "select_engagements",
        Command::SelectCapacity { .. } => "select_capacity",
        Command::SelectLoad { .. } => "select_load",
        Command::SelectSuitable { .. } => "select_suitable",
        Command::SelectUtilization { .. } => "select_utilization",
        Command::SelectTeamUtilization { .. } => "select_team_utilization",
        Command::SelectProjectReport { .. } => "select_project_report",
        Command::SelectTimeline { .. } => "select_timeline",
    }
}
