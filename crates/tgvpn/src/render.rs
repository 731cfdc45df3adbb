//! Text rendering for the terminal dashboard.

use crate::host::HostMetrics;
use std::fmt::Write;
use std::time::SystemTime;
use tgvpn_content::{DeploymentProvider, DocSection};
use tgvpn_core::{format_uptime, ServerCatalog, SessionState, SessionStats, SessionStatus};

/// Status dot for a session status
fn indicator(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Disconnected => "○",
        SessionStatus::Connecting | SessionStatus::Disconnecting => "◐",
        SessionStatus::Connected => "●",
        SessionStatus::Failed => "✗",
    }
}

/// Ten-cell bar for a 0..=100 value
fn bar(percent: f64) -> String {
    let filled = (percent.clamp(0.0, 100.0) / 10.0).round() as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(10 - filled))
}

/// One line describing the session
pub fn session_line(state: &SessionState, catalog: &ServerCatalog) -> String {
    let mut line = format!(
        "{} {} ({})",
        indicator(state.status),
        state.status,
        state.status.badge()
    );

    if let Some(id) = &state.active_server_id {
        let name = catalog
            .get(id)
            .map(|s| s.display_name)
            .unwrap_or_else(|_| id.clone());
        let _ = write!(line, " | {}", name);
    }
    if let Some(uptime) = state.uptime(SystemTime::now()) {
        let _ = write!(line, " | up {}", format_uptime(uptime));
    }
    if let Some(reason) = &state.failure {
        let _ = write!(line, " | {}", reason);
    }
    line
}

/// Server table, ranked or in catalog order
pub fn server_table(catalog: &ServerCatalog, ranked: bool, active: Option<&str>) -> String {
    let servers = if ranked { catalog.ranked() } else { catalog.list() };
    let recommended = catalog.recommend().ok().map(|s| s.id);

    let mut out = format!(
        "{:<2} {:<16} {:<26} {:>8} {:>6} {:>7}\n",
        "", "ID", "NAME", "LATENCY", "LOAD", "SCORE"
    );
    for server in &servers {
        let marker = if Some(server.id.as_str()) == active {
            "*"
        } else if recommended.as_deref() == Some(server.id.as_str()) {
            "+"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "{:<2} {:<16} {:<26} {:>6}ms {:>5}% {:>7.1}",
            marker,
            server.id,
            server.display_name,
            server.latency_ms,
            server.load_percent,
            catalog.score(server)
        );
    }
    out.push_str("(* active, + recommended)\n");
    out
}

/// Full dashboard: connection, servers, performance
pub fn dashboard(state: &SessionState, catalog: &ServerCatalog, host: Option<&HostMetrics>) -> String {
    let mut out = String::new();

    out.push_str("Connection Status\n");
    let _ = writeln!(out, "  {}\n", session_line(state, catalog));

    out.push_str("Server Selection\n");
    for line in server_table(catalog, true, state.active_server_id.as_deref()).lines() {
        let _ = writeln!(out, "  {}", line);
    }
    let _ = writeln!(out, "  {} server locations\n", catalog.len());

    out.push_str("Performance Metrics\n");
    match host {
        Some(m) => {
            let _ = writeln!(out, "  CPU Usage     {} {:>5.1}%", bar(m.cpu_percent), m.cpu_percent);
            let _ = writeln!(out, "  Memory Usage  {} {:>5.1}%", bar(m.memory_percent), m.memory_percent);
        }
        None => out.push_str("  Host metrics unavailable\n"),
    }
    if let Some(load) = catalog.mean_load() {
        let _ = writeln!(out, "  Network Load  {} {:>5.1}%", bar(load), load);
    }
    out
}

/// Usage card printed when a session command finishes
pub fn usage(stats: &SessionStats) -> String {
    let average = stats
        .average_session()
        .map(format_uptime)
        .unwrap_or_else(|| "-".to_string());

    let mut out = String::from("Usage Statistics\n");
    let _ = writeln!(out, "  Sessions         {}", stats.sessions);
    let _ = writeln!(out, "  Completed        {}", stats.completed);
    let _ = writeln!(out, "  Failed attempts  {}", stats.failures);
    let _ = writeln!(out, "  Connected time   {}", format_uptime(stats.connected_time));
    let _ = writeln!(out, "  Average session  {}", average);
    out
}

/// Provider list for `guide` without arguments
pub fn provider_list(providers: &[DeploymentProvider]) -> String {
    let mut out = String::new();
    for p in providers {
        let _ = writeln!(out, "{:<14} {:<14} {:<7} {}", p.id, p.name, p.difficulty, p.summary);
    }
    out
}

/// Documentation index for `docs` without arguments
pub fn doc_list(sections: &[DocSection]) -> String {
    let mut out = String::new();
    for s in sections {
        let _ = writeln!(out, "{:<16} {}", s.id, s.title);
    }
    out
}
