//! Pre-flight network diagnostics
//!
//! Best-effort checks that help whoever reads a failed CI log: which addresses
//! the host resolves to and whether a TCP connection to the database port can
//! be opened on each path. Nothing here affects the exit code.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;

use crate::db::connection::{host_port, ConnectionSpec};
use crate::db::resolver::Resolve;

/// Target of a single reachability probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    Address(IpAddr),
    Hostname(String),
}

/// Outcome of a single reachability probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub target: ProbeTarget,
    pub reachable: bool,
    pub detail: Option<String>,
}

/// Everything the pre-flight step learned
#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    pub addresses: Vec<IpAddr>,
    pub dns_error: Option<String>,
    pub probes: Vec<ProbeOutcome>,
}

impl PreflightReport {
    pub fn any_reachable(&self) -> bool {
        self.probes.iter().any(|probe| probe.reachable)
    }
}

/// Run DNS listing and TCP probes against the spec's host and port
pub async fn run_preflight(
    resolver: &dyn Resolve,
    spec: &ConnectionSpec,
    probe_timeout: Duration,
) -> PreflightReport {
    let mut report = PreflightReport::default();

    match resolver.lookup(&spec.host, spec.port).await {
        Ok(addrs) => {
            for addr in &addrs {
                tracing::info!(host = %spec.host, address = %addr, "DNS answer");
            }
            if addrs.is_empty() {
                tracing::warn!(host = %spec.host, "DNS returned no addresses");
            }
            report.addresses = addrs;
        }
        Err(e) => {
            tracing::warn!(host = %spec.host, error = %e, "DNS lookup failed");
            report.dns_error = Some(e.to_string());
        }
    }

    let first_v4 = report.addresses.iter().find(|addr| addr.is_ipv4()).copied();
    let first_v6 = report.addresses.iter().find(|addr| addr.is_ipv6()).copied();

    for addr in first_v4.into_iter().chain(first_v6) {
        let outcome = probe(
            ProbeTarget::Address(addr),
            TcpStream::connect(SocketAddr::new(addr, spec.port)),
            probe_timeout,
        )
        .await;
        report.probes.push(outcome);
    }

    let outcome = probe(
        ProbeTarget::Hostname(spec.host.clone()),
        TcpStream::connect((spec.host.as_str(), spec.port)),
        probe_timeout,
    )
    .await;
    report.probes.push(outcome);

    report
}

async fn probe<F>(target: ProbeTarget, connect: F, probe_timeout: Duration) -> ProbeOutcome
where
    F: std::future::Future<Output = std::io::Result<TcpStream>>,
{
    let label = match &target {
        ProbeTarget::Address(addr) => addr.to_string(),
        ProbeTarget::Hostname(host) => host.clone(),
    };

    let (reachable, detail) = match tokio::time::timeout(probe_timeout, connect).await {
        Ok(Ok(_stream)) => (true, None),
        Ok(Err(e)) => (false, Some(e.to_string())),
        Err(_) => (false, Some(format!("timed out after {:?}", probe_timeout))),
    };

    match &detail {
        None => tracing::info!(target_addr = %label, "TCP probe succeeded"),
        Some(reason) => tracing::warn!(target_addr = %label, reason = %reason, "TCP probe failed"),
    }

    ProbeOutcome {
        target,
        reachable,
        detail,
    }
}

/// Log a one-line summary of the report
pub fn log_summary(report: &PreflightReport, spec: &ConnectionSpec) {
    let reachable = report.probes.iter().filter(|p| p.reachable).count();
    tracing::info!(
        target_addr = %host_port(&spec.host, spec.port),
        addresses = report.addresses.len(),
        probes = report.probes.len(),
        reachable = reachable,
        "Pre-flight diagnostics finished"
    );
}
