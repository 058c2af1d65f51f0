//! Parsing of `docker ps --format "{{.ID}} {{.Ports}}"` output.
//!
//! A ports column looks like
//! `0.0.0.0:5001->5001/tcp, :::5001->5001/tcp, 8080/tcp`. Only entries with
//! a `->` are published on the host; the rest are exposed-only and never
//! conflict with anything.

use std::collections::BTreeSet;

/// Format string passed to `docker ps`.
pub const PS_FORMAT: &str = "{{.ID}} {{.Ports}}";

/// A running container and its raw ports column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningContainer {
    pub id: String,
    pub ports: String,
}

/// One host-side binding: `host:start[-end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// `0.0.0.0`, `::`, `[::]`, or a specific address
    pub host: String,
    pub start: u16,
    pub end: u16,
}

impl PortBinding {
    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

impl RunningContainer {
    pub fn bindings(&self) -> Vec<PortBinding> {
        parse_bindings(&self.ports)
    }

    /// The first requested port this container holds on any host interface.
    ///
    /// One hit is enough: conflicts are resolved per container, not per port.
    pub fn conflicting_port(&self, requested: &BTreeSet<u16>) -> Option<u16> {
        let bindings = self.bindings();
        requested
            .iter()
            .copied()
            .find(|port| bindings.iter().any(|b| b.contains(*port)))
    }
}

/// Parse `docker ps` output, one container per line.
pub fn parse_ps_output(stdout: &str) -> Vec<RunningContainer> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            // Containers publishing nothing print only their ID.
            let (id, ports) = line.split_once(' ').unwrap_or((line, ""));
            RunningContainer {
                id: id.to_owned(),
                ports: ports.trim().to_owned(),
            }
        })
        .collect()
}

/// Host-side bindings of one ports column.
pub fn parse_bindings(ports: &str) -> Vec<PortBinding> {
    ports
        .split(',')
        .filter_map(|entry| {
            let (host_side, _container_side) = entry.trim().split_once("->")?;
            let (host, range) = host_side.rsplit_once(':')?;
            let (start, end) = match range.split_once('-') {
                Some((start, end)) => (parse_port(start)?, parse_port(end)?),
                None => {
                    let port = parse_port(range)?;
                    (port, port)
                }
            };
            Some(PortBinding {
                host: host.to_owned(),
                start,
                end,
            })
        })
        .collect()
}

fn parse_port(s: &str) -> Option<u16> {
    s.parse()
        // arch-lint: allow(no-silent-result-drop) reason="entries that are not host port bindings cannot conflict and are skipped"
        .ok()
}
