//! Parallel polling of several devices.
//!
//! Each device gets its own session on a worker of the [`SessionPool`]; within
//! a session the configured queries run one after another. A device error
//! (`pE`/`nE` reply) only fails that query, any other error ends the session.
use std::{
    io::{self, Write},
    sync::{Arc, mpsc},
};

use log::{info, warn};

use crate::{
    Command, Outcome,
    protocol::{
        ClientConfig, DeviceStream, Lw3Client, ProtocolError, ProtocolResult, SessionPool,
    },
};

#[derive(Debug)]
pub struct QueryResult {
    pub command: Command,
    pub outcome: ProtocolResult<Outcome>,
}

/// Everything one device session produced.
#[derive(Debug)]
pub struct DeviceReport {
    pub host: String,
    pub results: ProtocolResult<Vec<QueryResult>>,
}

impl DeviceReport {
    /// Write `host<TAB>command<TAB>line` records to `out` and failures to `err`.
    pub fn render<O: Write, E: Write>(&self, out: &mut O, err: &mut E) -> io::Result<()> {
        let results = match &self.results {
            Ok(results) => results,
            Err(e) => return writeln!(err, "{}\t{e}", self.host),
        };

        for result in results {
            match &result.outcome {
                Ok(outcome) => {
                    for line in outcome.lines() {
                        writeln!(out, "{}\t{}\t{line}", self.host, result.command)?;
                    }
                    if outcome.skipped_count() > 0 {
                        writeln!(
                            err,
                            "{}\t{}\t{} malformed lines skipped",
                            self.host,
                            result.command,
                            outcome.skipped_count()
                        )?;
                    }
                }
                Err(e) => writeln!(err, "{}\t{}\t{e}", self.host, result.command)?,
            }
        }
        Ok(())
    }
}

/// Run `queries` over an established session.
pub fn run_session<S: DeviceStream>(
    client: &mut Lw3Client<S>,
    queries: &[Command],
) -> Vec<QueryResult> {
    let mut results = Vec::with_capacity(queries.len());

    for command in queries {
        let outcome = match command.execute(client) {
            Ok(Some(outcome)) => Ok(outcome),
            Ok(None) => break,
            Err(e) => Err(e),
        };
        let fatal = matches!(&outcome, Err(e) if !matches!(e, ProtocolError::Device { .. }));

        results.push(QueryResult {
            command: command.clone(),
            outcome,
        });
        if fatal {
            warn!("{}: session aborted after '{command}'", client.peer());
            break;
        }
    }
    results
}

/// Split an optional `:port` suffix off a host, e.g. `10.0.0.5:6108` or
/// `[fe80::1]:6108`. Bare IPv6 addresses keep `default_port`.
pub fn host_and_port(spec: &str, default_port: u16) -> (&str, u16) {
    if let Some((host, port)) = spec.rsplit_once(':') {
        if let Ok(port) = port.parse() {
            if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
                return (inner, port);
            }
            if !host.contains(':') {
                return (host, port);
            }
        }
    }
    (spec, default_port)
}

fn poll_device(
    spec: &str,
    default_port: u16,
    config: ClientConfig,
    queries: &[Command],
) -> ProtocolResult<Vec<QueryResult>> {
    let (host, port) = host_and_port(spec, default_port);
    let client = Lw3Client::connect(host, port, config)?;
    Ok(finish_session(client, queries))
}

/// Run `queries` and close the session. A failed shutdown is only logged; the
/// queries already have their answers.
fn finish_session<S: DeviceStream>(
    mut client: Lw3Client<S>,
    queries: &[Command],
) -> Vec<QueryResult> {
    let results = run_session(&mut client, queries);
    let peer = client.peer().to_string();
    if let Err(e) = client.close() {
        warn!("failed to shut down connection to {peer}: {e}");
    }
    results
}

pub struct Poller {
    hosts: Vec<String>,
    queries: Arc<Vec<Command>>,
    port: u16,
    config: ClientConfig,
    pool: SessionPool,
}

impl Poller {
    pub fn new(
        hosts: Vec<String>,
        queries: Vec<Command>,
        port: u16,
        config: ClientConfig,
        workers: usize,
    ) -> Self {
        Self {
            hosts,
            queries: Arc::new(queries),
            port,
            config,
            pool: SessionPool::new(workers.max(1)),
        }
    }

    /// Poll every host once. Reports come back in host order.
    pub fn run_once(&self) -> Vec<DeviceReport> {
        info!(
            "polling {} devices on {} workers",
            self.hosts.len(),
            self.pool.size()
        );
        let (tx, rx) = mpsc::channel();

        for (index, spec) in self.hosts.iter().enumerate() {
            let tx = tx.clone();
            let host = spec.clone();
            let queries = Arc::clone(&self.queries);
            let (port, config) = (self.port, self.config);

            self.pool.execute(spec, move || {
                let results = poll_device(&host, port, config, &queries);
                if let Err(e) = &results {
                    warn!("{host}: {e}");
                }
                // receiver only goes away if run_once itself unwound
                let _ = tx.send((index, DeviceReport { host, results }));
            });
        }
        drop(tx);

        let mut reports = rx.iter().collect::<Vec<_>>();
        reports.sort_by_key(|(index, _)| *index);
        reports.into_iter().map(|(_, report)| report).collect()
    }
}
