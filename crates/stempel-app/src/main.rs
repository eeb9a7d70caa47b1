// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stempel: a virtual IPP printer.
//
// Entry point. Initialises logging, resolves the printer configuration from
// an optional JSON file plus command-line overrides, and serves the printer
// until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use stempel_core::PrinterConfig;
use stempel_core::error::Result;
use stempel_print::{IppServer, JobSignal, Printer};

/// Stempel - virtual IPP/1.1 printer
#[derive(Parser, Debug)]
#[command(name = "stempel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Printer name
    #[arg(long)]
    name: Option<String>,

    /// Printer URI (default: ipp://<hostname>:<port>/)
    #[arg(long)]
    uri: Option<String>,

    /// TCP port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Always answer with IPP/1.1, even to IPP/1.0 clients
    #[arg(long)]
    no_fallback: bool,

    /// Do not advertise the printer via mDNS
    #[arg(long)]
    no_discovery: bool,

    /// Write received documents to this directory instead of discarding them
    #[arg(long, value_name = "DIR")]
    spool_dir: Option<PathBuf>,
}

impl Cli {
    fn printer_config(&self) -> Result<PrinterConfig> {
        let mut config = match &self.config {
            Some(path) => PrinterConfig::load(path)?,
            None => PrinterConfig::default(),
        };
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(uri) = &self.uri {
            config.uri = Some(uri.clone());
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.no_fallback {
            config.fallback = false;
        }
        if self.no_discovery {
            config.discovery = false;
        }
        if let Some(dir) = &self.spool_dir {
            config.spool_dir = Some(dir.clone());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "stempel failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.printer_config()?;
    info!(name = %config.name, port = config.port, "Stempel starting");

    let printer = Arc::new(Printer::new(&config));
    tokio::spawn(log_jobs(Arc::clone(&printer)));

    let mut server = IppServer::new(Arc::clone(&printer));
    server.start().await?;
    info!(uri = %printer.uri(), port = server.port(), "printer ready");

    tokio::signal::ctrl_c().await?;
    info!("interrupt received");

    server.stop().await
}

/// Log the lifecycle of every job.
async fn log_jobs(printer: Arc<Printer>) {
    let mut jobs = printer.subscribe_jobs();
    loop {
        let job = match jobs.recv().await {
            Ok(job) => job,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "job log fell behind");
                continue;
            }
            Err(RecvError::Closed) => return,
        };

        tokio::spawn(async move {
            let mut signals = job.subscribe();
            loop {
                let signal = signals.borrow_and_update().clone();
                match signal {
                    JobSignal::Completed => {
                        info!(
                            job_id = job.id(),
                            octets = job.octets(),
                            sha256 = %job.digest().unwrap_or_default(),
                            "job finished"
                        );
                        return;
                    }
                    JobSignal::Canceled => {
                        info!(job_id = job.id(), "job canceled");
                        return;
                    }
                    JobSignal::Aborted(status) => {
                        warn!(job_id = job.id(), %status, "job aborted");
                        return;
                    }
                    JobSignal::Failed(reason) => {
                        warn!(job_id = job.id(), %reason, "document stream failed");
                    }
                    JobSignal::Idle => {}
                }
                if signals.changed().await.is_err() {
                    return;
                }
            }
        });
    }
}
