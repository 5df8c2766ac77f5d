use std::{
    error::Error,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use clap::Parser;
use log::info;
use lw3probe::{Command, CommandError, ConnectArgs, poll::Poller};

#[derive(Debug, Parser)]
#[command(version, about = "Poll LW3 devices in parallel", long_about = None)]
struct Cli {
    /// Devices to poll, optionally as host:port
    #[arg(required = true)]
    hosts: Vec<String>,

    /// Query to run on every device, e.g. "props /SYS/HSMB/FANCONTROL"
    #[arg(short, long = "query", required = true, value_parser = parse_command)]
    queries: Vec<Command>,

    /// Repeat every N seconds until interrupted
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    every: Option<u64>,

    /// Devices polled at the same time
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    #[command(flatten)]
    connect: ConnectArgs,
}

fn parse_command(s: &str) -> Result<Command, CommandError> {
    match Command::try_from(s)? {
        Command::Exit => Err(CommandError::UnrecognizedCommand(s.to_string())),
        cmd => Ok(cmd),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let poller = Poller::new(
        cli.hosts,
        cli.queries,
        cli.connect.port,
        cli.connect.config(),
        cli.workers,
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    loop {
        let started = Instant::now();
        let reports = poller.run_once();

        let mut stdout = io::stdout().lock();
        let mut stderr = io::stderr().lock();
        for report in &reports {
            report.render(&mut stdout, &mut stderr)?;
        }
        drop((stdout, stderr));

        let Some(every) = cli.every else {
            break;
        };
        let interval = Duration::from_secs(every);
        while running.load(Ordering::SeqCst) && started.elapsed() < interval {
            thread::sleep(Duration::from_millis(100));
        }
        if !running.load(Ordering::SeqCst) {
            info!("interrupted; stopping");
            break;
        }
    }

    Ok(())
}
