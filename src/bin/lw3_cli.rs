use std::{error::Error, io};

use clap::Parser;
use lw3probe::{cli::PromptError, *};

#[derive(Debug, Parser)]
#[command(version, about = "Interactive read-only LW3 shell", long_about = None)]
struct Cli {
    /// Device host name or address
    host: String,

    #[command(flatten)]
    connect: ConnectArgs,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let mut client = Lw3Client::connect(&cli.host, cli.connect.port, cli.connect.config())?;

    let stdio = io::stdin();
    let stdout = io::stdout();

    loop {
        let reader = stdio.lock();
        let writer = StdOut {
            inner: stdout.lock(),
        };

        let cmd = match prompt(reader, writer) {
            Ok(c) => c,
            Err(PromptError::Command(e)) => {
                eprintln!("{e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match cmd.execute(&mut client) {
            Ok(None) => break,
            Ok(Some(out)) => println!("{out}"),
            Err(e @ ProtocolError::Device { .. }) => eprintln!("query error: {e}"),
            // the stream may be out of step with the device now
            Err(e) => return Err(e.into()),
        }
    }

    client.close()?;
    Ok(())
}

/// Stdout wrapper that flushes after every write so the prompt shows up.
struct StdOut<W: io::Write> {
    inner: W,
}

impl<W: io::Write> io::Write for StdOut<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let res = self.inner.write(buf);
        if res.is_ok() {
            self.inner.flush()?
        }
        res
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
