//! CLI utilities for lw3probe.
//!
//! The utilities present in this module are shared by the `lw3_cli` and
//! `lw3_poll` binaries: the interactive prompt and the connection options.
use std::{
    io::{self, BufRead, Write},
    time::Duration,
};

use clap::Args;
use thiserror::Error;

use crate::{
    Command, CommandError,
    protocol::{ClientConfig, DEFAULT_PORT, MAX_READS, Termination},
};

#[derive(Debug, Error)]
pub enum PromptError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("prompt IO error: {0}")]
    Io(#[from] io::Error),
}

/// Prompt user for a valid query command.
///
/// End of input is treated as [`Command::Exit`].
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, PromptError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Ok(Command::Exit);
    }

    Ok(Command::try_from(s.as_str())?)
}

/// Connection options shared by every binary.
#[derive(Debug, Clone, Args)]
pub struct ConnectArgs {
    /// Device TCP port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Connect and read timeout, in seconds
    #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Reads allowed per response before it is considered unframed
    #[arg(long, default_value_t = MAX_READS)]
    pub max_reads: usize,

    /// Detect the end of a response from the buffered tail rather than the
    /// latest chunk
    #[arg(long)]
    pub tail_framing: bool,
}

impl ConnectArgs {
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.timeout),
            max_reads: self.max_reads,
            termination: if self.tail_framing {
                Termination::BufferTail
            } else {
                Termination::LatestChunk
            },
            ..ClientConfig::default()
        }
    }
}
