pub mod cli;
pub mod command;
pub mod poll;
pub mod protocol;

pub use cli::{ConnectArgs, prompt};
pub use command::{Command, CommandError, Outcome};
pub use protocol::{Lw3Client, ProtocolError};
