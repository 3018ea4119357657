pub mod collect;
pub mod export;
pub mod runs;

use std::error::Error;

/// How a command finished when it did not hit a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Clean,
    Failed,
}

pub type CommandResult = Result<CommandStatus, Box<dyn Error>>;
