use std::fs::OpenOptions;
use std::path::Path;

use env_logger::{Builder, Env, Target};

/// Installs the process logger. Falls back to stderr when the log file cannot be opened.
pub(crate) fn init(log_file: Option<&Path>) -> Result<(), std::io::Error> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    let opened = match log_file {
        Some(path) => OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(|file| {
                builder.target(Target::Pipe(Box::new(file)));
            }),
        None => Ok(()),
    };

    // A second init (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
    opened
}
