use simplelog::{Config, LevelFilter, WriteLogger};
use std::fs::{self, OpenOptions};
use std::io::{Error, ErrorKind};
use std::path::PathBuf;

/// `$HOME/.local/share/beatclockrs/logs`
pub fn log_dir() -> Result<PathBuf, Error> {
    let home = std::env::var("HOME")
        .map_err(|_| Error::new(ErrorKind::NotFound, "HOME environment variable not set"))?;

    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("beatclockrs")
        .join("logs"))
}

/// Installs the file logger. The terminal is reserved for the status line,
/// so nothing is logged to stdout.
pub fn init_logger() -> Result<PathBuf, Error> {
    let log_dir = log_dir()?;
    fs::create_dir_all(&log_dir)?;

    let path = log_dir.join("app.log");
    let log_file = OpenOptions::new().create(true).append(true).open(&path)?;

    WriteLogger::init(LevelFilter::Debug, Config::default(), log_file)
        .map_err(|e| Error::new(ErrorKind::Other, e.to_string()))?;
    Ok(path)
}

/// File logger if possible, `RUST_LOG`-filtered stderr logging otherwise.
pub fn init() {
    match init_logger() {
        Ok(path) => log::info!("Logging to {}", path.display()),
        Err(e) => {
            let fallback = env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or("warn"),
            )
            .try_init();
            if fallback.is_ok() {
                log::warn!("File logger unavailable ({}), logging to stderr", e);
            }
        }
    }
}
