use std::path::{Path, PathBuf};

use log::LevelFilter;
use simplelog::{ConfigBuilder, WriteLogger};

/// Environment variable selecting the diagnostic log level.
pub const LOG_ENV_VAR: &str = "CMDGATE_LOG";

/// `~/.local/share/cmdgate`, or `None` when `$HOME` is unset.
pub fn data_dir() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(Path::new(&home).join(".local/share/cmdgate"))
}

/// Parse a level name, falling back to `warn` for anything unrecognized.
pub fn level_from(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(LevelFilter::Warn)
}

/// Route `log` output to ~/.local/share/cmdgate/cmdgate.log.
/// Best-effort: if the file can't be opened, diagnostics are simply dropped
/// (stdout belongs to the hook response and must stay clean).
pub fn init() {
    let level = level_from(std::env::var(LOG_ENV_VAR).ok().as_deref());
    let Some(dir) = data_dir() else {
        return;
    };
    let _ = std::fs::create_dir_all(&dir);
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("cmdgate.log"))
    else {
        return;
    };

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_thread_level(LevelFilter::Off)
        .build();
    let _ = WriteLogger::init(level, config, file);
}
