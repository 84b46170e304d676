use std::io;
use std::path::{Path, PathBuf};

const CONFIG_DIR_NAME: &str = "weather_ingest";
const CONFIG_FILE_NAME: &str = "config.yaml";

/// `<config_dir>/weather_ingest/config.yaml`, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Creates the parent directory of `path` when it does not exist yet.
pub fn ensure_parent_dir_exists(path: &Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    match std::fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("Path exists but is not a directory: {}", parent.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("Creating directory: {}", parent.display());
            std::fs::create_dir_all(parent)
        }
        Err(e) => Err(e),
    }
}

/// Renders an error followed by its chain of sources, `outer: inner: root`.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
