//! Process bootstrap: load `.env` settings into the environment.
//!
//! Values already present in the environment always win. This lets a shell
//! export override whatever the settings file says.

use std::path::Path;
use std::sync::Once;

/// File name looked up by [`load`].
pub const ENV_FILE: &str = ".env";

static LOAD: Once = Once::new();

/// Load `.env` from the current directory or the nearest ancestor holding one.
///
/// Runs at most once per process. A missing file is silent; a malformed one
/// is logged and otherwise ignored.
pub fn load() {
    LOAD.call_once(|| match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => tracing::debug!("No {ENV_FILE} file found"),
        Err(e) => tracing::warn!("Ignoring unreadable {ENV_FILE} file: {e}"),
    });
}

/// Load a specific env file without overriding existing variables.
///
/// Returns `Ok(false)` when the file does not exist.
pub fn load_from(path: &Path) -> Result<bool, dotenvy::Error> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
