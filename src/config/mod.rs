//! Config Store — spec.md §4.4. Holds the current `Configuration`
//! snapshot and reloads it on a schedule; a parse failure logs and
//! retains the previous snapshot rather than aborting.

pub mod expr;
pub mod model;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use model::{Configuration, RawConfig};

const DEFAULT_CONFIG_PATH: &str = "/etc/plancton/config.toml";
const CONFIG_PATH_ENV: &str = "PLANCTON_CONFIG";

pub struct ConfigStore {
    path: PathBuf,
    ncpus: usize,
    current: Arc<Configuration>,
}

impl ConfigStore {
    /// Build the store's initial snapshot. A missing or unparseable
    /// file at startup is not fatal — it resolves against
    /// `RawConfig::default()`, same as a reload would.
    pub fn load(ncpus: usize) -> Self {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let raw = read_raw(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "using default configuration");
            RawConfig::default()
        });

        let resolved = Configuration::resolve(&raw, ncpus, None);
        if let Err(e) = resolved.validate() {
            tracing::warn!(error = %e, "initial configuration failed validation, using it anyway");
        }

        Self {
            path,
            ncpus,
            current: Arc::new(resolved),
        }
    }

    pub fn current(&self) -> Arc<Configuration> {
        Arc::clone(&self.current)
    }

    /// Re-read the configuration file and, if it parses and validates,
    /// swap it in. On any failure the previous snapshot is kept and
    /// the failure is logged (spec.md §4.4, §7's `ConfigReadError`).
    pub fn reload(&mut self) {
        let raw = match read_raw(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "config reload failed, keeping previous snapshot");
                return;
            }
        };

        let resolved = Configuration::resolve(&raw, self.ncpus, Some(&self.current));
        if let Err(e) = resolved.validate() {
            tracing::warn!(error = %e, "reloaded configuration failed validation, keeping previous snapshot");
            return;
        }

        self.current = Arc::new(resolved);
    }
}

fn read_raw(path: &Path) -> Result<RawConfig, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    toml::from_str(&text).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "plancton-config-test-{}-{}.toml",
            std::process::id(),
            contents.len()
        ));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn reload_keeps_previous_on_parse_error() {
        let path = write_temp("max_docks = \"ncpus - 2\"\n");
        std::env::set_var(CONFIG_PATH_ENV, &path);
        let mut store = ConfigStore::load(8);
        assert_eq!(store.current().max_docks, 6);

        std::fs::write(&path, "this is not valid toml [[[").unwrap();
        store.reload();
        assert_eq!(store.current().max_docks, 6);

        std::fs::remove_file(&path).ok();
        std::env::remove_var(CONFIG_PATH_ENV);
    }

    #[test]
    fn reload_picks_up_changed_value() {
        let path = write_temp("max_docks = \"4\"\n");
        std::env::set_var(CONFIG_PATH_ENV, &path);
        let mut store = ConfigStore::load(8);
        assert_eq!(store.current().max_docks, 4);

        std::fs::write(&path, "max_docks = \"2\"\n").unwrap();
        store.reload();
        assert_eq!(store.current().max_docks, 2);

        std::fs::remove_file(&path).ok();
        std::env::remove_var(CONFIG_PATH_ENV);
    }
}
