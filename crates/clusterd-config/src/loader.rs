//! Merging configuration from its sources.

use crate::{paths, DaemonConfig};
use anyhow::{Context, Result};
use std::path::Path;

const ENV_PREFIX: &str = "CLUSTERD";

/// Builds the effective configuration for a deployment directory.
///
/// Precedence, lowest first: built-in defaults, the user config file,
/// `clusterd.toml`, `clusterd.local.toml`, `CLUSTERD_*` environment
/// variables. The merged result is validated before it is returned, so
/// a daemon never starts on tunables it would refuse at runtime.
pub fn load(project_dir: &Path) -> Result<DaemonConfig> {
    let defaults = config::Config::try_from(&DaemonConfig::default())?;
    let mut builder = config::Config::builder().add_source(defaults);

    let mut files = Vec::new();
    if let Some(user_file) = paths::user_config_file() {
        files.push(user_file);
    }
    files.push(paths::project_config_file(project_dir));
    files.push(paths::local_config_file(project_dir));
    for file in files.into_iter().filter(|f| f.exists()) {
        builder = builder.add_source(config::File::from(file).required(false).format(config::FileFormat::Toml));
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("_")
            .try_parsing(true),
    );

    let merged = builder.build().context("failed to merge configuration sources")?;
    let mut daemon_config: DaemonConfig = merged
        .try_deserialize()
        .context("configuration does not match the expected schema")?;
    daemon_config.resolve_paths(project_dir);
    daemon_config.validate()?;
    Ok(daemon_config)
}
