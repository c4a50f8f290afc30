use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default buildseq data directory: ~/.buildseq
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".buildseq"))
}

/// Parse a config file.
pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let cfg = toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
    Ok(cfg)
}

/// Load configuration: `~/.buildseq/config.toml`, then `./buildseq.toml`,
/// else defaults; then environment overrides.
pub fn load_default() -> anyhow::Result<AppConfig> {
    let data_dir = get_data_dir()?;
    let user_config = data_dir.join("config.toml");
    let local_config = Path::new("buildseq.toml");

    let mut cfg = if user_config.exists() {
        load_from_path(&user_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    if cfg
        .logging
        .directory
        .as_ref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg);
    expand_paths(&mut cfg);
    Ok(cfg)
}

/// Environment variable overrides (highest priority).
pub fn apply_env_overrides(cfg: &mut AppConfig) {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

    if let Some(v) = var("BUILDSEQ_GENERATION_URL") {
        cfg.generation.base_url = v;
    }
    if let Some(v) = var("BUILDSEQ_GENERATION_API_KEY") {
        cfg.generation.api_key = v;
    }
    if let Some(v) = var("BUILDSEQ_MODEL") {
        cfg.generation.model = v;
    }
    if let Some(v) = var("BUILDSEQ_OUTPUT_ROOT") {
        cfg.project.output_root = v;
    }
}

/// Expand `~` and `$VAR` in path-valued settings.
pub fn expand_paths(cfg: &mut AppConfig) {
    cfg.project.output_root = expand(&cfg.project.output_root);
    if let Some(dir) = cfg.logging.directory.as_mut() {
        *dir = expand(dir);
    }
}

fn expand(value: &str) -> String {
    match shellexpand::full(value) {
        Ok(expanded) => expanded.into_owned(),
        Err(e) => {
            tracing::warn!(value, error = %e, "could not expand path, using it verbatim");
            value.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_from_path_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[project]\nname = \"shop\"\noutput_root = \"~/out\"").unwrap();

        let mut cfg = load_from_path(file.path()).unwrap();
        assert_eq!(cfg.project.name, "shop");

        expand_paths(&mut cfg);
        assert!(!cfg.project.output_root.starts_with('~'));
    }

    #[test]
    fn invalid_toml_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[executor\npoll").unwrap();
        let err = load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}
