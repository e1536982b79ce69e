use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tardis_types::datafile::url_scheme;
use tardis_types::{Result, TardisError};

use super::types::TardisConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "TARDIS_MIGRATE_CONFIG";

/// Expand `${VAR}` and `${VAR:-default}` placeholders in raw config text.
/// `$${` yields a literal `${`.
fn expand_env_placeholders(input: &str, path: &Path) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0usize;

    while let Some(offset) = input[cursor..].find("${") {
        let start = cursor + offset;
        if start > 0 && input.as_bytes()[start - 1] == b'$' {
            out.push_str(&input[cursor..start - 1]);
            out.push_str("${");
            cursor = start + 2;
            continue;
        }
        out.push_str(&input[cursor..start]);

        let token_start = start + 2;
        let Some(token_end_rel) = input[token_start..].find('}') else {
            return Err(config_expand_error(
                path,
                input,
                start,
                "unterminated environment placeholder",
            ));
        };
        let token_end = token_start + token_end_rel;
        let token = &input[token_start..token_end];
        out.push_str(&resolve_env_token(token, path, input, start)?);
        cursor = token_end + 1;
    }

    out.push_str(&input[cursor..]);
    Ok(out)
}

fn resolve_env_token(token: &str, path: &Path, input: &str, start: usize) -> Result<String> {
    let (name, default) = match token.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (token, None),
    };
    if !is_valid_env_var_name(name) {
        return Err(config_expand_error(
            path,
            input,
            start,
            format!("invalid environment placeholder '{token}'"),
        ));
    }

    match (std::env::var(name), default) {
        (Ok(value), Some(default)) if value.is_empty() => Ok(default.to_string()),
        (Ok(value), _) => Ok(value),
        (Err(std::env::VarError::NotPresent), Some(default)) => Ok(default.to_string()),
        (Err(std::env::VarError::NotPresent), None) => Err(config_expand_error(
            path,
            input,
            start,
            format!("environment variable '{name}' is not set"),
        )),
        (Err(std::env::VarError::NotUnicode(_)), _) => Err(config_expand_error(
            path,
            input,
            start,
            format!("environment variable '{name}' is not valid UTF-8"),
        )),
    }
}

fn is_valid_env_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first == '_' || first.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn config_expand_error(
    path: &Path,
    input: &str,
    start: usize,
    message: impl fmt::Display,
) -> TardisError {
    let before = &input[..start];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    TardisError::Config(format!(
        "invalid config '{}': {message} at line {line}, column {column}",
        path.display()
    ))
}

/// Read, expand, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<TardisConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| TardisError::Config(format!("cannot read '{}': {e}", path.display())))?;
    parse_config(&contents, path)
}

/// Parse config text. `path` is only used in error messages.
pub fn parse_config(contents: &str, path: &Path) -> Result<TardisConfig> {
    let expanded = expand_env_placeholders(contents, path)?;
    let mut config: TardisConfig = serde_yaml::from_str(&expanded)
        .map_err(|e| TardisError::Config(format!("invalid config '{}': {e}", path.display())))?;
    config.expand_paths();
    validate(&config)?;
    Ok(config)
}

fn validate(config: &TardisConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for dest in &config.destinations {
        if dest.name.trim().is_empty() {
            return Err(TardisError::Config("destination name must not be empty".into()));
        }
        if !seen.insert(dest.name.as_str()) {
            return Err(TardisError::Config(format!(
                "duplicate destination name: '{}'",
                dest.name
            )));
        }
        let scheme_ok = url_scheme(&dest.base_url)
            .is_some_and(|scheme| dest.provider.schemes().contains(&scheme));
        if !scheme_ok {
            return Err(TardisError::Config(format!(
                "destination '{}': base_url '{}' is not a {} url",
                dest.name, dest.base_url, dest.provider
            )));
        }
    }

    let references = [
        ("default_destination", config.default_destination.as_deref()),
        ("archive.default_location", config.archive.default_location.as_deref()),
    ];
    for (key, name) in references {
        if let Some(name) = name {
            if !seen.contains(name) {
                return Err(TardisError::Config(format!(
                    "{key} names unknown destination '{name}'"
                )));
            }
        }
    }

    let scoring = &config.scoring;
    let classes = scoring.user_priority_weighting.len();
    if classes == 0 {
        return Err(TardisError::Config(
            "scoring.user_priority_weighting must not be empty".into(),
        ));
    }
    if scoring.default_user_priority >= classes {
        return Err(TardisError::Config(format!(
            "scoring.default_user_priority {} is out of range (0..{classes})",
            scoring.default_user_priority
        )));
    }
    if let Some((user, class)) = scoring.user_priorities.iter().find(|(_, c)| **c >= classes) {
        return Err(TardisError::Config(format!(
            "scoring.user_priorities: class {class} for '{user}' is out of range (0..{classes})"
        )));
    }
    Ok(())
}

/// Tracks where the config file was found.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Explicitly passed via `--config`.
    CliArg(PathBuf),
    /// Set via the `TARDIS_MIGRATE_CONFIG` env var.
    EnvVar(PathBuf),
    /// Found by searching standard locations.
    SearchOrder { path: PathBuf, level: &'static str },
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::CliArg(p) | ConfigSource::EnvVar(p) => p,
            ConfigSource::SearchOrder { path, .. } => path,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::CliArg(p) => write!(f, "{} (--config)", p.display()),
            ConfigSource::EnvVar(p) => write!(f, "{} ({CONFIG_ENV_VAR})", p.display()),
            ConfigSource::SearchOrder { path, level } => write!(f, "{} ({level})", path.display()),
        }
    }
}

/// Returns search locations in priority order: project, user, system.
pub fn default_config_search_paths() -> Vec<(PathBuf, &'static str)> {
    let mut paths = vec![(PathBuf::from("tardis-migrate.yaml"), "project")];
    if let Some(base) = dirs::config_dir() {
        paths.push((base.join("tardis-migrate").join("config.yaml"), "user"));
    }
    paths.push((PathBuf::from("/etc/tardis-migrate/config.yaml"), "system"));
    paths
}

/// Resolve which config file to use.
///
/// Priority: CLI arg > `TARDIS_MIGRATE_CONFIG` > first existing file from the
/// search paths. Returns `None` if nothing is found.
pub fn resolve_config_path(cli_config: Option<&str>) -> Option<ConfigSource> {
    if let Some(path) = cli_config {
        return Some(ConfigSource::CliArg(PathBuf::from(path)));
    }

    if let Ok(val) = std::env::var(CONFIG_ENV_VAR) {
        if !val.is_empty() {
            return Some(ConfigSource::EnvVar(PathBuf::from(val)));
        }
    }

    default_config_search_paths()
        .into_iter()
        .find(|(path, _)| path.exists())
        .map(|(path, level)| ConfigSource::SearchOrder { path, level })
}

/// A starting config for new installations.
pub fn minimal_config_template() -> &'static str {
    r#"# tardis-migrate configuration

file_store_path: /var/lib/tardis/store
catalog_path: /var/lib/tardis/catalog.json
default_destination: archive

destinations:
  - name: archive
    provider: http
    base_url: http://archive.example.org/data/
    trust_length: false
    metadata_supported: true

# archive:
#   path_mapper: dataset
#   default_location: archive
#
# scoring:
#   user_priorities:
#     alice: 0
"#
}
