use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use toml;

use crate::die;
use crate::registry::{ModelDescriptor, PlatformMetadata, ProxySettings};
use crate::warn;

#[derive(Deserialize, Serialize, Default, Debug)]
pub(crate) struct Config {
    /// Correlation id attached to every request. A random one is generated
    /// when it is unset.
    pub unique_id: Option<String>,
    /// Append every outgoing request to this file
    pub prompt_log: Option<PathBuf>,
    pub platform: Option<PlatformMetadata>,
    #[serde(default)]
    pub proxy: ProxySettings,
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

impl Config {
    pub(crate) fn unique_id(&self) -> String {
        match &self.unique_id {
            Some(unique_id) => unique_id.clone(),
            None => format!("{:032x}", rand::random::<u128>()),
        }
    }
}

fn get_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME");

    if let Some(home) = home {
        let home = PathBuf::from(home);

        const USER_PATHS: [&str; 2] = [".config/modelres/config.toml", ".modelres.toml"];

        for &path in USER_PATHS.iter() {
            let fullpath = home.join(path);

            if fullpath.exists() {
                return Some(fullpath);
            }
        }
    }

    let system_config = PathBuf::from("/etc/modelres.toml");

    if system_config.exists() {
        Some(system_config)
    } else {
        None
    }
}

fn parse_config<S: serde::de::DeserializeOwned>(config: &str) -> Result<S, toml::de::Error> {
    toml::de::from_str(config)
}

fn parse_config_or_die<S: serde::de::DeserializeOwned>(config: &str) -> S {
    match parse_config(config) {
        Ok(s) => s,
        Err(err) => die!("failed to parse config: {}", err),
    }
}

fn extra_fields_helper(
    path: &mut Vec<String>,
    user_value: &toml::Value,
    config_value: &toml::Value,
    extra: &mut Vec<String>,
) {
    match (user_value, config_value) {
        (toml::Value::Table(user_table), toml::Value::Table(config_table)) => {
            for (user_key, user_value) in user_table {
                path.push(user_key.clone());

                match config_table.get(user_key) {
                    Some(config_value) => {
                        extra_fields_helper(path, user_value, config_value, extra)
                    }
                    None => extra.push(path.join(".")),
                }

                path.pop();
            }
        }
        // [[models]] is an array of tables
        (toml::Value::Array(user_array), toml::Value::Array(config_array)) => {
            for (i, (user_value, config_value)) in
                user_array.iter().zip(config_array.iter()).enumerate()
            {
                path.push(i.to_string());

                extra_fields_helper(path, user_value, config_value, extra);

                path.pop();
            }
        }
        _ => {}
    }
}

/// Returns the dotted paths of keys present in the raw config but dropped by
/// deserialization.
fn extra_fields(config: &Config, raw_config: &str) -> Result<Vec<String>, toml::de::Error> {
    let user_config: toml::Value = parse_config(raw_config)?;

    let config: toml::Value = match toml::Value::try_from(config) {
        Ok(config) => config,
        // Nothing to compare against
        Err(_) => return Ok(Vec::new()),
    };

    let mut path = Vec::new();
    let mut extra = Vec::new();

    extra_fields_helper(&mut path, &user_config, &config, &mut extra);

    Ok(extra)
}

fn warn_on_extra_fields(config: &Config, raw_config: &str) {
    let extra = match extra_fields(config, raw_config) {
        Ok(extra) => extra,
        Err(err) => die!("failed to parse config: {}", err),
    };

    for key in extra {
        warn!("config contains extraneous key \"{}\", ignoring", key);
    }
}

fn read_config_file(path: &Path) -> Config {
    let raw_config = match std::fs::read_to_string(path) {
        Ok(raw_config) => raw_config,
        Err(err) => die!("failed to read config \"{}\": {}", path.display(), err),
    };

    let config: Config = parse_config_or_die(&raw_config);

    warn_on_extra_fields(&config, &raw_config);

    config
}

pub(crate) fn read_config(config: Option<PathBuf>) -> Config {
    let config_path = config.or_else(get_config_path);

    match config_path {
        Some(path) => {
            tracing::debug!("reading config from \"{}\"", path.display());

            read_config_file(&path)
        }
        None => Config::default(),
    }
}
