//! Fns to read variables from the environment more conveniently and help other functions figure
//! out what environment they're running in.

use std::env;
use std::str::FromStr;

use lazy_static::lazy_static;
use tracing::debug;

use crate::telemetry::{ConflictPolicy, EconomicsPolicy};

const SECRET_LOG_BLACKLIST: [&str; 1] = ["DATABASE_URL"];

lazy_static! {
    pub static ref ENV_CONFIG: EnvConfig = get_env_config();
}

fn obfuscate_if_secret(blacklist: &[&str], key: &str, value: &str) -> String {
    if blacklist.contains(&key) {
        let mut last_four = value.to_string();
        last_four.drain(0..value.len().saturating_sub(4));
        format!("****{last_four}")
    } else {
        value.to_string()
    }
}

/// Get an environment variable, encoding found or missing as Option, and panic otherwise.
pub fn get_env_var(key: &str) -> Option<String> {
    let var = match env::var(key) {
        Err(env::VarError::NotPresent) => None,
        Err(e) => panic!("{e}"),
        Ok(var) => Some(var),
    };

    if let Some(ref existing_var) = var {
        let output = obfuscate_if_secret(&SECRET_LOG_BLACKLIST, key, existing_var);
        debug!("env var {key}: {output}");
    } else {
        debug!("env var {key} requested but not found")
    };

    var
}

pub fn get_env_bool(key: &str) -> Option<bool> {
    get_env_var(key).map(|var| match var.to_lowercase().as_str() {
        "true" => true,
        "false" => false,
        "t" => true,
        "f" => false,
        "1" => true,
        "0" => false,
        str => panic!("invalid bool value {str} for {key}"),
    })
}

fn get_env_parsed<T: FromStr + Default>(key: &str) -> T
where
    <T as FromStr>::Err: std::fmt::Display,
{
    get_env_var(key)
        .map(|var| T::from_str(&var).unwrap_or_else(|e| panic!("invalid value for {key}: {e}")))
        .unwrap_or_default()
}

pub struct EnvConfig {
    pub api_base_url: String,
    pub conflict_policy: ConflictPolicy,
    pub db_url: String,
    pub economics_policy: EconomicsPolicy,
    // Money supply lives on a separate URL root on some explorers.
    pub ext_base_url: String,
    pub log_json: bool,
    pub log_perf: bool,
}

pub fn get_env_config() -> EnvConfig {
    let api_base_url = get_env_var("API_BASE_URL").expect("API_BASE_URL is required");

    EnvConfig {
        conflict_policy: get_env_parsed("CONFLICT_POLICY"),
        db_url: get_env_var("DATABASE_URL").expect("DATABASE_URL is required"),
        economics_policy: get_env_parsed("ECONOMICS_POLICY"),
        ext_base_url: get_env_var("EXT_API_BASE_URL").unwrap_or_else(|| api_base_url.clone()),
        log_json: get_env_bool("LOG_JSON").unwrap_or(false),
        log_perf: get_env_bool("LOG_PERF").unwrap_or(false),
        api_base_url,
    }
}
