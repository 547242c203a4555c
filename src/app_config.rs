//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// TOML-style file configuration for accessor defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Content portal base URL.
    pub content_base_url: Option<String>,
    /// Federated SSO entry URL.
    pub sso_login_url: Option<String>,
    /// Email domain institutional identities must belong to.
    pub institution_domain: Option<String>,
    /// Minimum gap between content requests in seconds.
    pub min_request_interval_secs: Option<u64>,
    /// Maximum session age in seconds.
    pub max_session_duration_secs: Option<u64>,
    /// Cookie persistence file.
    pub cookie_file: Option<PathBuf>,
    /// Directory for login diagnostics.
    pub artifacts_dir: Option<PathBuf>,
    /// Proxy source endpoint.
    pub proxy_api: Option<String>,
    /// Refuse direct connections when no proxy validates.
    pub require_proxy: Option<bool>,
    /// How long to wait for a human to solve a CAPTCHA, in seconds.
    pub captcha_timeout_secs: Option<u64>,
    /// Run the browser without a window.
    pub headless: Option<bool>,
    /// Upper bound on one article fetch, in seconds.
    pub operation_timeout_secs: Option<u64>,
    /// Content client connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Content client read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Log file path.
    pub log_file: Option<PathBuf>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(interval) = self.min_request_interval_secs
            && interval > 600
        {
            bail!(
                "Invalid config value for `min_request_interval_secs`: {interval}. Expected range: 0..=600"
            );
        }
        if let Some(duration) = self.max_session_duration_secs
            && !(60..=86_400).contains(&duration)
        {
            bail!(
                "Invalid config value for `max_session_duration_secs`: {duration}. Expected range: 60..=86400"
            );
        }
        validate_timeout_secs("captcha_timeout_secs", self.captcha_timeout_secs)?;
        validate_timeout_secs("operation_timeout_secs", self.operation_timeout_secs)?;
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        validate_url_value("content_base_url", self.content_base_url.as_deref())?;
        validate_url_value("sso_login_url", self.sso_login_url.as_deref())?;
        validate_url_value("proxy_api", self.proxy_api.as_deref())?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

fn validate_url_value(field: &str, value: Option<&str>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if url::Url::parse(value).is_err() {
        bail!("Invalid config value for `{field}`: '{value}' is not an absolute URL");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/sciaccess/config.toml`
/// 2. `$HOME/.config/sciaccess/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("sciaccess")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("sciaccess")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` when given, otherwise from the default path if
/// present.
///
/// An explicit path that does not exist is an error; a missing default file is not.
pub fn load_file_config_from(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref() else {
        return Ok(LoadedConfig { path, config: None });
    };
    if !path_ref.exists() {
        return Ok(LoadedConfig { path, config: None });
    }

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let line_no = line_index + 1;

        match key {
            "content_base_url" => cfg.content_base_url = Some(string_value(key, value, line_no)?),
            "sso_login_url" => cfg.sso_login_url = Some(string_value(key, value, line_no)?),
            "institution_domain" => {
                cfg.institution_domain = Some(string_value(key, value, line_no)?);
            }
            "proxy_api" => cfg.proxy_api = Some(string_value(key, value, line_no)?),
            "cookie_file" => cfg.cookie_file = Some(PathBuf::from(string_value(key, value, line_no)?)),
            "artifacts_dir" => {
                cfg.artifacts_dir = Some(PathBuf::from(string_value(key, value, line_no)?));
            }
            "log_file" => cfg.log_file = Some(PathBuf::from(string_value(key, value, line_no)?)),
            "min_request_interval_secs" => {
                cfg.min_request_interval_secs = Some(integer_value(key, value, line_no)?);
            }
            "max_session_duration_secs" => {
                cfg.max_session_duration_secs = Some(integer_value(key, value, line_no)?);
            }
            "captcha_timeout_secs" => {
                cfg.captcha_timeout_secs = Some(integer_value(key, value, line_no)?);
            }
            "operation_timeout_secs" => {
                cfg.operation_timeout_secs = Some(integer_value(key, value, line_no)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(integer_value(key, value, line_no)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(integer_value(key, value, line_no)?);
            }
            "require_proxy" => cfg.require_proxy = Some(boolean_value(key, value, line_no)?),
            "headless" => cfg.headless = Some(boolean_value(key, value, line_no)?),
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn string_value(key: &str, value: &str, line_no: usize) -> Result<String> {
    parse_string_literal(value).with_context(|| format!("Invalid `{key}` value on line {line_no}"))
}

fn integer_value(key: &str, value: &str, line_no: usize) -> Result<u64> {
    parse_integer_u64(value).with_context(|| format!("Invalid `{key}` value on line {line_no}"))
}

fn boolean_value(key: &str, value: &str, line_no: usize) -> Result<bool> {
    parse_boolean(value).with_context(|| format!("Invalid `{key}` value on line {line_no}"))
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
min_request_interval_secs = 8
cookie_file = "/tmp/sd-cookies.json"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.min_request_interval_secs, Some(8));
        assert_eq!(cfg.cookie_file, Some(PathBuf::from("/tmp/sd-cookies.json")));
        assert!(cfg.proxy_api.is_none());
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r#"
captcha_timeout_secs = 600 # give the human more time
proxy_api = "http://127.0.0.1:5010/all#fragment" # hash inside string kept
"#,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.captcha_timeout_secs, Some(600));
        assert_eq!(
            cfg.proxy_api.as_deref(),
            Some("http://127.0.0.1:5010/all#fragment")
        );
    }

    #[test]
    fn test_parse_config_booleans() {
        let cfg = parse_config_str("headless = true\nrequire_proxy = false")
            .expect("booleans should parse");
        assert_eq!(cfg.headless, Some(true));
        assert_eq!(cfg.require_proxy, Some(false));
    }

    #[test]
    fn test_parse_config_rejects_invalid_boolean() {
        let err = parse_config_str("headless = yes").expect_err("invalid boolean expected");
        assert!(format!("{err:#}").contains("headless"));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string() {
        let err = parse_config_str("institution_domain = sjtu.edu.cn")
            .expect_err("unquoted string expected to fail");
        assert!(format!("{err:#}").contains("institution_domain"));
    }

    #[test]
    fn test_parse_config_rejects_numeric_values_with_trailing_tokens() {
        let err = parse_config_str("read_timeout_secs = 4 trailing")
            .expect_err("expected trailing token error");
        assert!(format!("{err:#}").contains("read_timeout_secs"));
    }

    #[test]
    fn test_parse_config_rejects_out_of_range_timeout() {
        let err = parse_config_str("captcha_timeout_secs = 0").expect_err("0 is below range");
        assert!(err.to_string().contains("captcha_timeout_secs"));
    }

    #[test]
    fn test_parse_config_rejects_short_session_duration() {
        let err = parse_config_str("max_session_duration_secs = 10")
            .expect_err("10s is below range");
        assert!(err.to_string().contains("max_session_duration_secs"));
    }

    #[test]
    fn test_parse_config_rejects_relative_url() {
        let err = parse_config_str(r#"content_base_url = "/relative""#)
            .expect_err("relative URL should be rejected");
        assert!(err.to_string().contains("content_base_url"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("unknown_key = 123").expect_err("unknown key error expected");
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("unknown_key"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("headless").expect_err("syntax error expected");
        assert!(err.to_string().contains("expected key = value"));
    }

    #[test]
    fn test_load_file_config_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "headless = true\n").unwrap();
        let loaded = load_file_config_from(Some(&path)).unwrap();
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.config.unwrap().headless, Some(true));
    }

    #[test]
    fn test_load_file_config_from_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(load_file_config_from(Some(&missing)).is_err());
    }
}
