//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Fetch ScienceDirect articles through institutional single sign-on.
///
/// Credentials are read from `SCIACCESS_USERNAME` and `SCIACCESS_PASSWORD`.
/// When the portal shows a CAPTCHA, solve it in the browser window; the login
/// resumes on its own.
#[derive(Parser, Debug)]
#[command(name = "sciaccess")]
#[command(author, version, about)]
pub struct Args {
    /// Article URLs to fetch
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file path (default: $XDG_CONFIG_HOME/sciaccess/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Where session cookies are persisted
    #[arg(long, value_name = "PATH")]
    pub cookie_file: Option<PathBuf>,

    /// Directory for login snapshots and screenshots
    #[arg(long, value_name = "DIR")]
    pub artifacts_dir: Option<PathBuf>,

    /// Endpoint returning a JSON array of proxies
    #[arg(long, value_name = "URL", env = "SCIACCESS_PROXY_API")]
    pub proxy_api: Option<String>,

    /// Fail instead of connecting directly when no proxy works
    #[arg(long)]
    pub require_proxy: bool,

    /// Run the browser without a window (CAPTCHAs cannot be solved)
    #[arg(long)]
    pub headless: bool,

    /// Minimum seconds between content requests (0-600)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(0..=600))]
    pub rate_limit_secs: Option<u64>,

    /// Seconds to wait for a CAPTCHA to be solved (1-3600)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub captcha_timeout_secs: Option<u64>,

    /// Upper bound in seconds on each article fetch, login included (1-3600)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout_secs: Option<u64>,

    /// Print records as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Log in, persist cookies and exit
    #[arg(long, conflicts_with = "urls")]
    pub login_only: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["sciaccess"]).unwrap();
        assert!(args.urls.is_empty());
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(!args.headless);
        assert!(!args.json);
        assert!(args.rate_limit_secs.is_none());
    }

    #[test]
    fn test_cli_positional_urls() {
        let args = Args::try_parse_from([
            "sciaccess",
            "https://www.sciencedirect.com/a",
            "https://www.sciencedirect.com/b",
        ])
        .unwrap();
        assert_eq!(args.urls.len(), 2);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["sciaccess", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["sciaccess", "--verbose"]).unwrap();
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["sciaccess", "-q"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["sciaccess", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Args::try_parse_from(["sciaccess", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["sciaccess", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_rate_limit_range() {
        let args = Args::try_parse_from(["sciaccess", "--rate-limit-secs", "0"]).unwrap();
        assert_eq!(args.rate_limit_secs, Some(0));

        let err = Args::try_parse_from(["sciaccess", "--rate-limit-secs", "601"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_captcha_timeout_rejects_zero() {
        let err =
            Args::try_parse_from(["sciaccess", "--captcha-timeout-secs", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_login_only_conflicts_with_urls() {
        let err = Args::try_parse_from([
            "sciaccess",
            "--login-only",
            "https://www.sciencedirect.com/a",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_path_options() {
        let args = Args::try_parse_from([
            "sciaccess",
            "--cookie-file",
            "/tmp/c.json",
            "--artifacts-dir",
            "/tmp/artifacts",
            "--log-file",
            "/tmp/sciaccess.log",
        ])
        .unwrap();
        assert_eq!(args.cookie_file, Some(PathBuf::from("/tmp/c.json")));
        assert_eq!(args.artifacts_dir, Some(PathBuf::from("/tmp/artifacts")));
        assert_eq!(args.log_file, Some(PathBuf::from("/tmp/sciaccess.log")));
    }
}
