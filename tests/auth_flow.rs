//! Integration tests for the SSO login state machine using a scripted browser.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sciaccess_core::auth::{Authenticator, CookieStore, Credentials, StoredCookie};
use sciaccess_core::{AccessError, AccessorConfig};
use tempfile::TempDir;

mod support;
use support::scripted_browser::{Challenge, IDP_LOGIN_URL, ScriptedFactory, fast_login_settings};

const PORTAL: &str = "https://www.sciencedirect.com";
const IDENTITY: &str = "alice@sjtu.edu.cn";
const SECRET: &str = "correct-horse";

fn test_config(dir: &Path) -> AccessorConfig {
    AccessorConfig {
        content_base_url: PORTAL.to_string(),
        sso_login_url: "https://sso.example.test/v1/login?federation=idp&returnUrl=portal"
            .to_string(),
        cookie_file: dir.join("cookies.json"),
        artifacts_dir: Some(dir.join("artifacts")),
        login: fast_login_settings(),
        ..AccessorConfig::default()
    }
}

fn credentials() -> Credentials {
    Credentials::new(IDENTITY, SECRET, "sjtu.edu.cn").unwrap()
}

fn authenticator(config: &AccessorConfig, factory: &Arc<ScriptedFactory>) -> Authenticator {
    Authenticator::new(credentials(), config, Arc::clone(factory) as _).unwrap()
}

#[tokio::test]
async fn test_login_success_persists_cookies_and_snapshots() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let cookies = vec![
        StoredCookie::new("SDSESSION", "abc").with_domain(".sciencedirect.com"),
        StoredCookie::new("EUID", "xyz"),
    ];
    let factory = Arc::new(
        ScriptedFactory::new(format!("{PORTAL}/search")).with_cookies(cookies.clone()),
    );

    let session = authenticator(&config, &factory).login(None).await.unwrap();

    assert_eq!(session.cookies(), cookies.as_slice());
    assert_eq!(factory.launch_count(), 1);

    let stored = CookieStore::new(&config.cookie_file).load().unwrap().unwrap();
    assert_eq!(stored, cookies);

    let artifacts = dir.path().join("artifacts");
    assert!(artifacts.join("sso_page_0.html").exists());
    assert!(artifacts.join("after_login_0.html").exists());
    assert!(!artifacts.join("login_error_0.html").exists());
}

#[tokio::test]
async fn test_login_types_identity_then_secret() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let factory = Arc::new(ScriptedFactory::new(format!("{PORTAL}/")));

    authenticator(&config, &factory).login(None).await.unwrap();

    let typed = factory.typed();
    assert_eq!(
        typed,
        vec![
            ("#user".to_string(), IDENTITY.to_string()),
            ("#pass".to_string(), SECRET.to_string()),
        ]
    );
}

#[tokio::test]
async fn test_login_waits_for_human_to_solve_captcha() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let factory = Arc::new(
        ScriptedFactory::new(format!("{PORTAL}/")).with_challenge(Challenge::SolvedAfter(3)),
    );

    let session = authenticator(&config, &factory).login(None).await.unwrap();

    assert_eq!(factory.launch_count(), 1);
    assert!(!session.cookies().is_empty());
}

#[tokio::test]
async fn test_login_captcha_clearing_onto_identity_provider_proceeds() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let factory = Arc::new(
        ScriptedFactory::new(format!("{PORTAL}/"))
            .with_challenge(Challenge::SolvedAfter(3))
            .clearing_onto(IDP_LOGIN_URL),
    );

    let session = authenticator(&config, &factory).login(None).await.unwrap();

    assert_eq!(factory.launch_count(), 1);
    assert!(!session.cookies().is_empty());
    assert_eq!(
        factory.typed(),
        vec![
            ("#user".to_string(), IDENTITY.to_string()),
            ("#pass".to_string(), SECRET.to_string()),
        ]
    );
}

#[tokio::test]
async fn test_login_stuck_on_identity_provider_times_out_redirect() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.login.max_attempts = 1;
    config.login.redirect_timeout = Duration::from_millis(50);
    let factory = Arc::new(ScriptedFactory::new(IDP_LOGIN_URL));

    let err = authenticator(&config, &factory)
        .login(None)
        .await
        .unwrap_err();

    let AccessError::Authentication { source, .. } = err else {
        panic!("expected Authentication error");
    };
    assert!(
        matches!(&*source, AccessError::Timeout { operation, .. } if operation == "post-login redirect"),
        "unexpected source: {source}"
    );
}

#[tokio::test]
async fn test_login_blocked_captcha_exhausts_attempts_with_artifacts() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let factory = Arc::new(
        ScriptedFactory::new(format!("{PORTAL}/")).with_challenge(Challenge::Blocked),
    );

    let err = authenticator(&config, &factory)
        .login(None)
        .await
        .unwrap_err();

    match err {
        AccessError::Authentication { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(
                matches!(*source, AccessError::CaptchaBlocked { .. }),
                "unexpected source: {source}"
            );
        }
        other => panic!("expected Authentication error, got {other}"),
    }
    assert_eq!(factory.launch_count(), 3);

    let artifacts = dir.path().join("artifacts");
    for attempt in 0..3 {
        assert!(artifacts.join(format!("login_error_{attempt}.html")).exists());
        assert!(artifacts.join(format!("login_error_{attempt}.png")).exists());
    }
    assert!(!config.cookie_file.exists());
}

#[tokio::test]
async fn test_login_unsolved_captcha_times_out() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.login.max_attempts = 1;
    config.login.captcha_timeout = Duration::from_millis(30);
    let factory = Arc::new(
        ScriptedFactory::new(format!("{PORTAL}/")).with_challenge(Challenge::Unsolved),
    );

    let err = authenticator(&config, &factory)
        .login(None)
        .await
        .unwrap_err();

    let AccessError::Authentication { attempts, source } = err else {
        panic!("expected Authentication error");
    };
    assert_eq!(attempts, 1);
    assert!(
        matches!(&*source, AccessError::Timeout { operation, .. } if operation == "CAPTCHA resolution"),
        "unexpected source: {source}"
    );
}

#[tokio::test]
async fn test_login_retries_after_launch_failure() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let factory = Arc::new(ScriptedFactory::new(format!("{PORTAL}/")).failing_launches(2));

    let session = authenticator(&config, &factory).login(None).await.unwrap();

    assert_eq!(factory.launch_count(), 3);
    assert!(!session.cookies().is_empty());
}

#[tokio::test]
async fn test_login_launch_failures_exhaust_attempts() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let factory = Arc::new(ScriptedFactory::new(format!("{PORTAL}/")).failing_launches(5));

    let err = authenticator(&config, &factory)
        .login(None)
        .await
        .unwrap_err();

    let AccessError::Authentication { source, .. } = err else {
        panic!("expected Authentication error");
    };
    assert!(matches!(*source, AccessError::Driver(_)));
    assert_eq!(factory.launch_count(), 3);
}

#[tokio::test]
async fn test_login_without_artifacts_dir_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.artifacts_dir = None;
    let factory = Arc::new(
        ScriptedFactory::new(format!("{PORTAL}/")).with_challenge(Challenge::Blocked),
    );
    config.login.max_attempts = 1;

    assert!(authenticator(&config, &factory).login(None).await.is_err());
    assert!(!dir.path().join("artifacts").exists());
}
