/// Authentication flow against scripted pages: saved sessions, credential
/// login and the fail-fast challenge policy.
mod common;

use comment_scout::config::{ChallengePolicy, Credentials};
use comment_scout::features::auth::Authenticator;
use comment_scout::features::pacing::Pacer;
use comment_scout::features::session_store::{SessionStore, DEFAULT_IDENTIFIER};
use comment_scout::{CrawlError, CrawlerConfig};
use common::{fast_config, init_logger, FakePage, BASE};
use serde_json::json;

const LOGIN_FORM: &str = r#"<form><input name="email"><input name="pass" type="password">
    <button name="login" type="submit">Log in</button></form>"#;

fn config_in(dir: &std::path::Path) -> CrawlerConfig {
    CrawlerConfig {
        data_dir: dir.to_path_buf(),
        ..fast_config()
    }
}

#[tokio::test]
async fn saved_cookies_are_injected_and_accepted() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let store = SessionStore::new(config.cookies_dir());
    store
        .save(
            DEFAULT_IDENTIFIER,
            &[json!({"name": "c_user", "value": "42", "domain": ".facebook.com", "path": "/", "expires": -1})],
        )
        .unwrap();

    let mut page = FakePage::new();
    page.header_html = r#"<div role="feed">News Feed</div>"#.into();
    Authenticator::new(&config, Pacer::instant())
        .login(&mut page)
        .await
        .expect("saved session should be accepted");

    assert_eq!(page.cookies.len(), 1);
    assert!(page.cookies[0].get("expires").is_none());
    assert_eq!(page.navigated, vec![BASE.to_string()]);
}

#[tokio::test]
async fn expired_saved_session_is_discarded() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let store = SessionStore::new(config.cookies_dir());
    let path = store
        .save(
            DEFAULT_IDENTIFIER,
            &[json!({"name": "c_user", "value": "42", "domain": ".facebook.com", "path": "/"})],
        )
        .unwrap();

    let mut page = FakePage::new();
    page.header_html = LOGIN_FORM.into();
    let err = Authenticator::new(&config, Pacer::instant())
        .login(&mut page)
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::Auth(_)), "{err}");
    assert!(!path.exists());
    assert!(store.load(DEFAULT_IDENTIFIER).is_none());
}

#[tokio::test]
async fn credential_login_fills_form_and_saves_session() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let config = CrawlerConfig {
        credentials: Some(Credentials {
            email: "ops@example.com".into(),
            password: "hunter2".into(),
        }),
        ..config_in(tmp.path())
    };

    let mut page = FakePage::new();
    page.header_html = LOGIN_FORM.into();
    page.after_submit = Some((format!("{BASE}/"), r#"<div role="feed">News Feed</div>"#.into()));
    page.cookies = vec![json!({"name": "xs", "value": "secret", "domain": ".facebook.com", "path": "/"})];

    Authenticator::new(&config, Pacer::instant())
        .login(&mut page)
        .await
        .expect("credential login");

    assert_eq!(
        page.filled,
        vec![
            (r#"input[name="email"]"#.to_string(), "ops@example.com".to_string()),
            (r#"input[name="pass"]"#.to_string(), "hunter2".to_string()),
        ]
    );
    let saved = SessionStore::new(config.cookies_dir()).load(DEFAULT_IDENTIFIER);
    assert_eq!(saved.map(|c| c.len()), Some(1));
}

#[tokio::test]
async fn challenge_fails_fast_without_waiting() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let config = CrawlerConfig {
        credentials: Some(Credentials {
            email: "ops@example.com".into(),
            password: "hunter2".into(),
        }),
        challenge_policy: ChallengePolicy::FailFast,
        ..config_in(tmp.path())
    };

    let mut page = FakePage::new();
    page.header_html = LOGIN_FORM.into();
    page.after_submit = Some((
        format!("{BASE}/checkpoint/1501092823525282/"),
        r#"<div id="captcha_box">Security check</div>"#.into(),
    ));

    let err = Authenticator::new(&config, Pacer::instant())
        .login(&mut page)
        .await
        .expect_err("challenge must abort under FailFast");
    assert!(matches!(err, CrawlError::Auth(_)), "{err}");
    assert!(!SessionStore::new(config.cookies_dir())
        .path(DEFAULT_IDENTIFIER)
        .exists());
}

#[tokio::test]
async fn no_session_and_no_credentials_is_an_auth_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let mut page = FakePage::new();

    let err = Authenticator::new(&config, Pacer::instant())
        .login(&mut page)
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::Auth(_)));
    assert!(page.navigated.is_empty());
}
