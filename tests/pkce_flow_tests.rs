//! PKCE flow against a mock token endpoint.

use std::sync::Arc;

use mockito::{Matcher, Server, ServerGuard};
use pkce_tasks::client::pkce::challenge_for;
use pkce_tasks::client::{
    Browser, FlowError, FlowState, MemoryBrowser, MemorySessionStore, PkceFlow, ProviderSettings,
    TokenCache, TokenSet,
};
use pretty_assertions::assert_eq;

const REDIRECT: &str = "http://localhost:5173/";

struct Harness {
    server: ServerGuard,
    browser: Arc<MemoryBrowser>,
    cache: TokenCache,
    flow: PkceFlow,
}

async fn harness() -> Harness {
    let server = Server::new_async().await;
    let settings = ProviderSettings {
        domain: server.url(),
        client_id: "client-1".to_string(),
        redirect_uri: REDIRECT.to_string(),
        logout_uri: "http://localhost:5173".to_string(),
        scopes: "openid email".to_string(),
    };
    let browser = Arc::new(MemoryBrowser::at(REDIRECT));
    let cache = TokenCache::new(Arc::new(MemorySessionStore::new()));
    let flow = PkceFlow::new(settings, cache.clone(), browser.clone());
    Harness {
        server,
        browser,
        cache,
        flow,
    }
}

fn query_param(url: &url::Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

// ─── Login Tests ───

#[tokio::test]
async fn start_login_persists_verifier_and_redirects() {
    let h = harness().await;
    let url = h.flow.start_login().unwrap();

    assert_eq!(h.browser.last_redirect(), Some(url.clone()));
    assert_eq!(h.flow.state().unwrap(), FlowState::AwaitingRedirect);

    let pending = h.cache.pending().unwrap().expect("verifier persisted");
    assert_eq!(pending.code_verifier.len(), 43);
    assert_eq!(
        query_param(&url, "code_challenge"),
        Some(challenge_for(&pending.code_verifier))
    );
    assert_eq!(query_param(&url, "code_challenge_method").as_deref(), Some("S256"));
    assert_eq!(query_param(&url, "client_id").as_deref(), Some("client-1"));
    assert_eq!(query_param(&url, "redirect_uri").as_deref(), Some(REDIRECT));
    assert_eq!(query_param(&url, "response_type").as_deref(), Some("code"));
    assert_eq!(query_param(&url, "scope").as_deref(), Some("openid email"));
}

#[tokio::test]
async fn second_login_replaces_pending_verifier() {
    let h = harness().await;
    h.flow.start_login().unwrap();
    let first = h.cache.pending().unwrap().unwrap();
    h.flow.start_login().unwrap();
    let second = h.cache.pending().unwrap().unwrap();
    assert_ne!(first.code_verifier, second.code_verifier);
}

#[tokio::test]
async fn redirect_with_code_exchanges_and_authenticates() {
    let mut h = harness().await;
    h.flow.start_login().unwrap();
    let verifier = h.cache.pending().unwrap().unwrap().code_verifier;

    let token_mock = h
        .server
        .mock("POST", "/oauth2/token")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("client_id".into(), "client-1".into()),
            Matcher::UrlEncoded("code".into(), "auth-code-1".into()),
            Matcher::UrlEncoded("redirect_uri".into(), REDIRECT.into()),
            Matcher::UrlEncoded("code_verifier".into(), verifier),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"at-1","id_token":"id-1","expires_in":3600,"token_type":"Bearer"}"#)
        .expect(1)
        .create_async()
        .await;

    h.browser.land_on("http://localhost:5173/?code=auth-code-1&state=xyz");
    let tokens = h.flow.handle_redirect().await.unwrap().expect("tokens");

    token_mock.assert_async().await;
    assert_eq!(tokens.access_token, "at-1");
    assert_eq!(h.flow.state().unwrap(), FlowState::Authenticated);
    assert!(h.cache.has_valid_access_token().unwrap());
    assert!(h.cache.pending().unwrap().is_none());
    assert_eq!(h.browser.current_url().unwrap().as_str(), REDIRECT);
}

#[tokio::test]
async fn token_endpoint_error_fails_with_provider_description() {
    let mut h = harness().await;
    h.flow.start_login().unwrap();

    let token_mock = h
        .server
        .mock("POST", "/oauth2/token")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"invalid_grant","error_description":"Code has expired"}"#)
        .expect(1)
        .create_async()
        .await;

    h.browser.land_on("http://localhost:5173/?code=stale");
    let err = h.flow.handle_redirect().await.unwrap_err();

    token_mock.assert_async().await;
    assert!(matches!(err, FlowError::Provider(ref p) if p.error == "invalid_grant"));
    assert_eq!(
        h.flow.state().unwrap(),
        FlowState::Failed {
            reason: "Code has expired".to_string()
        }
    );
    assert!(h.cache.pending().unwrap().is_none());
    assert!(h.cache.tokens().unwrap().is_none());
    assert_eq!(h.browser.current_url().unwrap().as_str(), REDIRECT);
}

#[tokio::test]
async fn non_oauth_error_body_is_kept_verbatim() {
    let mut h = harness().await;
    h.flow.start_login().unwrap();
    let _m = h
        .server
        .mock("POST", "/oauth2/token")
        .with_status(502)
        .with_body("bad gateway")
        .create_async()
        .await;

    let err = h.flow.exchange_code_for_tokens("c").await.unwrap_err();
    assert!(matches!(err, FlowError::Http { status: 502, ref body } if body == "bad gateway"));
    assert!(matches!(h.flow.state().unwrap(), FlowState::Failed { .. }));
}

#[tokio::test]
async fn exchange_without_pending_verifier_fails_without_request() {
    let mut h = harness().await;
    let token_mock = h
        .server
        .mock("POST", "/oauth2/token")
        .expect(0)
        .create_async()
        .await;

    let err = h.flow.exchange_code_for_tokens("c").await.unwrap_err();
    assert!(matches!(err, FlowError::MissingVerifier));
    assert!(matches!(h.flow.state().unwrap(), FlowState::Failed { .. }));
    token_mock.assert_async().await;
}

#[tokio::test]
async fn provider_error_redirect_fails_the_flow() {
    let h = harness().await;
    h.flow.start_login().unwrap();
    h.browser
        .land_on("http://localhost:5173/?error=access_denied&error_description=User+cancelled");

    let err = h.flow.handle_redirect().await.unwrap_err();
    assert!(matches!(err, FlowError::Provider(_)));
    assert_eq!(
        h.flow.state().unwrap(),
        FlowState::Failed {
            reason: "User cancelled".to_string()
        }
    );
    assert!(h.cache.pending().unwrap().is_none());
    assert_eq!(h.browser.current_url().unwrap().as_str(), REDIRECT);
}

#[tokio::test]
async fn cached_token_short_circuits_exchange() {
    let mut h = harness().await;
    h.flow.start_login().unwrap();
    h.cache.store_tokens(TokenSet::new("existing")).unwrap();

    let token_mock = h
        .server
        .mock("POST", "/oauth2/token")
        .expect(0)
        .create_async()
        .await;

    h.browser.land_on("http://localhost:5173/?code=reused");
    let tokens = h.flow.handle_redirect().await.unwrap().unwrap();

    token_mock.assert_async().await;
    assert_eq!(tokens.access_token, "existing");
    assert_eq!(h.flow.state().unwrap(), FlowState::Authenticated);
    assert_eq!(h.browser.current_url().unwrap().as_str(), REDIRECT);
}

#[tokio::test]
async fn address_without_callback_is_a_no_op() {
    let h = harness().await;
    h.flow.start_login().unwrap();
    assert!(h.flow.handle_redirect().await.unwrap().is_none());
    assert_eq!(h.flow.state().unwrap(), FlowState::AwaitingRedirect);
    assert!(h.cache.pending().unwrap().is_some());
}

#[tokio::test]
async fn empty_code_is_stripped_without_exchange() {
    let mut h = harness().await;
    h.flow.start_login().unwrap();
    let token_mock = h
        .server
        .mock("POST", "/oauth2/token")
        .expect(0)
        .create_async()
        .await;

    h.browser.land_on("http://localhost:5173/?code=&state=xyz");
    assert!(h.flow.handle_redirect().await.unwrap().is_none());

    token_mock.assert_async().await;
    assert_eq!(h.browser.current_url().unwrap().as_str(), REDIRECT);
    assert_eq!(h.flow.state().unwrap(), FlowState::AwaitingRedirect);
    assert!(h.cache.pending().unwrap().is_some());
}

// ─── Resume Tests ───

#[tokio::test]
async fn new_controller_finishes_login_started_by_another() {
    let mut h = harness().await;
    h.flow.start_login().unwrap();

    let _m = h
        .server
        .mock("POST", "/oauth2/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"at-2"}"#)
        .create_async()
        .await;

    // A fresh controller sharing only the session, as after a restart.
    let browser = Arc::new(MemoryBrowser::at("http://localhost:5173/?code=c2"));
    let resumed = PkceFlow::new(h.flow.settings().clone(), h.cache.clone(), browser.clone());

    assert_eq!(resumed.resume().await.unwrap(), FlowState::Authenticated);
    assert_eq!(h.cache.tokens().unwrap().unwrap().access_token, "at-2");
    assert_eq!(browser.current_url().unwrap().as_str(), REDIRECT);
}

#[tokio::test]
async fn resume_records_failure_in_state() {
    let h = harness().await;
    h.browser.land_on("http://localhost:5173/?code=orphan");
    assert!(matches!(
        h.flow.resume().await.unwrap(),
        FlowState::Failed { .. }
    ));
}

// ─── Logout Tests ───

#[tokio::test]
async fn logout_clears_session_and_redirects() {
    let h = harness().await;
    h.cache.store_tokens(TokenSet::new("at")).unwrap();
    h.cache.set_flow_state(&FlowState::Authenticated).unwrap();

    let url = h.flow.logout().unwrap();

    assert_eq!(url.path(), "/logout");
    assert_eq!(query_param(&url, "client_id").as_deref(), Some("client-1"));
    assert_eq!(
        query_param(&url, "logout_uri").as_deref(),
        Some("http://localhost:5173")
    );
    assert_eq!(h.browser.last_redirect(), Some(url));
    assert!(h.cache.tokens().unwrap().is_none());
    assert_eq!(h.flow.state().unwrap(), FlowState::Idle);
}
