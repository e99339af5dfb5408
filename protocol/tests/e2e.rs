//! End-to-end tests for the SQRL server core.
//!
//! Each test drives a full login through `SqrlService` backed by a
//! `MemoryStore`, using `ClientSession` to play the SQRL app: login page
//! issues a nut, the app queries, then idents, the browser polls `pag.sqrl`,
//! and the resource server exchanges the token for a user id.

use std::sync::Arc;
use std::time::Duration;

use sqrl_protocol::client::ClientSession;
use sqrl_protocol::identity::IdentityKeypair;
use sqrl_protocol::message::{Command, Opt, ServerMsg, Tif};
use sqrl_protocol::store::{MemoryStore, Store};
use sqrl_protocol::token::{Token, TokenError};
use sqrl_protocol::transaction::IdentPolicy;
use sqrl_protocol::{SqrlConfig, SqrlService};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const KEY: [u8; 32] = [0x77; 32];
const REDIRECT: &str = "https://shop.example.com/sqrl/login";
const DOMAIN: &str = "shop.example.com";
const BROWSER_IP: &str = "203.0.113.9";

fn setup(config: SqrlConfig) -> (SqrlService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = SqrlService::new(config, store.clone());
    (service, store)
}

fn default_setup() -> (SqrlService, Arc<MemoryStore>) {
    setup(SqrlConfig::new(KEY, REDIRECT))
}

fn token_from_url(url: &str) -> Token {
    let (_, token) = url.split_once("?token=").expect("redirect url carries a token");
    Token::from(token)
}

/// Query then ident from `ip`; returns the ident reply.
async fn login(service: &SqrlService, app: &ClientSession, login_url: &str, ip: &str) -> ServerMsg {
    let query = app.first_request(Command::Query, login_url).unwrap();
    let reply = service.handle_client(query.into_request(ip)).await.unwrap();
    assert!(!reply.is(Tif::COMMAND_FAILED), "query failed: {:?}", reply.tif);

    let raw = reply.encode().unwrap();
    let ident = app.follow_up(Command::Ident, &raw).unwrap();
    service.handle_client(ident.into_request(ip)).await.unwrap()
}

// ---------------------------------------------------------------------------
// Full login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_login_lifecycle() {
    let (service, store) = default_setup();
    let app = ClientSession::new(IdentityKeypair::generate());

    // 1. Login page.
    let nut = service.issue_nut(Some(BROWSER_IP)).unwrap();
    let login_url = service.login_url(DOMAIN, &nut);
    assert_eq!(service.pending_redirect(&nut, BROWSER_IP).await.unwrap(), None);

    // 2. App queries and idents.
    let reply = login(&service, &app, &login_url, BROWSER_IP).await;
    assert!(reply.is(Tif::IP_MATCH));
    assert!(!reply.is(Tif::CURRENT_ID_MATCH));
    assert!(!reply.is(Tif::COMMAND_FAILED));
    assert_eq!(reply.url, None);
    assert_eq!(store.user_count(), 1);

    // 3. Browser polls with the nut it was shown.
    let redirect = service.pending_redirect(&nut, BROWSER_IP).await.unwrap().unwrap();
    assert!(redirect.starts_with(REDIRECT));

    // 4. Resource server exchanges the token.
    let user_id = service.exchange_token(&token_from_url(&redirect)).unwrap();
    let user = store.get_user_by_identity(&app.identity()).await.unwrap().unwrap();
    assert_eq!(user_id, user.id);
}

#[tokio::test]
async fn returning_user_is_recognised() {
    let (service, store) = default_setup();
    let app = ClientSession::new(IdentityKeypair::generate());

    let nut = service.issue_nut(Some(BROWSER_IP)).unwrap();
    login(&service, &app, &service.login_url(DOMAIN, &nut), BROWSER_IP).await;
    let first_id = service
        .exchange_token(&token_from_url(&service.pending_redirect(&nut, BROWSER_IP).await.unwrap().unwrap()))
        .unwrap();

    // Second visit: the query already reports a known identity.
    let nut = service.issue_nut(Some(BROWSER_IP)).unwrap();
    let query = app
        .first_request(Command::Query, &service.login_url(DOMAIN, &nut))
        .unwrap();
    let reply = service.handle_client(query.into_request(BROWSER_IP)).await.unwrap();
    assert!(reply.is(Tif::CURRENT_ID_MATCH));

    let ident = app.follow_up(Command::Ident, &reply.encode().unwrap()).unwrap();
    service.handle_client(ident.into_request(BROWSER_IP)).await.unwrap();
    let second_id = service
        .exchange_token(&token_from_url(&service.pending_redirect(&nut, BROWSER_IP).await.unwrap().unwrap()))
        .unwrap();

    assert_eq!(first_id, second_id);
    assert_eq!(store.user_count(), 1);
}

// ---------------------------------------------------------------------------
// Client Provided Session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cps_login_returns_redirect_to_app() {
    let (service, _) = default_setup();
    let app = ClientSession::new(IdentityKeypair::generate()).with_opt(Opt::Cps);

    let nut = service.issue_nut(None).unwrap();
    let reply = login(&service, &app, &service.login_url(DOMAIN, &nut), BROWSER_IP).await;

    let url = reply.url.clone().unwrap();
    assert!(url.starts_with(&format!("{REDIRECT}?token=")));
    assert!(service.exchange_token(&token_from_url(&url)).is_ok());

    // The encoded reply carries the url for the app to open.
    let decoded = ServerMsg::decode(&reply.encode().unwrap()).unwrap();
    assert_eq!(decoded.url, Some(url));
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn nut_from_another_network_is_rejected() {
    let (service, _) = default_setup();
    let app = ClientSession::new(IdentityKeypair::generate());

    let nut = service.issue_nut(Some(BROWSER_IP)).unwrap();
    let query = app
        .first_request(Command::Query, &service.login_url(DOMAIN, &nut))
        .unwrap();
    let reply = service.handle_client(query.into_request("198.51.100.1")).await.unwrap();

    assert!(reply.is(Tif::COMMAND_FAILED));
    assert!(!reply.is(Tif::IP_MATCH));
}

#[tokio::test]
async fn noiptest_allows_app_on_another_network() {
    let (service, _) = default_setup();
    let app = ClientSession::new(IdentityKeypair::generate()).with_opt(Opt::NoIpTest);

    let nut = service.issue_nut(Some(BROWSER_IP)).unwrap();
    let reply = login(&service, &app, &service.login_url(DOMAIN, &nut), "198.51.100.1").await;
    assert!(!reply.is(Tif::COMMAND_FAILED));
    assert!(service.pending_redirect(&nut, BROWSER_IP).await.unwrap().is_some());
}

#[tokio::test]
async fn ident_replayed_from_another_ip_is_rejected() {
    let (service, _) = default_setup();
    let app = ClientSession::new(IdentityKeypair::generate());

    let nut = service.issue_nut(None).unwrap();
    let query = app
        .first_request(Command::Query, &service.login_url(DOMAIN, &nut))
        .unwrap();
    let reply = service.handle_client(query.into_request(BROWSER_IP)).await.unwrap();

    let ident = app.follow_up(Command::Ident, &reply.encode().unwrap()).unwrap();
    let reply = service.handle_client(ident.into_request("198.51.100.1")).await.unwrap();

    assert!(reply.is(Tif::COMMAND_FAILED));
    assert!(!reply.is(Tif::CLIENT_FAILURE));
    assert_eq!(service.pending_redirect(&nut, BROWSER_IP).await.unwrap(), None);
}

#[tokio::test]
async fn replayed_ident_is_rejected() {
    let (service, store) = default_setup();
    let app = ClientSession::new(IdentityKeypair::generate());

    let nut = service.issue_nut(Some(BROWSER_IP)).unwrap();
    let query = app
        .first_request(Command::Query, &service.login_url(DOMAIN, &nut))
        .unwrap();
    let reply = service.handle_client(query.into_request(BROWSER_IP)).await.unwrap();

    let ident = app.follow_up(Command::Ident, &reply.encode().unwrap()).unwrap();
    let first = service.handle_client(ident.clone().into_request(BROWSER_IP)).await.unwrap();
    assert!(!first.is(Tif::COMMAND_FAILED));

    let replayed = service.handle_client(ident.into_request(BROWSER_IP)).await.unwrap();
    assert_eq!(replayed.tif, Tif::COMMAND_FAILED | Tif::CLIENT_FAILURE);
    assert_eq!(store.user_count(), 1);
}

#[tokio::test]
async fn redirect_is_withheld_from_other_browsers() {
    let (service, _) = default_setup();
    let app = ClientSession::new(IdentityKeypair::generate());

    let nut = service.issue_nut(Some(BROWSER_IP)).unwrap();
    let reply = login(&service, &app, &service.login_url(DOMAIN, &nut), BROWSER_IP).await;
    assert!(!reply.is(Tif::COMMAND_FAILED));

    assert_eq!(service.pending_redirect(&nut, "198.51.100.66").await.unwrap(), None);
    assert!(service.pending_redirect(&nut, BROWSER_IP).await.unwrap().is_some());
}

#[tokio::test]
async fn tampered_client_param_fails_signature() {
    let (service, _) = default_setup();
    let app = ClientSession::new(IdentityKeypair::generate());
    let nut = service.issue_nut(None).unwrap();

    let mut query = app
        .first_request(Command::Query, &service.login_url(DOMAIN, &nut))
        .unwrap();
    let other = ClientSession::new(IdentityKeypair::generate())
        .first_request(Command::Ident, &service.login_url(DOMAIN, &nut))
        .unwrap();
    query.client = other.client;

    let reply = service.handle_client(query.into_request(BROWSER_IP)).await.unwrap();
    assert_eq!(reply.tif, Tif::COMMAND_FAILED | Tif::CLIENT_FAILURE);
}

#[tokio::test]
async fn require_query_first_blocks_direct_ident() {
    let (service, _) = setup(
        SqrlConfig::new(KEY, REDIRECT).with_ident_policy(IdentPolicy::RequireQueryFirst),
    );
    let app = ClientSession::new(IdentityKeypair::generate());
    let nut = service.issue_nut(None).unwrap();
    let login_url = service.login_url(DOMAIN, &nut);

    let direct = app.first_request(Command::Ident, &login_url).unwrap();
    let reply = service.handle_client(direct.into_request(BROWSER_IP)).await.unwrap();
    assert!(reply.is(Tif::CLIENT_FAILURE));

    let reply = login(&service, &app, &login_url, BROWSER_IP).await;
    assert!(!reply.is(Tif::COMMAND_FAILED));
}

// ---------------------------------------------------------------------------
// Token exchange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn separate_token_key_and_expiry() {
    let config = SqrlConfig::new(KEY, REDIRECT)
        .with_token_key([0x88; 32])
        .with_token_expiry(Duration::from_secs(120));
    let (service, _) = setup(config);
    let app = ClientSession::new(IdentityKeypair::generate()).with_opt(Opt::Cps);

    let nut = service.issue_nut(None).unwrap();
    let reply = login(&service, &app, &service.login_url(DOMAIN, &nut), BROWSER_IP).await;
    let token = token_from_url(&reply.url.unwrap());
    assert!(service.exchange_token(&token).is_ok());

    // A service sharing the nut key but not the token key cannot redeem it.
    let (other, _) = default_setup();
    assert_eq!(other.exchange_token(&token), Err(TokenError::TokenFormatInvalid));
}
