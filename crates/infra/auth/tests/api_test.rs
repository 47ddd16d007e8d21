//! Integration tests for authenticated account API calls

mod common;

use common::*;
use freetrade_auth::{FreetradeApi, FreetradeAuth, FreetradeError};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn restored_session(harness: &Harness, id_token: &str) -> Arc<FreetradeAuth> {
    harness.write_candidate(0, r#"{"refresh_token": "abc", "session_id": "sid-1"}"#);
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .and(body_string_contains("refresh_token=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "refresh_token": "abc2",
            "id_token": id_token,
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&harness.server)
        .await;

    let auth = Arc::new(harness.auth());
    auth.initialize().await.unwrap();
    auth
}

fn api(harness: &Harness, auth: Arc<FreetradeAuth>) -> FreetradeApi {
    FreetradeApi::new(
        auth,
        reqwest::Client::new(),
        format!("{}/api", harness.server.uri()),
    )
}

#[tokio::test]
async fn test_postcode_lookup_sends_session_headers() {
    let harness = Harness::new().await;
    let id_token = jwt_expiring_in(3600);
    let auth = restored_session(&harness, &id_token).await;

    Mock::given(method("GET"))
        .and(path("/api/proxy/postcodelookup/uk/SW1A1AA"))
        .and(header("authorization", format!("Bearer {id_token}").as_str()))
        .and(header("session_id", "sid-1"))
        .and(header("host", API_HOST))
        .and(header_exists("request_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "addresses": ["10 Downing Street"]
        })))
        .expect(1)
        .mount(&harness.server)
        .await;

    let response = api(&harness, auth)
        .get_address_by_postcode("SW1A1AA")
        .await
        .unwrap();
    assert_eq!(response, json!({"addresses": ["10 Downing Street"]}));
}

#[tokio::test]
async fn test_withdraw_funds_posts_json() {
    let harness = Harness::new().await;
    let auth = restored_session(&harness, &jwt_expiring_in(3600)).await;

    Mock::given(method("POST"))
        .and(path("/api/banking/withdraw-funds"))
        .and(body_json(json!({"account_id": "acc-1", "amount": "1.00"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})))
        .expect(1)
        .mount(&harness.server)
        .await;

    let response = api(&harness, auth)
        .withdraw_funds("acc-1", "1.00")
        .await
        .unwrap();
    assert_eq!(response["status"], json!("PENDING"));
}

#[tokio::test]
async fn test_set_active_account_empty_body() {
    let harness = Harness::new().await;
    let auth = restored_session(&harness, &jwt_expiring_in(3600)).await;

    Mock::given(method("POST"))
        .and(path("/api/clients/client-9/set-active-account"))
        .and(body_json(json!({"account_id": "acc-2"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&harness.server)
        .await;

    let response = api(&harness, auth)
        .set_active_account("client-9", "acc-2")
        .await
        .unwrap();
    assert_eq!(response, serde_json::Value::Null);
}

#[tokio::test]
async fn test_api_renews_token_before_dispatch() {
    let harness = Harness::new().await;
    let auth = restored_session(&harness, &jwt_expiring_in(20)).await;

    let renewed = jwt_expiring_in(3600);
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .and(body_string_contains("refresh_token=abc2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "refresh_token": "abc3",
            "id_token": renewed,
        })))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/proxy/postcodelookup/uk/EC1A1BB"))
        .and(header("authorization", format!("Bearer {renewed}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&harness.server)
        .await;

    api(&harness, auth)
        .get_address_by_postcode("EC1A1BB")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_api_error_status() {
    let harness = Harness::new().await;
    let auth = restored_session(&harness, &jwt_expiring_in(3600)).await;

    Mock::given(method("POST"))
        .and(path("/api/banking/withdraw-funds"))
        .respond_with(ResponseTemplate::new(403).set_body_string("insufficient funds"))
        .mount(&harness.server)
        .await;

    let err = api(&harness, auth)
        .withdraw_funds("acc-1", "1000000.00")
        .await
        .unwrap_err();
    match err {
        FreetradeError::ApiRequestFailed {
            endpoint,
            status,
            body,
        } => {
            assert_eq!(endpoint, "/banking/withdraw-funds");
            assert_eq!(status, 403);
            assert_eq!(body, "insufficient funds");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_api_requires_login() {
    let harness = Harness::new().await;
    let auth = Arc::new(harness.auth());

    let err = api(&harness, auth)
        .get_address_by_postcode("SW1A1AA")
        .await
        .unwrap_err();
    assert!(matches!(err, FreetradeError::NotAuthenticated));
    assert!(harness.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_path_values_are_percent_encoded() {
    let harness = Harness::new().await;
    let auth = restored_session(&harness, &jwt_expiring_in(3600)).await;

    Mock::given(method("GET"))
        .and(path("/api/proxy/postcodelookup/uk/SW1A%2F1AA%3Fx=1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/clients/a%2Fb/set-active-account"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&harness.server)
        .await;

    let api = api(&harness, auth);
    api.get_address_by_postcode("SW1A/1AA?x=1").await.unwrap();
    api.set_active_account("a/b", "acc-2").await.unwrap();

    let requests = harness.server.received_requests().await.unwrap();
    let lookup = requests
        .iter()
        .find(|r| r.method.as_str() == "GET")
        .unwrap();
    assert_eq!(lookup.url.query(), None);
}
