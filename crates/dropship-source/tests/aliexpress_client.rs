//! Integration tests for `AliExpressClient`.
//!
//! Each test stands up a `wiremock` server, so no real network traffic is
//! made. Covers the happy path and every status the client classifies.

use std::time::Duration;

use dropship_core::{ErrorKind, ExternalId, FetchError, ListingSource};
use dropship_source::AliExpressClient;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(server: &MockServer) -> AliExpressClient {
    AliExpressClient::new(&server.uri(), None, 5, "dropship-test/0.1")
        .expect("failed to build test AliExpressClient")
}

fn id(raw: &str) -> ExternalId {
    ExternalId::parse(raw).expect("valid id")
}

fn product_json(id: &str) -> serde_json::Value {
    json!({
        "aliexpress_affiliate_productdetail_get_response": {
            "resp_result": {
                "resp_code": 200,
                "resp_msg": "success",
                "result": {
                    "products": [{
                        "product_id": id,
                        "subject": "Silicone Phone Case",
                        "description": "Soft case",
                        "target_sale_price": "4.50",
                        "target_sale_price_currency": "USD",
                        "total_avaliable_stock": 1200,
                        "image_urls": "https://img/a.jpg;https://img/b.jpg",
                        "first_level_category_name": "Phones & Telecommunications",
                        "brand_name": "Acme",
                        "sku_infos": [{ "sku_id": "1", "color": "Red" }],
                        "specs_module": { "Material": "Silicone" }
                    }]
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_returns_normalized_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product/12345"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_json("12345")))
        .mount(&server)
        .await;

    let listing = test_client(&server).fetch(&id("12345")).await.unwrap();

    assert_eq!(listing.external_id.as_deref(), Some("12345"));
    assert_eq!(listing.title.as_deref(), Some("Silicone Phone Case"));
    assert_eq!(listing.price.as_deref(), Some("4.50"));
    assert_eq!(listing.stock, Some(1200));
    assert_eq!(listing.image_urls.len(), 2);
    assert_eq!(listing.variants[0].attributes["color"], "Red");
}

#[tokio::test]
async fn fetch_sends_app_key_as_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product/1"))
        .and(header("authorization", "Bearer secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_json("1")))
        .expect(1)
        .mount(&server)
        .await;

    let client = AliExpressClient::new(
        &format!("{}/", server.uri()),
        Some("secret-key".to_string()),
        5,
        "dropship-test/0.1",
    )
    .unwrap();

    assert!(client.fetch(&id("1")).await.is_ok());
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = test_client(&server).fetch(&id("404")).await.unwrap_err();
    assert!(matches!(err, FetchError::NotFound(_)), "got: {err:?}");
    assert_eq!(err.kind(), ErrorKind::Permanent);
}

#[tokio::test]
async fn too_many_requests_honours_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product/9"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "17"))
        .mount(&server)
        .await;

    let err = test_client(&server).fetch(&id("9")).await.unwrap_err();
    assert_eq!(
        err,
        FetchError::RateLimited {
            retry_after_secs: 17
        }
    );
    assert_eq!(err.kind(), ErrorKind::Transient);
}

#[tokio::test]
async fn too_many_requests_without_header_defaults_to_sixty_seconds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product/9"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = test_client(&server).fetch(&id("9")).await.unwrap_err();
    assert_eq!(
        err,
        FetchError::RateLimited {
            retry_after_secs: 60
        }
    );
}

#[tokio::test]
async fn server_error_is_transient_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product/5"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = test_client(&server).fetch(&id("5")).await.unwrap_err();
    assert!(
        matches!(err, FetchError::Unavailable { status: Some(502), .. }),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn bad_request_is_malformed_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product/5"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid product id"))
        .mount(&server)
        .await;

    let err = test_client(&server).fetch(&id("5")).await.unwrap_err();
    assert_eq!(err, FetchError::MalformedId("5".to_string()));
}

#[tokio::test]
async fn invalid_json_is_malformed_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product/5"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = test_client(&server).fetch(&id("5")).await.unwrap_err();
    assert!(matches!(err, FetchError::MalformedResponse(_)), "got: {err:?}");
    assert_eq!(err.kind(), ErrorKind::Permanent);
}

#[tokio::test]
async fn empty_product_list_is_delisted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product/77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "aliexpress_affiliate_productdetail_get_response": {
                "resp_result": { "resp_code": 200, "result": { "products": [] } }
            }
        })))
        .mount(&server)
        .await;

    let err = test_client(&server).fetch(&id("77")).await.unwrap_err();
    assert_eq!(err, FetchError::Delisted("77".to_string()));
}

fn gateway_error_json(code: i64, message: &str) -> serde_json::Value {
    json!({
        "aliexpress_affiliate_productdetail_get_response": {
            "resp_result": { "resp_code": code, "resp_msg": message }
        }
    })
}

async fn fetch_with_gateway_code(code: i64, message: &str) -> FetchError {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product/88"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gateway_error_json(code, message)))
        .mount(&server)
        .await;

    test_client(&server).fetch(&id("88")).await.unwrap_err()
}

#[tokio::test]
async fn gateway_call_limit_is_rate_limited() {
    let err = fetch_with_gateway_code(7, "App Call Limited").await;
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(
        err,
        FetchError::RateLimited {
            retry_after_secs: 60
        }
    );
}

#[tokio::test]
async fn gateway_system_busy_is_transient_unavailable() {
    let err = fetch_with_gateway_code(15, "Remote service error").await;
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert!(matches!(err, FetchError::Unavailable { status: None, .. }));
}

#[tokio::test]
async fn gateway_signature_error_is_permanent() {
    let err = fetch_with_gateway_code(405, "invalid signature").await;
    assert_eq!(err.kind(), ErrorKind::Permanent);
    assert!(matches!(err, FetchError::MalformedResponse(_)));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product/3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(product_json("3"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = AliExpressClient::new(&server.uri(), None, 1, "dropship-test/0.1").unwrap();
    let err = client.fetch(&id("3")).await.unwrap_err();
    assert_eq!(err, FetchError::Timeout);
    assert_eq!(err.kind(), ErrorKind::Transient);
}
