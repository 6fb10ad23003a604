use axum::http::StatusCode;
use clusterscan_operator::{config::Config, metrics::RECONCILE_TOTAL, server::Server};

#[tokio::test]
async fn test_server_endpoints() {
    let config = Config::default();
    let server = Server::new(&config.server);
    let app = server.build_router();

    // Use axum's test client
    let client = axum_test::TestServer::new(app).unwrap();

    // Test health endpoint
    let response = client.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");

    // Test metrics endpoint
    RECONCILE_TOTAL.with_label_values(&["requeue"]).inc();
    let response = client.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let text = response.text();
    assert!(text.contains("clusterscan_reconcile_total"));
    assert!(text.contains("outcome=\"requeue\""));

    // Unknown routes are not served
    let response = client.get("/alerts").expect_failure().await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
