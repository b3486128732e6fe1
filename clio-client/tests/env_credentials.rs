//! The client builder picks up `CLIO_*` variables from the environment.
//!
//! This binary holds a single test because it mutates the process
//! environment.

use clio_client::{AnnotationQuery, ClioClient, StrategyKind};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_builder_reads_credentials_and_dataset_from_env() {
    // SAFETY: no other thread in this binary reads or writes the environment.
    unsafe {
        std::env::set_var(
            "CLIO_APPLICATION_CREDENTIALS",
            r#"{"email": "someone@example.org", "token": "env-token"}"#,
        );
        std::env::set_var("CLIO_DATASET", "VNC");
        std::env::remove_var("CLIO_SERVER");
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/datasets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"VNC": {}, "MANC": {}})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/json-annotations/VNC/neurons/all"))
        .and(header("authorization", "Bearer env-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"bodyid": 1}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/json-annotations/MANC/neurons/all"))
        .and(header("authorization", "Bearer builder-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let from_env = ClioClient::builder()
        .server(server.uri())
        .allow_insecure_http(true)
        .build()
        .await
        .unwrap();

    assert_eq!(from_env.dataset().name(), "VNC");
    assert_eq!(from_env.credential_strategy(), StrategyKind::Explicit);
    let table = from_env.fetch_annotations(AnnotationQuery::All).await.unwrap();
    assert_eq!(table.len(), 1);

    // Builder calls take precedence over the environment.
    let overridden = ClioClient::builder()
        .server(server.uri())
        .allow_insecure_http(true)
        .dataset("MANC")
        .token("builder-token")
        .build()
        .await
        .unwrap();

    assert_eq!(overridden.dataset().name(), "MANC");
    assert!(overridden.fetch_annotations(AnnotationQuery::All).await.unwrap().is_empty());
}
