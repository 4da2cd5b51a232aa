//! Catalog client tests against a mock GraphQL endpoint.

use meerpipe_catalog::{CatalogClient, Error, ObservationFilter};
use meerpipe_types::ObsUtc;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> CatalogClient {
    CatalogClient::builder()
        .base_url(format!("{}/api", server.uri()))
        .auth_token("test-token")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_list_observations() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/graphql/"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "variables": {
                "pulsar": "J0437-4715",
                "utcStartGte": "2021-01-01T00:00:00+00:00"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "allObservations": {
                    "edges": [
                        {"node": {
                            "pulsar": {"name": "J0437-4715"},
                            "utcStart": "2021-01-02T03:04:05+00:00",
                            "project": {"code": "SCI-20180516-MB-05", "short": "PTA"}
                        }},
                        {"node": {
                            "pulsar": {"name": "J0437-4715"},
                            "utcStart": "2021-01-03T00:00:00+00:00",
                            "project": null
                        }}
                    ]
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let filter = ObservationFilter {
        start: Some(ObsUtc::parse("2021-01-01-00:00:00").unwrap()),
        pulsar: Some("J0437-4715".into()),
        ..Default::default()
    };
    let listing = client(&server).observations().list(&filter).await.unwrap();
    let observations = &listing.observations;

    assert_eq!(observations.len(), 2);
    assert!(listing.malformed.is_empty());
    assert_eq!(observations[0].utc.to_string(), "2021-01-02-03:04:05");
    assert_eq!(
        observations[0].project_code.as_deref(),
        Some("SCI-20180516-MB-05")
    );
    assert!(observations[1].project_code.is_none());
}

#[tokio::test]
async fn test_empty_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/graphql/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"allObservations": {"edges": []}}
        })))
        .mount(&server)
        .await;

    let observations = client(&server)
        .observations()
        .list(&ObservationFilter::default())
        .await
        .unwrap();
    assert!(observations.observations.is_empty());
    assert!(observations.malformed.is_empty());
}

#[tokio::test]
async fn test_malformed_record_kept_apart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/graphql/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "allObservations": {
                    "edges": [
                        {"node": {
                            "pulsar": {"name": "J0437-4715"},
                            "utcStart": "2021-01-02T03:04:05+00:00",
                            "project": null
                        }},
                        {"node": {
                            "pulsar": {"name": "J1909-3744"},
                            "utcStart": null,
                            "project": null
                        }},
                        {"node": {
                            "pulsar": {"name": "J1713+0747"},
                            "utcStart": "2021-01-04T00:00:00+00:00",
                            "project": null
                        }}
                    ]
                }
            }
        })))
        .mount(&server)
        .await;

    let listing = client(&server)
        .observations()
        .list(&ObservationFilter::default())
        .await
        .unwrap();

    let pulsars: Vec<&str> = listing.observations.iter().map(|o| o.pulsar.as_str()).collect();
    assert_eq!(pulsars, vec!["J0437-4715", "J1713+0747"]);
    assert_eq!(listing.malformed.len(), 1);
    match &listing.malformed[0] {
        Error::Malformed(message) => assert!(message.contains("J1909-3744"), "{message}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_graphql_errors_surface() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/graphql/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{"message": "Unknown argument"}]
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .observations()
        .list(&ObservationFilter::default())
        .await
        .unwrap_err();
    match err {
        Error::GraphQl(messages) => assert_eq!(messages, vec!["Unknown argument".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/graphql/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .mount(&server)
        .await;

    let err = client(&server)
        .observations()
        .list(&ObservationFilter::default())
        .await
        .unwrap_err();
    assert!(err.is_auth_error());
}

#[tokio::test]
async fn test_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/graphql/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server)
        .observations()
        .list(&ObservationFilter::default())
        .await
        .unwrap_err();
    assert!(err.is_server_error());
}
