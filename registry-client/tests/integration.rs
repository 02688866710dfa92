//! End-to-end flows against a scripted transport.

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK, WWW_AUTHENTICATE};
use http::{Method, StatusCode};
use registry_auth::mock::{MockResponse, MockTransport};
use registry_client::{Credential, Manifest, MediaType, RegistryClient, RegistryError, Secret};
use serde_json::json;

const TAGS_PATH: &str = "/v2/library/alpine/tags/list";
const MANIFEST_PATH: &str = "/v2/library/alpine/manifests/latest";

fn client(mock: &MockTransport) -> RegistryClient {
    RegistryClient::builder("registry.example.io")
        .transport(mock.clone())
        .build()
        .unwrap()
}

fn index_body() -> serde_json::Value {
    json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": [
            {
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": "sha256:4444444444444444444444444444444444444444444444444444444444444444",
                "size": 7143,
                "platform": { "architecture": "amd64", "os": "linux" }
            }
        ]
    })
}

#[tokio::test]
async fn tags_drain_linked_pages_in_order() {
    let mock = MockTransport::new();
    mock.enqueue(
        TAGS_PATH,
        MockResponse::json(&json!({ "name": "library/alpine", "tags": ["1", "2"] })).with_header(
            LINK,
            r#"</v2/library/alpine/tags/list?last=2&n=100>; rel="next""#,
        ),
    );
    mock.enqueue(
        TAGS_PATH,
        MockResponse::json(&json!({ "name": "library/alpine", "tags": ["3", "4"] })).with_header(
            LINK,
            r#"</v2/library/alpine/tags/list?last=4&n=100>; rel="next""#,
        ),
    );
    mock.enqueue(
        TAGS_PATH,
        MockResponse::json(&json!({ "name": "library/alpine", "tags": ["5", "6"] })),
    );

    let tags = client(&mock).list_tags("library/alpine").await.unwrap();

    assert_eq!(tags, vec!["1", "2", "3", "4", "5", "6"]);
    let requests = mock.requests_for(TAGS_PATH);
    assert_eq!(requests.len(), 3);
    assert!(requests[0].uri.query().unwrap().contains("n=100"));
    assert!(requests[1].uri.query().unwrap().contains("last=2"));
}

#[tokio::test]
async fn limited_tag_listing_stops_early() {
    let mock = MockTransport::new();
    mock.enqueue(
        TAGS_PATH,
        MockResponse::json(&json!({ "tags": ["1", "2"] })).with_header(
            LINK,
            r#"</v2/library/alpine/tags/list?last=2&n=100>; rel="next""#,
        ),
    );
    mock.enqueue(
        TAGS_PATH,
        MockResponse::json(&json!({ "tags": ["3", "4"] })).with_header(
            LINK,
            r#"</v2/library/alpine/tags/list?last=4&n=100>; rel="next""#,
        ),
    );

    let tags = client(&mock)
        .list_tags_limited("library/alpine", 3)
        .await
        .unwrap();

    assert_eq!(tags, vec!["1", "2", "3"]);
    assert_eq!(mock.requests_for(TAGS_PATH).len(), 2);
}

#[tokio::test]
async fn empty_repositories_list_no_tags() {
    let mock = MockTransport::new();
    mock.enqueue(
        TAGS_PATH,
        MockResponse::json(&json!({ "name": "library/alpine", "tags": null })),
    );

    let tags = client(&mock).list_tags("library/alpine").await.unwrap();
    assert!(tags.is_empty());
}

#[tokio::test]
async fn manifest_negotiates_the_requested_type() {
    let mock = MockTransport::new();
    mock.enqueue(
        MANIFEST_PATH,
        MockResponse::json(&index_body())
            .with_header(CONTENT_TYPE, "application/vnd.oci.image.index.v1+json"),
    );

    let manifest = client(&mock)
        .get_manifest("library/alpine", "latest", &[MediaType::OciIndex])
        .await
        .unwrap();

    let Manifest::Index(index) = manifest else {
        panic!("expected an index");
    };
    assert_eq!(index.manifests.len(), 1);
    assert_eq!(
        index.manifests[0].platform.as_ref().unwrap().architecture,
        "amd64"
    );

    let requests = mock.requests_for(MANIFEST_PATH);
    assert_eq!(
        requests[0].headers.get(ACCEPT).unwrap(),
        "application/vnd.oci.image.index.v1+json"
    );
}

#[tokio::test]
async fn default_manifest_types_are_requested() {
    let mock = MockTransport::new();
    mock.enqueue(
        MANIFEST_PATH,
        MockResponse::json(&json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "digest": "sha256:5555555555555555555555555555555555555555555555555555555555555555",
                "size": 1469
            },
            "layers": []
        }))
        .with_header(
            CONTENT_TYPE,
            "application/vnd.docker.distribution.manifest.v2+json",
        ),
    );

    let manifest = client(&mock)
        .get_manifest("library/alpine", "latest", &[])
        .await
        .unwrap();
    assert!(matches!(manifest, Manifest::Image(_)));

    let requests = mock.requests_for(MANIFEST_PATH);
    assert_eq!(
        requests[0].headers.get(ACCEPT).unwrap(),
        "application/vnd.docker.distribution.manifest.v2+json, application/vnd.oci.image.manifest.v1+json"
    );
}

#[tokio::test]
async fn unrequested_media_type_is_a_mismatch() {
    let mock = MockTransport::new();
    mock.enqueue(
        MANIFEST_PATH,
        MockResponse::json(&index_body()).with_header(
            CONTENT_TYPE,
            "application/vnd.docker.distribution.manifest.v2+json",
        ),
    );

    let error = client(&mock)
        .get_manifest("library/alpine", "latest", &[MediaType::OciIndex])
        .await
        .unwrap_err();

    match error {
        RegistryError::UnexpectedMediaType { received } => {
            assert_eq!(
                received,
                "application/vnd.docker.distribution.manifest.v2+json"
            );
        }
        other => panic!("expected UnexpectedMediaType, got {other:?}"),
    }
}

#[tokio::test]
async fn anonymous_bearer_flow_reuses_the_token_across_operations() {
    let mock = MockTransport::new();
    mock.enqueue(
        MANIFEST_PATH,
        MockResponse::status(StatusCode::UNAUTHORIZED).with_header(
            WWW_AUTHENTICATE,
            r#"Bearer realm="https://auth.example.io/token",service="registry.example.io""#,
        ),
    );
    mock.enqueue(
        MANIFEST_PATH,
        MockResponse::json(&index_body())
            .with_header(CONTENT_TYPE, "application/vnd.oci.image.index.v1+json"),
    );
    mock.enqueue(
        "/token",
        MockResponse::json(&json!({ "token": "t0", "expires_in": 3600 })),
    );
    mock.enqueue(TAGS_PATH, MockResponse::json(&json!({ "tags": ["latest"] })));

    let client = client(&mock);
    let manifest = client
        .get_manifest("library/alpine", "latest", &[MediaType::OciIndex])
        .await
        .unwrap();
    assert!(matches!(manifest, Manifest::Index(_)));

    // One exchange, one challenged attempt, one authenticated retry.
    assert_eq!(mock.requests_for("/token").len(), 1);
    assert_eq!(mock.requests_for(MANIFEST_PATH).len(), 2);

    // Tag listing shares the repository scope: the cached token rides along
    // and no further exchange happens.
    let tags = client.list_tags("library/alpine").await.unwrap();
    assert_eq!(tags, vec!["latest"]);
    assert_eq!(mock.requests_for("/token").len(), 1);
    let tag_requests = mock.requests_for(TAGS_PATH);
    assert_eq!(tag_requests.len(), 1);
    assert_eq!(
        tag_requests[0].headers.get(AUTHORIZATION).unwrap(),
        "Bearer t0"
    );
}

#[tokio::test]
async fn credentialed_flow_presents_basic_auth_at_the_realm() {
    let mock = MockTransport::new();
    mock.enqueue(
        TAGS_PATH,
        MockResponse::status(StatusCode::UNAUTHORIZED).with_header(
            WWW_AUTHENTICATE,
            r#"Bearer realm="https://auth.example.io/token",service="registry.example.io""#,
        ),
    );
    mock.enqueue(TAGS_PATH, MockResponse::json(&json!({ "tags": ["latest"] })));
    mock.enqueue("/token", MockResponse::json(&json!({ "token": "t0" })));

    let client = RegistryClient::builder("registry.example.io")
        .transport(mock.clone())
        .credential(Credential::Basic {
            username: "user".to_owned(),
            password: Secret::from("pass"),
        })
        .build()
        .unwrap();

    let tags = client.list_tags("library/alpine").await.unwrap();
    assert_eq!(tags, vec!["latest"]);

    let exchanges = mock.requests_for("/token");
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].method, Method::GET);
    assert_eq!(
        exchanges[0].headers.get(AUTHORIZATION).unwrap(),
        "Basic dXNlcjpwYXNz"
    );
}

#[tokio::test]
async fn upstream_errors_pass_through_with_their_body() {
    let mock = MockTransport::new();
    mock.enqueue(
        MANIFEST_PATH,
        MockResponse::new(
            StatusCode::NOT_FOUND,
            http::HeaderMap::new(),
            br#"{"errors":[{"code":"MANIFEST_UNKNOWN"}]}"#.to_vec(),
        ),
    );

    let error = client(&mock)
        .get_manifest("library/alpine", "latest", &[MediaType::OciIndex])
        .await
        .unwrap_err();

    match error {
        RegistryError::Upstream { status, body } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert!(body.contains("MANIFEST_UNKNOWN"));
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
}

#[tokio::test]
async fn manifest_digest_reads_the_digest_header() {
    let mock = MockTransport::new();
    mock.enqueue(
        MANIFEST_PATH,
        MockResponse::status(StatusCode::OK).with_header(
            "docker-content-digest",
            "sha256:6666666666666666666666666666666666666666666666666666666666666666",
        ),
    );

    let digest = client(&mock)
        .manifest_digest("library/alpine", "latest")
        .await
        .unwrap();
    assert!(digest.starts_with("sha256:"));

    let requests = mock.requests_for(MANIFEST_PATH);
    assert_eq!(requests[0].method, Method::HEAD);
}

#[tokio::test]
async fn manifest_digest_without_header_is_an_error() {
    let mock = MockTransport::new();
    mock.enqueue(MANIFEST_PATH, MockResponse::status(StatusCode::OK));

    let error = client(&mock)
        .manifest_digest("library/alpine", "latest")
        .await
        .unwrap_err();
    assert!(matches!(error, RegistryError::MissingDigest));
}

#[tokio::test]
async fn docker_config_credentials_reach_the_realm() {
    let mock = MockTransport::new();
    mock.enqueue(
        TAGS_PATH,
        MockResponse::status(StatusCode::UNAUTHORIZED).with_header(
            WWW_AUTHENTICATE,
            r#"Bearer realm="https://auth.example.io/token",service="registry.example.io""#,
        ),
    );
    mock.enqueue(TAGS_PATH, MockResponse::json(&json!({ "tags": [] })));
    mock.enqueue("/token", MockResponse::json(&json!({ "token": "t0" })));

    let config = registry_client::DockerConfig::parse(
        r#"{ "auths": { "registry.example.io": { "auth": "Zm9vOmJhcg==" } } }"#,
    )
    .unwrap();
    let client = RegistryClient::builder("registry.example.io")
        .transport(mock.clone())
        .docker_config(&config)
        .build()
        .unwrap();

    client.list_tags("library/alpine").await.unwrap();

    let exchanges = mock.requests_for("/token");
    assert_eq!(
        exchanges[0].headers.get(AUTHORIZATION).unwrap(),
        "Basic Zm9vOmJhcg=="
    );
}
