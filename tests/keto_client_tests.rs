//! Keto client behaviour against a mock HTTP server

mod common;

use common::init_rustls;
use keto_maester::keto::{AcpEngine, EngineError, Flavour, KetoClient, PolicyDocument, RoleDocument};
use reqwest::{StatusCode, Url};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> KetoClient {
    init_rustls();
    KetoClient::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(5)).unwrap()
}

fn photos_policy() -> PolicyDocument {
    PolicyDocument {
        id: "default:p1".to_string(),
        actions: vec!["list".to_string()],
        conditions: None,
        description: "allow maria to list photos".to_string(),
        effect: "allow".to_string(),
        resources: vec!["resources:photos".to_string()],
        subjects: vec!["users:maria".to_string()],
    }
}

fn photos_policy_json() -> serde_json::Value {
    json!({
        "id": "default:p1",
        "actions": ["list"],
        "description": "allow maria to list photos",
        "effect": "allow",
        "resources": ["resources:photos"],
        "subjects": ["users:maria"]
    })
}

mod get {
    use super::*;

    #[tokio::test]
    async fn test_get_existing_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/engines/acp/ory/exact/policies/default:p1"))
            .and(header("Accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(photos_policy_json()))
            .expect(1)
            .mount(&server)
            .await;

        let policy = client(&server)
            .get_policy(Flavour::Exact, "default:p1")
            .await
            .unwrap();

        assert_eq!(policy, Some(photos_policy()));
    }

    #[tokio::test]
    async fn test_get_missing_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/engines/acp/ory/regex/policies/default:p1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let policy = client(&server)
            .get_policy(Flavour::Regex, "default:p1")
            .await
            .unwrap();

        assert_eq!(policy, None);
    }

    #[tokio::test]
    async fn test_get_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/engines/acp/ory/exact/roles/default:admins"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let error = client(&server)
            .get_role(Flavour::Exact, "default:admins")
            .await
            .unwrap_err();

        assert_eq!(error.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(error.to_string().contains("unexpected status code 500"));
    }

    #[tokio::test]
    async fn test_get_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/engines/acp/ory/exact/roles/default:admins"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let error = client(&server)
            .get_role(Flavour::Exact, "default:admins")
            .await
            .unwrap_err();

        assert!(matches!(error, EngineError::Decode { .. }));
    }
}

mod list {
    use super::*;

    #[tokio::test]
    async fn test_list_roles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/engines/acp/ory/glob/roles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "default:admins", "members": ["users:maria"]},
                {"id": "default:readers", "members": null}
            ])))
            .mount(&server)
            .await;

        let roles = client(&server).list_roles(Flavour::Glob).await.unwrap();

        assert_eq!(
            roles,
            vec![
                RoleDocument {
                    id: "default:admins".to_string(),
                    members: vec!["users:maria".to_string()],
                },
                RoleDocument {
                    id: "default:readers".to_string(),
                    members: Vec::new(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_list_empty_engine_answers_null() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/engines/acp/ory/exact/policies"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let policies = client(&server).list_policies(Flavour::Exact).await.unwrap();

        assert!(policies.is_empty());
    }
}

mod upsert {
    use super::*;

    #[tokio::test]
    async fn test_upsert_puts_document_on_collection() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/engines/acp/ory/exact/policies"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(photos_policy_json()))
            .respond_with(ResponseTemplate::new(200).set_body_json(photos_policy_json()))
            .expect(1)
            .mount(&server)
            .await;

        let stored = client(&server)
            .upsert_policy(Flavour::Exact, &photos_policy())
            .await
            .unwrap();

        assert_eq!(stored, photos_policy());
    }

    #[tokio::test]
    async fn test_upsert_role() {
        let server = MockServer::start().await;
        let role = json!({"id": "default:admins", "members": ["users:maria", "users:peter"]});
        Mock::given(method("PUT"))
            .and(path("/engines/acp/ory/regex/roles"))
            .and(body_json(role.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(role))
            .expect(1)
            .mount(&server)
            .await;

        let document = RoleDocument {
            id: "default:admins".to_string(),
            members: vec!["users:maria".to_string(), "users:peter".to_string()],
        };
        let stored = client(&server)
            .upsert_role(Flavour::Regex, &document)
            .await
            .unwrap();

        assert_eq!(stored, document);
    }

    #[tokio::test]
    async fn test_upsert_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/engines/acp/ory/exact/policies"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let error = client(&server)
            .upsert_policy(Flavour::Exact, &photos_policy())
            .await
            .unwrap_err();

        assert_eq!(error.status(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_forwarded_headers() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/engines/acp/ory/exact/policies"))
            .and(header("X-Forwarded-Proto", "https"))
            .and(header("Origin", "https://console.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(photos_policy_json()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server)
            .with_forwarded_proto(Some("https".to_string()))
            .with_origin(Some("https://console.example.com".to_string()));
        client
            .upsert_policy(Flavour::Exact, &photos_policy())
            .await
            .unwrap();
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn test_delete_policy() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/engines/acp/ory/exact/policies/default:p1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .delete_policy(Flavour::Exact, "default:p1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_missing_role_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/engines/acp/ory/exact/roles/default:admins"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        client(&server)
            .delete_role(Flavour::Exact, "default:admins")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/engines/acp/ory/exact/policies/default:p1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let error = client(&server)
            .delete_policy(Flavour::Exact, "default:p1")
            .await
            .unwrap_err();

        assert_eq!(error.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }
}

#[tokio::test]
async fn test_unreachable_engine_is_a_transport_error() {
    init_rustls();
    // Nothing listens on the discard port
    let client = KetoClient::new(
        Url::parse("http://127.0.0.1:9").unwrap(),
        Duration::from_secs(2),
    )
    .unwrap();

    let error = client
        .get_policy(Flavour::Exact, "default:p1")
        .await
        .unwrap_err();

    assert!(matches!(error, EngineError::Transport { .. }));
    assert_eq!(error.status(), None);
}
