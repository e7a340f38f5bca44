use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use application::{
    CompletionGateway, ConversationPolicy, GatewayError, InMemoryMessageStore, MessageService,
    MessageServiceDependencies, SystemClock,
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use domain::{CompletionRequest, CompletionResponse, ModelInfo, RoomId, UserId};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

use web_api::{router, AppState, JwtConfig, JwtService, TokenIssuer};

/// 可以切换成功/失败的补全服务
#[derive(Default)]
struct SwitchableGateway {
    failing: AtomicBool,
}

#[async_trait]
impl CompletionGateway for SwitchableGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Status {
                status: 500,
                body: "provider down".to_string(),
            });
        }
        Ok(CompletionResponse {
            content: format!("reply #{}", request.messages.len()),
            model: request.model,
            prompt_tokens: 1,
            output_tokens: 1,
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        Ok(vec![ModelInfo {
            id: "stub-model".to_string(),
            provider: "stub".to_string(),
        }])
    }
}

struct TestApp {
    router: Router,
    gateway: Arc<SwitchableGateway>,
    issuer: TokenIssuer,
    room_id: Uuid,
    member: Uuid,
}

async fn build_app() -> TestApp {
    let store = Arc::new(InMemoryMessageStore::new());
    let gateway = Arc::new(SwitchableGateway::default());
    let room_id = Uuid::new_v4();
    let member = Uuid::new_v4();
    store.create_room(RoomId::from(room_id), 1).await;
    store
        .add_member(RoomId::from(room_id), UserId::from(member))
        .await;

    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        message_repository: store.clone(),
        sequence_allocator: store.clone(),
        membership: store,
        completion_gateway: gateway.clone(),
        clock: Arc::new(SystemClock),
        policy: ConversationPolicy::default(),
    }));

    let jwt_config = JwtConfig {
        secret: "integration-test-secret-with-enough-length".to_string(),
        expiration_hours: 1,
    };
    let state = AppState::new(
        message_service,
        Arc::new(JwtService::new(&jwt_config)),
        CancellationToken::new(),
    );

    TestApp {
        router: router(state),
        gateway,
        issuer: TokenIssuer::new(&jwt_config),
        room_id,
        member,
    }
}

impl TestApp {
    fn token(&self, user_id: Uuid) -> String {
        self.issuer.issue(user_id).expect("token")
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        user_id: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user_id {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user_id)));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    fn messages_uri(&self) -> String {
        format!("/api/v1/rooms/{}/messages", self.room_id)
    }
}

#[tokio::test]
async fn health_endpoint_is_public() {
    let app = build_app().await;
    let (status, _) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let app = build_app().await;
    let (status, body) = app
        .call(Method::GET, &app.messages_uri(), None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn non_member_is_forbidden() {
    let app = build_app().await;
    let (status, body) = app
        .call(
            Method::POST,
            &app.messages_uri(),
            Some(Uuid::new_v4()),
            Some(json!({"content": "hi"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_ROOM_MEMBER");
}

#[tokio::test]
async fn send_and_page_through_messages() {
    let app = build_app().await;
    for i in 0..5 {
        let (status, body) = app
            .call(
                Method::POST,
                &app.messages_uri(),
                Some(app.member),
                Some(json!({"content": format!("message {i}")})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["sequence"], i + 1);
        assert_eq!(body["kind"], "human");
        assert_eq!(body["status"], "completed");
    }

    let (status, page) = app
        .call(
            Method::GET,
            &format!("{}?limit=3", app.messages_uri()),
            Some(app.member),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["messages"].as_array().map(Vec::len), Some(3));
    assert_eq!(page["messages"][0]["sequence"], 5);
    let cursor = page["next_cursor"].as_str().expect("cursor").to_string();

    let (status, page) = app
        .call(
            Method::GET,
            &format!("{}?limit=3&cursor={cursor}", app.messages_uri()),
            Some(app.member),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["messages"].as_array().map(Vec::len), Some(2));
    assert_eq!(page["messages"][0]["sequence"], 2);
    assert!(page["next_cursor"].is_null());
}

#[tokio::test]
async fn empty_content_is_bad_request() {
    let app = build_app().await;
    let (status, body) = app
        .call(
            Method::POST,
            &app.messages_uri(),
            Some(app.member),
            Some(json!({"content": "  "})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn unparseable_cursor_is_not_found() {
    let app = build_app().await;
    let (status, _) = app
        .call(
            Method::GET,
            &format!("{}?cursor=not-a-uuid", app.messages_uri()),
            Some(app.member),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn membership_is_checked_before_request_details() {
    let app = build_app().await;
    let outsider = Uuid::new_v4();

    let (status, body) = app
        .call(
            Method::GET,
            &format!("{}?cursor=not-a-uuid", app.messages_uri()),
            Some(outsider),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_ROOM_MEMBER");

    let (status, body) = app
        .call(
            Method::POST,
            &format!("{}/ai", app.messages_uri()),
            Some(outsider),
            Some(json!({"content": "hi", "model": ""})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_ROOM_MEMBER");

    let (status, body) = app
        .call(
            Method::POST,
            &format!("{}/ai", app.messages_uri()),
            Some(app.member),
            Some(json!({"content": "hi", "model": "  "})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn ai_failure_then_regenerate_recovers_in_place() {
    let app = build_app().await;
    app.gateway.failing.store(true, Ordering::SeqCst);

    let (status, sent) = app
        .call(
            Method::POST,
            &format!("{}/ai", app.messages_uri()),
            Some(app.member),
            Some(json!({"content": "are you there?", "model": "stub-model"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["human_message"]["content"], "are you there?");
    assert_eq!(sent["ai_message"]["status"], "failed");
    assert_eq!(sent["ai_message"]["content"], "");

    let human_id = sent["human_message"]["id"].as_str().expect("id").to_string();
    let regenerate_uri = format!("{}/{human_id}/regenerate", app.messages_uri());

    let (status, body) = app
        .call(
            Method::POST,
            &regenerate_uri,
            Some(app.member),
            Some(json!({"model": "stub-model"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "LLM_GATEWAY_ERROR");

    app.gateway.failing.store(false, Ordering::SeqCst);
    let (status, regenerated) = app
        .call(
            Method::POST,
            &regenerate_uri,
            Some(app.member),
            Some(json!({"model": "stub-model"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(regenerated["id"], sent["ai_message"]["id"]);
    assert_eq!(regenerated["sequence"], sent["ai_message"]["sequence"]);
    assert_eq!(regenerated["created_at"], sent["ai_message"]["created_at"]);
    assert_eq!(regenerated["status"], "completed");
    assert_eq!(regenerated["content"], "reply #1");

    let (_, page) = app
        .call(Method::GET, &app.messages_uri(), Some(app.member), None)
        .await;
    assert_eq!(page["messages"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn regenerating_an_ai_message_is_unprocessable() {
    let app = build_app().await;
    let (_, sent) = app
        .call(
            Method::POST,
            &format!("{}/ai", app.messages_uri()),
            Some(app.member),
            Some(json!({"content": "hello", "model": "stub-model"})),
        )
        .await;
    let ai_id = sent["ai_message"]["id"].as_str().expect("id").to_string();

    let (status, body) = app
        .call(
            Method::POST,
            &format!("{}/{ai_id}/regenerate", app.messages_uri()),
            Some(app.member),
            Some(json!({"model": "stub-model"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_MESSAGE_TYPE");
}

#[tokio::test]
async fn models_are_listed() {
    let app = build_app().await;
    let (status, body) = app
        .call(Method::GET, "/api/v1/models", Some(app.member), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["models"][0]["id"], "stub-model");
    assert_eq!(body["models"][0]["provider"], "stub");
}
