//! Provider clients against a local stand-in server on a loopback port.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use liveclass_api::config::{DispatchSettings, VideoSettings};
use liveclass_api::providers::video::AccessClaims;
use liveclass_api::providers::{HttpDispatcher, HttpVideoProvider};
use liveclass_core::errors::ClassError;
use liveclass_core::models::{Device, JoinGrants, Notification, Priority, Role, TrackSource};
use liveclass_core::ports::{NotificationDispatcher, VideoProvider};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::TcpListener;

type Calls = Arc<Mutex<Vec<(String, Value)>>>;

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn video_settings(api_url: &str) -> VideoSettings {
    VideoSettings {
        api_url: api_url.to_string(),
        ws_url: "wss://video.example.org".to_string(),
        api_key: "devkey".to_string(),
        api_secret: "devsecret".to_string(),
    }
}

fn decode_claims(token: &str) -> AccessClaims {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_nbf = true;
    decode::<AccessClaims>(token, &DecodingKey::from_secret(b"devsecret"), &validation)
        .unwrap()
        .claims
}

#[tokio::test]
async fn test_join_credential_carries_grants() {
    let provider = HttpVideoProvider::new(video_settings("http://127.0.0.1:9"));
    let grants = JoinGrants::for_participant("class_20261019_1400_abc123", Role::Student, Device::Primary);

    let minted = provider
        .mint_join_credential(
            "class_20261019_1400_abc123",
            "student_asha@students.org",
            "Asha",
            &grants,
            &json!({ "role": "student" }),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

    assert_eq!(minted.server_url, "wss://video.example.org");
    let claims = decode_claims(&minted.token);
    assert_eq!(claims.iss, "devkey");
    assert_eq!(claims.sub, "student_asha@students.org");
    assert_eq!(claims.name.as_deref(), Some("Asha"));
    assert_eq!(claims.exp - claims.nbf, 3600);
    assert_eq!(claims.video.room, "class_20261019_1400_abc123");
    assert!(claims.video.room_join);
    assert!(!claims.video.room_admin);
    assert_eq!(claims.video.can_publish, grants.can_publish);
    assert_eq!(claims.video.can_publish_sources, grants.can_publish_sources);
    let metadata: Value = serde_json::from_str(claims.metadata.as_deref().unwrap()).unwrap();
    assert_eq!(metadata["role"], "student");
}

#[test]
fn test_video_grant_uses_camel_case() {
    let grants = JoinGrants::for_participant("room", Role::Teacher, Device::Screen);
    let grant = liveclass_api::providers::video::VideoGrant::from(&grants);

    let value = serde_json::to_value(&grant).unwrap();

    assert_eq!(value["roomJoin"], true);
    assert!(value.get("canPublishSources").is_some());
    assert!(value.get("can_publish_sources").is_none());
    assert!(grants.can_publish_sources.contains(&TrackSource::ScreenShare));
}

#[tokio::test]
async fn test_mint_rejects_grants_for_another_room() {
    let provider = HttpVideoProvider::new(video_settings("http://127.0.0.1:9"));
    let grants = JoinGrants::for_participant("room-a", Role::Student, Device::Primary);

    let err = provider
        .mint_join_credential("room-b", "student_x", "X", &grants, &json!({}), Duration::from_secs(60))
        .await
        .unwrap_err();

    assert!(matches!(err, ClassError::Internal(_)));
}

async fn record(State(calls): State<Calls>, method: &str, body: Value) {
    calls.lock().unwrap().push((method.to_string(), body));
}

#[tokio::test]
async fn test_ensure_room_creates_only_missing_rooms() {
    let calls: Calls = Arc::default();
    let app = Router::new()
        .route(
            "/twirp/livekit.RoomService/ListRooms",
            post(|state: State<Calls>, Json(body): Json<Value>| async move {
                let known = body["names"][0] == "existing";
                record(state, "ListRooms", body).await;
                let rooms = if known { vec![json!({ "name": "existing" })] } else { vec![] };
                Json(json!({ "rooms": rooms }))
            }),
        )
        .route(
            "/twirp/livekit.RoomService/CreateRoom",
            post(|state: State<Calls>, Json(body): Json<Value>| async move {
                let name = body["name"].clone();
                record(state, "CreateRoom", body).await;
                Json(json!({ "name": name }))
            }),
        )
        .with_state(calls.clone());
    let provider = HttpVideoProvider::new(video_settings(&serve(app).await));

    let created = provider.ensure_room("fresh", &json!({ "subject": "Physics" }), 40).await.unwrap();
    let existing = provider.ensure_room("existing", &json!({}), 40).await.unwrap();

    assert!(created);
    assert!(!existing);
    let calls = calls.lock().unwrap().clone();
    let methods: Vec<&str> = calls.iter().map(|(m, _)| m.as_str()).collect();
    assert_eq!(methods, vec!["ListRooms", "CreateRoom", "ListRooms"]);
    assert_eq!(calls[1].1["max_participants"], 40);
    assert_eq!(calls[1].1["metadata"], "{\"subject\":\"Physics\"}");
}

#[tokio::test]
async fn test_ensure_room_tolerates_losing_the_create_race() {
    let app = Router::new()
        .route(
            "/twirp/livekit.RoomService/ListRooms",
            post(|| async { Json(json!({ "rooms": [] })) }),
        )
        .route(
            "/twirp/livekit.RoomService/CreateRoom",
            post(|| async {
                (
                    StatusCode::CONFLICT,
                    Json(json!({ "code": "already_exists", "msg": "room already exists" })),
                )
            }),
        );
    let provider = HttpVideoProvider::new(video_settings(&serve(app).await));

    let created = provider.ensure_room("contested", &json!({}), 40).await.unwrap();

    assert!(!created);
}

#[tokio::test]
async fn test_participants_of_unknown_room_are_empty() {
    let app = Router::new().route(
        "/twirp/livekit.RoomService/ListParticipants",
        post(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "code": "not_found", "msg": "room does not exist" })),
            )
        }),
    );
    let provider = HttpVideoProvider::new(video_settings(&serve(app).await));

    let participants = provider.list_live_participants("gone").await.unwrap();

    assert!(participants.is_empty());
}

#[tokio::test]
async fn test_participant_tracks_are_labelled_by_source() {
    let app = Router::new().route(
        "/twirp/livekit.RoomService/ListParticipants",
        post(|| async {
            Json(json!({
                "participants": [
                    { "identity": "teacher_t@school.org", "tracks": [
                        { "sid": "TR_1", "source": "CAMERA" },
                        { "sid": "TR_2", "source": "SCREEN_SHARE" }
                    ] }
                ]
            }))
        }),
    );
    let provider = HttpVideoProvider::new(video_settings(&serve(app).await));

    let participants = provider.list_live_participants("room").await.unwrap();

    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].identity, "teacher_t@school.org");
    assert_eq!(participants[0].tracks, vec!["camera", "screen_share"]);
}

#[tokio::test]
async fn test_provider_failure_is_upstream_error() {
    let app = Router::new().route(
        "/twirp/livekit.RoomService/ListRooms",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "code": "internal", "msg": "boom" }))) }),
    );
    let provider = HttpVideoProvider::new(video_settings(&serve(app).await));

    let err = provider.ensure_room("room", &json!({}), 10).await.unwrap_err();

    assert!(matches!(err, ClassError::Upstream(_)));
}

fn notification() -> Notification {
    Notification {
        recipient: "asha@students.org".to_string(),
        subject: "Physics starts in 30 minutes".to_string(),
        body: "Join here".to_string(),
        priority: Priority::Normal,
    }
}

#[tokio::test]
async fn test_dispatcher_posts_notification_with_bearer_token() {
    let seen: Arc<Mutex<Option<(Option<String>, Value)>>> = Arc::default();
    let app = Router::new()
        .route(
            "/notifications",
            post(
                |State(seen): State<Arc<Mutex<Option<(Option<String>, Value)>>>>,
                 headers: HeaderMap,
                 Json(body): Json<Value>| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *seen.lock().unwrap() = Some((auth, body));
                    Json(json!({ "accepted": true, "external_message_id": "msg-1" }))
                },
            ),
        )
        .with_state(seen.clone());
    let base = serve(app).await;
    let dispatcher = HttpDispatcher::new(&DispatchSettings {
        url: format!("{}/notifications", base),
        token: "dispatch-token".to_string(),
    });

    let receipt = dispatcher.send(&notification()).await.unwrap();

    assert!(receipt.accepted);
    assert_eq!(receipt.external_message_id.as_deref(), Some("msg-1"));
    let (auth, body) = seen.lock().unwrap().clone().expect("request seen");
    assert_eq!(auth.as_deref(), Some("Bearer dispatch-token"));
    assert_eq!(body["recipient"], "asha@students.org");
    assert_eq!(body["priority"], "normal");
}

#[tokio::test]
async fn test_dispatcher_rejection_is_upstream_error() {
    let app = Router::new().route("/notifications", post(|| async { StatusCode::SERVICE_UNAVAILABLE }));
    let base = serve(app).await;
    let dispatcher = HttpDispatcher::new(&DispatchSettings {
        url: format!("{}/notifications", base),
        token: String::new(),
    });

    let err = dispatcher.send(&notification()).await.unwrap_err();

    assert!(matches!(err, ClassError::Upstream(_)));
}
