//! LiveKit-compatible video provider.
//!
//! Join credentials are HS256 JWTs signed locally with the API secret and
//! carry a `video` grant. Room management goes through the Twirp JSON API
//! (`/twirp/livekit.RoomService/<Method>`) authenticated with a short-lived
//! admin token.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use liveclass_core::errors::{ClassError, ClassResult};
use liveclass_core::models::{JoinGrants, LiveParticipant, MintedCredential, TrackSource};
use liveclass_core::ports::VideoProvider;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::upstream;
use crate::config::VideoSettings;

const ADMIN_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);
const EMPTY_ROOM_TIMEOUT_SECONDS: u64 = 10 * 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room: String,
    #[serde(default)]
    pub room_join: bool,
    #[serde(default)]
    pub room_create: bool,
    #[serde(default)]
    pub room_list: bool,
    #[serde(default)]
    pub room_admin: bool,
    #[serde(default)]
    pub can_publish: bool,
    #[serde(default)]
    pub can_publish_sources: Vec<TrackSource>,
    #[serde(default)]
    pub can_subscribe: bool,
    #[serde(default)]
    pub can_publish_data: bool,
    #[serde(default)]
    pub hidden: bool,
}

impl From<&JoinGrants> for VideoGrant {
    fn from(grants: &JoinGrants) -> Self {
        VideoGrant {
            room: grants.room.clone(),
            room_join: true,
            room_admin: grants.room_admin,
            can_publish: grants.can_publish,
            can_publish_sources: grants.can_publish_sources.clone(),
            can_subscribe: grants.can_subscribe,
            can_publish_data: grants.can_publish_data,
            hidden: grants.hidden,
            ..VideoGrant::default()
        }
    }
}

/// Claims of a provider access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// API key.
    pub iss: String,
    /// Participant identity.
    pub sub: String,
    pub nbf: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// JSON-encoded participant metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub video: VideoGrant,
}

#[derive(Deserialize)]
struct TwirpError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
}

#[derive(Deserialize)]
struct ListRoomsResponse {
    #[serde(default)]
    rooms: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct ListParticipantsResponse {
    #[serde(default)]
    participants: Vec<TwirpParticipant>,
}

#[derive(Deserialize)]
struct TwirpParticipant {
    identity: String,
    #[serde(default)]
    tracks: Vec<TwirpTrack>,
}

#[derive(Deserialize)]
struct TwirpTrack {
    #[serde(default)]
    sid: String,
    #[serde(default)]
    source: serde_json::Value,
}

impl TwirpTrack {
    fn label(&self) -> String {
        match &self.source {
            serde_json::Value::String(source) => source.to_lowercase(),
            _ => self.sid.clone(),
        }
    }
}

pub struct HttpVideoProvider {
    client: Client,
    settings: VideoSettings,
}

impl HttpVideoProvider {
    pub fn new(settings: VideoSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    fn sign(&self, claims: &AccessClaims) -> ClassResult<String> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.settings.api_secret.as_bytes()),
        )
        .map_err(|e| ClassError::Internal(format!("failed to sign provider token: {}", e)))
    }

    fn claims(&self, identity: &str, ttl: Duration, video: VideoGrant) -> AccessClaims {
        let now = Utc::now().timestamp();
        AccessClaims {
            iss: self.settings.api_key.clone(),
            sub: identity.to_string(),
            nbf: now,
            exp: now + i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2),
            name: None,
            metadata: None,
            video,
        }
    }

    /// Participant access token for one room.
    pub fn access_token(
        &self,
        identity: &str,
        display_name: &str,
        grants: &JoinGrants,
        metadata: &serde_json::Value,
        ttl: Duration,
    ) -> ClassResult<String> {
        let claims = AccessClaims {
            name: Some(display_name.to_string()),
            metadata: Some(metadata.to_string()),
            ..self.claims(identity, ttl, VideoGrant::from(grants))
        };
        self.sign(&claims)
    }

    fn admin_token(&self, room: &str) -> ClassResult<String> {
        let grant = VideoGrant {
            room: room.to_string(),
            room_create: true,
            room_list: true,
            room_admin: true,
            ..VideoGrant::default()
        };
        self.sign(&self.claims("liveclass-engine", ADMIN_TOKEN_TTL, grant))
    }

    /// Calls a room service method. `None` when the service answers
    /// `not_found` or `already_exists`.
    async fn twirp<T: DeserializeOwned>(
        &self,
        method: &str,
        room: &str,
        body: serde_json::Value,
    ) -> ClassResult<Option<T>> {
        let url = format!(
            "{}/twirp/livekit.RoomService/{}",
            self.settings.api_url.trim_end_matches('/'),
            method
        );
        let res = self
            .client
            .post(&url)
            .bearer_auth(self.admin_token(room)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| upstream("video provider", e))?;

        if res.status().is_success() {
            let parsed = res.json::<T>().await.map_err(|e| upstream("video provider", e))?;
            return Ok(Some(parsed));
        }

        let status = res.status();
        let error = res.json::<TwirpError>().await.unwrap_or(TwirpError {
            code: String::new(),
            msg: String::new(),
        });
        if status == StatusCode::NOT_FOUND || matches!(error.code.as_str(), "not_found" | "already_exists") {
            return Ok(None);
        }
        Err(upstream(
            "video provider",
            format!("{} returned {} ({}: {})", method, status, error.code, error.msg),
        ))
    }
}

#[async_trait]
impl VideoProvider for HttpVideoProvider {
    async fn ensure_room(
        &self,
        room: &str,
        metadata: &serde_json::Value,
        max_participants: i32,
    ) -> ClassResult<bool> {
        let existing = self
            .twirp::<ListRoomsResponse>("ListRooms", room, json!({ "names": [room] }))
            .await?;
        if existing.is_some_and(|list| !list.rooms.is_empty()) {
            return Ok(false);
        }

        // Another caller may have won the race between the two calls.
        let created = self
            .twirp::<serde_json::Value>(
                "CreateRoom",
                room,
                json!({
                    "name": room,
                    "empty_timeout": EMPTY_ROOM_TIMEOUT_SECONDS,
                    "max_participants": max_participants,
                    "metadata": metadata.to_string(),
                }),
            )
            .await?
            .is_some();
        if created {
            tracing::info!(room, "Provisioned video room");
        }
        Ok(created)
    }

    async fn mint_join_credential(
        &self,
        room: &str,
        identity: &str,
        display_name: &str,
        grants: &JoinGrants,
        metadata: &serde_json::Value,
        ttl: Duration,
    ) -> ClassResult<MintedCredential> {
        if grants.room != room {
            return Err(ClassError::Internal(format!(
                "grants for room {} used to mint a token for {}",
                grants.room, room
            )));
        }
        Ok(MintedCredential {
            token: self.access_token(identity, display_name, grants, metadata, ttl)?,
            server_url: self.settings.ws_url.clone(),
        })
    }

    async fn list_live_participants(&self, room: &str) -> ClassResult<Vec<LiveParticipant>> {
        let listed = self
            .twirp::<ListParticipantsResponse>("ListParticipants", room, json!({ "room": room }))
            .await?;

        Ok(listed
            .map(|list| list.participants)
            .unwrap_or_default()
            .into_iter()
            .map(|p| LiveParticipant {
                tracks: p.tracks.iter().map(TwirpTrack::label).collect(),
                identity: p.identity,
            })
            .collect())
    }
}
