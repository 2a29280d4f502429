//! LiveKit implementation of `RoomTransport`.
//!
//! Talks to the LiveKit server API over Twirp (JSON over HTTP POST to
//! `/twirp/livekit.RoomService/<Method>`). Every call is authenticated with a
//! short-lived HS256 token signed by the API secret and carrying a `video`
//! grant for the one room it touches. The media room name is the session id.
//!
//! # Security
//!
//! - The API secret never leaves this module and is never logged
//! - Timeouts prevent hanging connections
//! - Errors are logged server-side; callers see `LIVEKIT_ERROR`

use crate::errors::CircleError;
use crate::observability::metrics;
use crate::room::{ConnectedSet, RoomState};
use crate::services::transport::{JoinCredential, RoomTransport};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use common::secret::{ExposeSecret, SecretString};
use common::types::{ParticipantId, SessionId};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{error, instrument, warn};

/// Timeout for LiveKit API requests in seconds.
const LIVEKIT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Lifetime of the server-to-server API token.
const SERVER_TOKEN_TTL_SECS: i64 = 60;

/// Data topic clients subscribe to for room state pushes.
pub const ROOM_STATE_TOPIC: &str = "room_state";

const TWIRP_PREFIX: &str = "twirp/livekit.RoomService";

/// HTTP client for the LiveKit server API.
#[derive(Clone)]
pub struct LiveKitClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: SecretString,
    token_ttl: Duration,
}

// ============================================================================
// Token claims
// ============================================================================

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoGrant<'a> {
    room: &'a str,
    #[serde(skip_serializing_if = "is_false")]
    room_admin: bool,
    #[serde(skip_serializing_if = "is_false")]
    room_join: bool,
    #[serde(skip_serializing_if = "is_false")]
    can_publish: bool,
    #[serde(skip_serializing_if = "is_false")]
    can_subscribe: bool,
    #[serde(skip_serializing_if = "is_false")]
    can_publish_data: bool,
}

#[derive(Debug, Serialize)]
struct AccessClaims<'a> {
    iss: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    nbf: i64,
    exp: i64,
    video: VideoGrant<'a>,
}

// ============================================================================
// Twirp request/response bodies
// ============================================================================

#[derive(Serialize)]
struct RoomRequest<'a> {
    room: &'a str,
}

#[derive(Serialize)]
struct ParticipantRequest<'a> {
    room: &'a str,
    identity: &'a str,
}

#[derive(Serialize)]
struct MuteTrackRequest<'a> {
    room: &'a str,
    identity: &'a str,
    track_sid: &'a str,
    muted: bool,
}

#[derive(Serialize)]
struct SendDataRequest<'a> {
    room: &'a str,
    /// Base64, as protobuf `bytes` are encoded in JSON.
    data: String,
    kind: &'static str,
    topic: &'static str,
}

#[derive(Debug, Deserialize)]
struct ListParticipantsResponse {
    #[serde(default)]
    participants: Vec<ParticipantInfo>,
}

#[derive(Debug, Deserialize)]
struct ParticipantInfo {
    identity: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    tracks: Vec<TrackInfo>,
}

#[derive(Debug, Deserialize)]
struct TrackInfo {
    sid: String,
    /// Omitted for `AUDIO`, the protobuf default.
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    muted: bool,
}

impl TrackInfo {
    fn is_audio(&self) -> bool {
        self.kind.as_deref().map_or(true, |kind| kind == "AUDIO")
    }
}

/// Empty Twirp response body.
#[derive(Debug, Deserialize)]
struct Empty {}

#[derive(Debug, Deserialize)]
struct TwirpError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
}

impl LiveKitClient {
    /// Create a new LiveKit client.
    ///
    /// # Errors
    ///
    /// Returns `CircleError::Internal` if the HTTP client cannot be built.
    pub fn new(
        base_url: String,
        api_key: String,
        api_secret: SecretString,
        token_ttl: Duration,
    ) -> Result<Self, CircleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(LIVEKIT_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "circle.services.livekit", error = %e, "Failed to build HTTP client");
                CircleError::Internal
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
            token_ttl,
        })
    }

    fn sign(&self, claims: &AccessClaims<'_>) -> Result<String, CircleError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.api_secret.expose_secret().as_bytes()),
        )
        .map_err(|e| {
            error!(target: "circle.services.livekit", error = %e, "Failed to sign LiveKit token");
            CircleError::Internal
        })
    }

    /// Admin token scoped to one room, for server API calls.
    fn server_token(&self, room: &str) -> Result<String, CircleError> {
        let now = Utc::now().timestamp();
        self.sign(&AccessClaims {
            iss: &self.api_key,
            sub: None,
            name: None,
            nbf: now,
            exp: now + SERVER_TOKEN_TTL_SECS,
            video: VideoGrant {
                room,
                room_admin: true,
                ..VideoGrant::default()
            },
        })
    }

    /// POST a Twirp call. `Ok(None)` means LiveKit answered `not_found`.
    async fn twirp<Req, Resp>(
        &self,
        method: &'static str,
        room: &str,
        body: &Req,
    ) -> Result<Option<Resp>, CircleError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let start = Instant::now();
        let result = self.twirp_inner(method, room, body).await;

        let status = match &result {
            Ok(Some(_)) => "success",
            Ok(None) => "not_found",
            Err(_) => "error",
        };
        metrics::record_transport_call(method, status, start.elapsed());

        result
    }

    async fn twirp_inner<Req, Resp>(
        &self,
        method: &'static str,
        room: &str,
        body: &Req,
    ) -> Result<Option<Resp>, CircleError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}/{}", self.base_url, TWIRP_PREFIX, method);
        let token = self.server_token(room)?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "circle.services.livekit", error = %e, method, "LiveKit request failed");
                CircleError::Transport(format!("{method} request failed"))
            })?;

        let status = response.status();

        if status.is_success() {
            return response.json().await.map(Some).map_err(|e| {
                error!(target: "circle.services.livekit", error = %e, method, "Failed to parse LiveKit response");
                CircleError::Transport(format!("{method} returned an unreadable body"))
            });
        }

        let twirp_error: Option<TwirpError> = response.json().await.ok();

        if status == StatusCode::NOT_FOUND
            || twirp_error.as_ref().is_some_and(|e| e.code == "not_found")
        {
            return Ok(None);
        }

        let detail = twirp_error.map(|e| format!("{}: {}", e.code, e.msg)).unwrap_or_default();
        warn!(
            target: "circle.services.livekit",
            status = %status,
            method,
            detail = %detail,
            "LiveKit returned an error"
        );
        Err(CircleError::Transport(format!(
            "{method} returned status {status}"
        )))
    }

    async fn get_participant(
        &self,
        room: &str,
        identity: &str,
    ) -> Result<ParticipantInfo, CircleError> {
        self.twirp("GetParticipant", room, &ParticipantRequest { room, identity })
            .await?
            .ok_or_else(|| CircleError::NotFound("participant is not connected".to_string()))
    }
}

#[async_trait]
impl RoomTransport for LiveKitClient {
    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn get_connected_participants(
        &self,
        session_id: SessionId,
    ) -> Result<ConnectedSet, CircleError> {
        let room = session_id.to_string();

        let response: Option<ListParticipantsResponse> = self
            .twirp("ListParticipants", &room, &RoomRequest { room: &room })
            .await?;

        let Some(response) = response else {
            return Ok(ConnectedSet::new());
        };

        Ok(response
            .participants
            .into_iter()
            .filter(|p| p.state.as_deref() != Some("DISCONNECTED"))
            .filter_map(|p| ParticipantId::from_str(&p.identity).ok())
            .collect())
    }

    #[instrument(skip_all, fields(session_id = %state.session_id, version = state.version))]
    async fn publish_state(&self, state: &RoomState) -> Result<(), CircleError> {
        let room = state.session_id.to_string();

        let payload = serde_json::to_vec(state).map_err(|e| {
            error!(target: "circle.services.livekit", error = %e, "Failed to serialize room state");
            CircleError::Internal
        })?;

        let request = SendDataRequest {
            room: &room,
            data: BASE64.encode(payload),
            kind: "RELIABLE",
            topic: ROOM_STATE_TOPIC,
        };

        // Publishing into a room nobody has opened yet is a no-op
        let _: Option<Empty> = self.twirp("SendData", &room, &request).await?;
        Ok(())
    }

    fn create_join_token(
        &self,
        session_id: SessionId,
        participant: ParticipantId,
        display_name: Option<&str>,
    ) -> Result<JoinCredential, CircleError> {
        let room = session_id.to_string();
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.token_ttl).map_err(|_| CircleError::Internal)?;
        let expires_at = now + ttl;

        let token = self.sign(&AccessClaims {
            iss: &self.api_key,
            sub: Some(participant.to_string()),
            name: display_name,
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            video: VideoGrant {
                room: &room,
                room_join: true,
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..VideoGrant::default()
            },
        })?;

        Ok(JoinCredential {
            server_url: self.base_url.clone(),
            token,
            expires_at,
        })
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn mute_participant(
        &self,
        session_id: SessionId,
        participant: ParticipantId,
    ) -> Result<(), CircleError> {
        let room = session_id.to_string();
        let identity = participant.to_string();
        let info = self.get_participant(&room, &identity).await?;

        for track in info.tracks.iter().filter(|t| t.is_audio() && !t.muted) {
            let request = MuteTrackRequest {
                room: &room,
                identity: &identity,
                track_sid: &track.sid,
                muted: true,
            };
            let _: Option<serde_json::Value> =
                self.twirp("MutePublishedTrack", &room, &request).await?;
        }

        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn remove_participant(
        &self,
        session_id: SessionId,
        participant: ParticipantId,
    ) -> Result<(), CircleError> {
        let room = session_id.to_string();
        let identity = participant.to_string();

        let removed: Option<Empty> = self
            .twirp(
                "RemoveParticipant",
                &room,
                &ParticipantRequest {
                    room: &room,
                    identity: &identity,
                },
            )
            .await?;

        removed
            .map(|_| ())
            .ok_or_else(|| CircleError::NotFound("participant is not connected".to_string()))
    }
}
