//! LiveKit client tests against a wiremock server speaking Twirp JSON.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use circle_service::errors::CircleError;
use circle_service::room::{Room, RoomState};
use circle_service::services::{LiveKitClient, RoomTransport};
use common::secret::SecretString;
use common::types::{ParticipantId, SessionId};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LIST_PATH: &str = "/twirp/livekit.RoomService/ListParticipants";
const SEND_DATA_PATH: &str = "/twirp/livekit.RoomService/SendData";
const GET_PARTICIPANT_PATH: &str = "/twirp/livekit.RoomService/GetParticipant";
const MUTE_TRACK_PATH: &str = "/twirp/livekit.RoomService/MutePublishedTrack";
const REMOVE_PATH: &str = "/twirp/livekit.RoomService/RemoveParticipant";

fn client(server: &MockServer) -> LiveKitClient {
    LiveKitClient::new(
        server.uri(),
        "test-api-key".to_string(),
        SecretString::from("test-api-secret"),
        Duration::from_secs(3600),
    )
    .unwrap()
}

fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({"code": "not_found", "msg": "room not found"}))
}

#[tokio::test]
async fn test_list_participants_filters_identities() {
    let server = MockServer::start().await;
    let session = SessionId::new();
    let alice = ParticipantId::new();
    let bob = ParticipantId::new();

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({"room": session.to_string()})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "participants": [
                {"identity": alice.to_string(), "state": "ACTIVE"},
                {"identity": bob.to_string(), "state": "DISCONNECTED"},
                {"identity": "recording-bot", "state": "ACTIVE"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let connected = client(&server)
        .get_connected_participants(session)
        .await
        .unwrap();

    assert_eq!(connected.len(), 1);
    assert!(connected.contains(&alice));
}

#[tokio::test]
async fn test_missing_room_has_nobody_connected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(not_found())
        .mount(&server)
        .await;

    let connected = client(&server)
        .get_connected_participants(SessionId::new())
        .await
        .unwrap();

    assert!(connected.is_empty());
}

#[tokio::test]
async fn test_server_error_is_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(LIST_PATH))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"code": "internal", "msg": "boom"})),
        )
        .mount(&server)
        .await;

    let result = client(&server)
        .get_connected_participants(SessionId::new())
        .await;

    assert!(matches!(result, Err(CircleError::Transport(_))));
}

#[tokio::test]
async fn test_publish_state_sends_reliable_data() {
    let server = MockServer::start().await;
    let state = Room::new_waiting(SessionId::new(), ParticipantId::new()).snapshot();

    Mock::given(method("POST"))
        .and(path(SEND_DATA_PATH))
        .and(body_partial_json(json!({
            "room": state.session_id.to_string(),
            "kind": "RELIABLE",
            "topic": "room_state"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).publish_state(&state).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let payload = BASE64.decode(body["data"].as_str().unwrap()).unwrap();
    let published: RoomState = serde_json::from_slice(&payload).unwrap();
    assert_eq!(published, state);
}

#[tokio::test]
async fn test_mute_only_unmuted_audio_tracks() {
    let server = MockServer::start().await;
    let session = SessionId::new();
    let alice = ParticipantId::new();

    Mock::given(method("POST"))
        .and(path(GET_PARTICIPANT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "identity": alice.to_string(),
            "tracks": [
                {"sid": "TR_audio"},
                {"sid": "TR_video", "type": "VIDEO"},
                {"sid": "TR_muted", "type": "AUDIO", "muted": true}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(MUTE_TRACK_PATH))
        .and(body_partial_json(json!({"track_sid": "TR_audio", "muted": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"track": {}})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .mute_participant(session, alice)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mute_unknown_participant_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GET_PARTICIPANT_PATH))
        .respond_with(not_found())
        .mount(&server)
        .await;

    let result = client(&server)
        .mute_participant(SessionId::new(), ParticipantId::new())
        .await;

    assert!(matches!(result, Err(CircleError::NotFound(_))));
}

#[tokio::test]
async fn test_remove_participant() {
    let server = MockServer::start().await;
    let session = SessionId::new();
    let alice = ParticipantId::new();

    Mock::given(method("POST"))
        .and(path(REMOVE_PATH))
        .and(body_partial_json(json!({
            "room": session.to_string(),
            "identity": alice.to_string()
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .remove_participant(session, alice)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_remove_missing_participant_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(REMOVE_PATH))
        .respond_with(not_found())
        .mount(&server)
        .await;

    let result = client(&server)
        .remove_participant(SessionId::new(), ParticipantId::new())
        .await;

    assert!(matches!(result, Err(CircleError::NotFound(_))));
}
