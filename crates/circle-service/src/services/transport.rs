//! Media transport boundary.
//!
//! The live audio/video room is owned by an external transport. The state
//! machine only needs a handful of calls from it, collected in `RoomTransport`
//! so tests can swap in `mock::MockTransport`.

use crate::errors::CircleError;
use crate::observability::metrics;
use crate::room::{ConnectedSet, RoomState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{ParticipantId, SessionId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Credential a participant presents to the media server to join the call.
#[derive(Debug, Clone, Serialize)]
pub struct JoinCredential {
    /// Media server URL the client connects to.
    pub server_url: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Calls the state machine needs from the media transport.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    /// Participants currently attached to the session's media room.
    ///
    /// A media room that does not exist yet has nobody connected.
    async fn get_connected_participants(
        &self,
        session_id: SessionId,
    ) -> Result<ConnectedSet, CircleError>;

    /// Push a snapshot to everyone in the media room. Best effort.
    async fn publish_state(&self, state: &RoomState) -> Result<(), CircleError>;

    /// Issue a credential for `participant` to join the session's media room.
    fn create_join_token(
        &self,
        session_id: SessionId,
        participant: ParticipantId,
        display_name: Option<&str>,
    ) -> Result<JoinCredential, CircleError>;

    /// Mute every published audio track of one participant.
    async fn mute_participant(
        &self,
        session_id: SessionId,
        participant: ParticipantId,
    ) -> Result<(), CircleError>;

    /// Disconnect one participant from the media room.
    async fn remove_participant(
        &self,
        session_id: SessionId,
        participant: ParticipantId,
    ) -> Result<(), CircleError>;

    /// Mute everyone connected except `except`. Returns how many were muted.
    ///
    /// Participants who left after the listing are skipped; any other failure
    /// stops the loop.
    async fn mute_all(
        &self,
        session_id: SessionId,
        except: ParticipantId,
    ) -> Result<usize, CircleError> {
        let connected = self.get_connected_participants(session_id).await?;
        let mut muted = 0;

        for participant in connected.into_iter().filter(|id| *id != except) {
            match self.mute_participant(session_id, participant).await {
                Ok(()) => muted += 1,
                Err(CircleError::NotFound(_)) => {
                    debug!(
                        target: "circle.services.transport",
                        session_id = %session_id,
                        participant_id = %participant,
                        "Participant left before mute, skipping"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(muted)
    }
}

/// Publish a committed snapshot without blocking the caller.
///
/// Failures are logged and counted, never propagated: the state change is
/// already durable and clients fall back to polling.
pub fn spawn_publish(transport: Arc<dyn RoomTransport>, state: RoomState) {
    tokio::spawn(async move {
        match transport.publish_state(&state).await {
            Ok(()) => {
                info!(
                    target: "circle.services.transport",
                    session_id = %state.session_id,
                    version = state.version,
                    "Room state published"
                );
            }
            Err(e) => {
                metrics::record_publish_failure();
                warn!(
                    target: "circle.services.transport",
                    session_id = %state.session_id,
                    version = state.version,
                    error = %e,
                    "Failed to publish room state"
                );
            }
        }
    });
}

/// Mock transport for tests.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard};

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// In-memory transport with a settable connected set per session.
    #[derive(Default)]
    pub struct MockTransport {
        connected: Mutex<HashMap<SessionId, ConnectedSet>>,
        published: Mutex<Vec<RoomState>>,
        muted: Mutex<Vec<(SessionId, ParticipantId)>>,
        removed: Mutex<Vec<(SessionId, ParticipantId)>>,
        list_calls: AtomicUsize,
        fail_listing: AtomicBool,
        fail_publishing: AtomicBool,
    }

    impl MockTransport {
        /// A transport where nobody is connected anywhere and every call succeeds.
        pub fn new() -> Self {
            Self::default()
        }

        /// A transport whose list and publish calls always fail.
        pub fn failing() -> Self {
            let transport = Self::default();
            transport.set_fail_listing(true);
            transport.set_fail_publishing(true);
            transport
        }

        /// Replace who is connected to a session's media room.
        pub fn set_connected<I>(&self, session_id: SessionId, participants: I)
        where
            I: IntoIterator<Item = ParticipantId>,
        {
            lock(&self.connected).insert(session_id, participants.into_iter().collect());
        }

        pub fn set_fail_listing(&self, fail: bool) {
            self.fail_listing.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_publishing(&self, fail: bool) {
            self.fail_publishing.store(fail, Ordering::SeqCst);
        }

        /// Snapshots successfully published, in publish order.
        pub fn published(&self) -> Vec<RoomState> {
            lock(&self.published).clone()
        }

        pub fn muted(&self) -> Vec<(SessionId, ParticipantId)> {
            lock(&self.muted).clone()
        }

        pub fn removed(&self) -> Vec<(SessionId, ParticipantId)> {
            lock(&self.removed).clone()
        }

        pub fn list_call_count(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        fn ensure_connected(
            &self,
            session_id: SessionId,
            participant: ParticipantId,
        ) -> Result<(), CircleError> {
            let connected = lock(&self.connected);
            let present = connected
                .get(&session_id)
                .is_some_and(|set| set.contains(&participant));
            if present {
                Ok(())
            } else {
                Err(CircleError::NotFound(
                    "participant is not connected".to_string(),
                ))
            }
        }
    }

    #[async_trait]
    impl RoomTransport for MockTransport {
        async fn get_connected_participants(
            &self,
            session_id: SessionId,
        ) -> Result<ConnectedSet, CircleError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);

            if self.fail_listing.load(Ordering::SeqCst) {
                return Err(CircleError::Transport("mock transport error".to_string()));
            }

            Ok(lock(&self.connected)
                .get(&session_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn publish_state(&self, state: &RoomState) -> Result<(), CircleError> {
            if self.fail_publishing.load(Ordering::SeqCst) {
                return Err(CircleError::Transport("mock transport error".to_string()));
            }
            lock(&self.published).push(state.clone());
            Ok(())
        }

        fn create_join_token(
            &self,
            session_id: SessionId,
            participant: ParticipantId,
            _display_name: Option<&str>,
        ) -> Result<JoinCredential, CircleError> {
            Ok(JoinCredential {
                server_url: "ws://mock-transport".to_string(),
                token: format!("mock-token:{session_id}:{participant}"),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            })
        }

        async fn mute_participant(
            &self,
            session_id: SessionId,
            participant: ParticipantId,
        ) -> Result<(), CircleError> {
            self.ensure_connected(session_id, participant)?;
            lock(&self.muted).push((session_id, participant));
            Ok(())
        }

        async fn remove_participant(
            &self,
            session_id: SessionId,
            participant: ParticipantId,
        ) -> Result<(), CircleError> {
            self.ensure_connected(session_id, participant)?;
            lock(&self.removed).push((session_id, participant));
            if let Some(set) = lock(&self.connected).get_mut(&session_id) {
                set.remove(&participant);
            }
            Ok(())
        }
    }

}
