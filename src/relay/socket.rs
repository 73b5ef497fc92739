use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use super::{ConnectionId, Delivery, RelayEvent};
use crate::error::Error;
use crate::server::AppState;
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt};
use crate::service::access::is_admin;
use crate::types::Project;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayQuery {
    pub room_id: String,
    pub user_id: String,
}

/// `GET /ws?roomId=&userId=`. Only members with access may join a room.
pub async fn relay_socket(
    ws: WebSocketUpgrade,
    Query(query): Query<RelayQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let services = &state.services;

    services
        .projects
        .get_user(&query.user_id)
        .api_err("Failed to look up user")?
        .ok_or_else(|| ApiError::unauthorized("Unknown user"))?;
    let project = services
        .projects
        .get_project(&query.room_id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;
    if !services
        .access
        .has_access(&project.id, &query.user_id)
        .api_err("Failed to check access")?
    {
        return Err(ApiError::forbidden("You do not have access to this project"));
    }

    Ok(ws
        .on_upgrade(move |socket| run_session(socket, state, project, query.user_id))
        .into_response())
}

async fn run_session(socket: WebSocket, state: Arc<AppState>, project: Project, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut membership = state.relay.join(&project.id, &user_id);
    let origin = membership.id();

    if state.relay.cached(&project.id).is_none() {
        match state.services.projects.snapshot(&project.id) {
            Ok(Some(snapshot)) => {
                state.relay.seed(&project.id, snapshot);
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Failed to load snapshot for room {}: {e}", project.id),
        }
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let Some(reply) = handle_frame(&state, &project, &user_id, origin, text.as_str()) else {
                            continue;
                        };
                        match reply.encode() {
                            Ok(frame) => {
                                if sender.send(Message::Text(frame.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::error!("Failed to encode reply: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error for {} in room {}: {e}", user_id, project.id);
                        break;
                    }
                }
            }
            outgoing = membership.recv() => {
                let frame = match outgoing {
                    Some(Delivery::Frame(frame)) => frame.to_string(),
                    Some(Delivery::Lagged(_)) => match state.relay.resync(&project.id).encode() {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::error!("Failed to encode resync for room {}: {e}", project.id);
                            continue;
                        }
                    },
                    None => break,
                };
                if sender.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.relay.leave(membership);
}

/// Checks capability, writes the event through to the store, then hands it
/// to the relay. Returns a reply for the sender alone.
fn handle_frame(
    state: &AppState,
    project: &Project,
    user_id: &str,
    origin: ConnectionId,
    frame: &str,
) -> Option<RelayEvent> {
    let event = match RelayEvent::decode(frame) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!("Malformed relay frame from {user_id}: {e}");
            return Some(RelayEvent::Error(format!("Malformed event: {e}")));
        }
    };

    if event.requires_admin() && !is_admin(project, user_id) {
        tracing::warn!(
            "Rejected {} from non-admin {} in project {}",
            event.name(),
            user_id,
            project.id
        );
        return Some(RelayEvent::Error(format!(
            "Only the project admin can send {}",
            event.name()
        )));
    }

    match write_through(state, project, user_id, event) {
        Ok(Dispatch::Forward(event)) => state.relay.apply(&project.id, origin, event),
        Ok(Dispatch::Publish(event)) => {
            state.relay.publish(&project.id, event);
            None
        }
        Err(message) => Some(RelayEvent::Error(message)),
    }
}

/// How an event that passed write-through reaches the room.
enum Dispatch {
    /// The sender's own event, relayed to everyone else.
    Forward(RelayEvent),
    /// A record created by the services, sent to every member including
    /// the sender so they all hold the same id.
    Publish(RelayEvent),
}

/// Persists what the event changes.
///
/// Edits to existing files survive a store failure: it is logged and the
/// event is still relayed. Refusals from the services (last file, foreign
/// file, validation) are returned to the sender and nothing is relayed.
/// New files and messages are created by the services with server ids, so
/// they are relayed only once stored.
fn write_through(
    state: &AppState,
    project: &Project,
    user_id: &str,
    event: RelayEvent,
) -> Result<Dispatch, String> {
    let services = &state.services;
    match event {
        RelayEvent::CodeChange(change) => {
            require_room_file(state, project, &change.file_id)?;
            if let Err(e) = services
                .governance
                .write_file(&change.file_id, &change.content, user_id)
            {
                tolerate_storage_failure(e, "code-change", project)?;
            }
            Ok(Dispatch::Forward(RelayEvent::CodeChange(change)))
        }
        RelayEvent::FileDeleted(file_id) => {
            require_room_file(state, project, &file_id)?;
            if let Err(e) = services.governance.delete_file(&file_id, user_id) {
                tolerate_storage_failure(e, "file-deleted", project)?;
            }
            Ok(Dispatch::Forward(RelayEvent::FileDeleted(file_id)))
        }
        RelayEvent::FileCreated(file) => {
            let stored = services
                .governance
                .create_file(&project.id, &file.file_name, &file.content, user_id)
                .map_err(|e| refusal(e, "file-created", project))?
                .ok_or_else(|| "Project not found".to_string())?;
            Ok(Dispatch::Publish(RelayEvent::FileCreated(stored)))
        }
        RelayEvent::NewMessage(message) => {
            let stored = services
                .projects
                .post_message(&project.id, user_id, &message.content)
                .map_err(|e| refusal(e, "new-message", project))?
                .ok_or_else(|| "Project not found".to_string())?;
            Ok(Dispatch::Publish(RelayEvent::NewMessage(stored)))
        }
        other => Ok(Dispatch::Forward(other)),
    }
}

/// Refuses events that name a file outside this room.
fn require_room_file(state: &AppState, project: &Project, file_id: &str) -> Result<(), String> {
    match state.services.projects.get_file(file_id) {
        Ok(Some(file)) if file.project_id == project.id => Ok(()),
        Ok(_) => Err("File not found in this project".to_string()),
        Err(e) => tolerate_storage_failure(e, "file lookup", project),
    }
}

fn tolerate_storage_failure(err: Error, what: &str, project: &Project) -> Result<(), String> {
    if err.is_storage_failure() {
        tracing::error!("Failed to persist {what} in project {}: {err}", project.id);
        Ok(())
    } else {
        Err(refusal(err, what, project))
    }
}

fn refusal(err: Error, what: &str, project: &Project) -> String {
    if err.is_storage_failure() {
        tracing::error!("Failed to persist {what} in project {}: {err}", project.id);
        return format!("Failed to save {what}");
    }
    tracing::warn!("Refused {what} in project {}: {err}", project.id);
    err.to_string()
}
