//! WebSocket handler bridging one client connection to the hub.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::api::AppState;

use super::hub::{ConnId, Hub};
use super::types::{ControlFrame, SystemFrame};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// User identifier for the connection. Authentication happens at the
    /// upstream gateway before the upgrade reaches this process; by the
    /// time we see it, the identifier is already validated.
    user: String,
}

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_connection(socket, hub, params.user))
}

/// Run one connection for its lifetime: register with the hub, pump the
/// outbound queue onto the wire from a spawned write task, and apply
/// inbound control frames until the peer goes away.
async fn handle_connection(socket: WebSocket, hub: Arc<Hub>, user_id: String) {
    let (mut sender, mut receiver) = socket.split();

    let registration = match hub.register(&user_id) {
        Ok(registration) => registration,
        Err(e) => {
            warn!("rejecting connection for user {user_id}: {e}");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    let conn_id = registration.conn_id;
    let mut events = registration.events;

    // Acknowledge the registration before either loop starts processing.
    let hello = SystemFrame::Connected { conn_id }.to_frame();
    if sender.send(Message::Text(hello)).await.is_err() {
        hub.unregister(conn_id);
        return;
    }

    // Write loop: drain the outbound queue onto the wire, interleaved
    // with keep-alive pings. The queue closing means the connection was
    // unregistered or evicted, so tell the peer and stop.
    let ping_interval = Duration::from_secs(hub.config().ping_interval_secs);
    let write_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(frame) => {
                        if sender.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                },
                _ = ping.tick() => {
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read loop: control frames from the peer, ended by peer close,
    // transport error, or hub shutdown.
    let shutdown = hub.shutdown_token();
    loop {
        let message = tokio::select! {
            message = receiver.next() => message,
            _ = shutdown.cancelled() => {
                info!("connection {conn_id} closing: hub shutdown");
                break;
            }
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                if !handle_control(&hub, conn_id, text.as_str()) {
                    break;
                }
            }
            Some(Ok(Message::Binary(_))) => {
                debug!("ignoring binary frame from connection {conn_id}");
            }
            Some(Ok(Message::Ping(_)) | Ok(Message::Pong(_))) => {
                // Transport-level liveness, answered by the ws layer.
            }
            Some(Ok(Message::Close(_))) => {
                info!("connection {conn_id} closed by peer");
                break;
            }
            Some(Err(e)) => {
                warn!("transport error on connection {conn_id}: {e}");
                break;
            }
            None => break,
        }
    }

    hub.unregister(conn_id);
    write_task.abort();
    info!("connection {conn_id} for user {user_id} torn down");
}

/// Apply one inbound control frame. Returns whether the connection is
/// still live; a `false` ends the read loop.
fn handle_control(hub: &Hub, conn_id: ConnId, raw: &str) -> bool {
    let frame = match serde_json::from_str::<ControlFrame>(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("bad control frame from connection {conn_id}: {e}");
            let reply = SystemFrame::Error {
                message: format!("invalid control frame: {e}"),
            };
            return hub.send_to(conn_id, reply.to_frame());
        }
    };

    match frame {
        ControlFrame::Join { room } => match hub.join(conn_id, &room) {
            Ok(()) => hub.send_to(conn_id, SystemFrame::Joined { room }.to_frame()),
            Err(e) => {
                warn!("join failed for connection {conn_id}: {e}");
                false
            }
        },
        ControlFrame::Leave { room } => {
            hub.leave(conn_id, &room);
            hub.send_to(conn_id, SystemFrame::Left { room }.to_frame())
        }
        ControlFrame::Ping => hub.send_to(conn_id, SystemFrame::Pong.to_frame()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::super::hub::HubConfig;
    use super::*;

    fn next_frame(events: &mut tokio::sync::mpsc::Receiver<super::super::types::Frame>) -> Value {
        let frame = events.try_recv().expect("expected a queued frame");
        serde_json::from_str(frame.as_str()).expect("frame is not valid JSON")
    }

    #[test]
    fn join_control_is_applied_and_acked() {
        let hub = Hub::new(HubConfig::default());
        let mut reg = hub.register("alice").unwrap();

        assert!(handle_control(
            &hub,
            reg.conn_id,
            r#"{"action":"join","room":"topic_42"}"#
        ));
        assert!(hub.is_member(reg.conn_id, "topic_42"));
        let ack = next_frame(&mut reg.events);
        assert_eq!(ack["type"], "joined");
        assert_eq!(ack["room"], "topic_42");

        assert!(handle_control(
            &hub,
            reg.conn_id,
            r#"{"action":"leave","room":"topic_42"}"#
        ));
        assert!(!hub.is_member(reg.conn_id, "topic_42"));
        assert_eq!(next_frame(&mut reg.events)["type"], "left");
    }

    #[test]
    fn ping_control_is_answered_with_pong() {
        let hub = Hub::new(HubConfig::default());
        let mut reg = hub.register("alice").unwrap();

        assert!(handle_control(&hub, reg.conn_id, r#"{"action":"ping"}"#));
        assert_eq!(next_frame(&mut reg.events)["type"], "pong");
    }

    #[test]
    fn malformed_control_reports_error_but_keeps_connection() {
        let hub = Hub::new(HubConfig::default());
        let mut reg = hub.register("alice").unwrap();

        assert!(handle_control(&hub, reg.conn_id, "not json"));
        assert!(hub.is_registered(reg.conn_id));
        assert_eq!(next_frame(&mut reg.events)["type"], "error");
    }

    #[test]
    fn control_after_eviction_ends_the_loop() {
        let hub = Hub::new(HubConfig::default());
        let reg = hub.register("alice").unwrap();
        hub.unregister(reg.conn_id);

        assert!(!handle_control(
            &hub,
            reg.conn_id,
            r#"{"action":"join","room":"topic_42"}"#
        ));
    }
}
