/* affect:meta
id: AFF-20261011-ws-observer
intent: code
summary: |-
  Each WebSocket is one observer: snapshot first, then every change as JSON
  text. Leaves the hub on close, on socket error, or when dropped as stalled.
*/
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tracing::{debug, warn};

use super::AppState;

pub async fn observe(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_observer(socket, state))
}

async fn serve_observer(mut socket: WebSocket, state: AppState) {
    let mut observer = state.engine.subscribe();
    let id = observer.id();
    debug!(observer = id, "websocket observer connected");
    loop {
        tokio::select! {
            update = observer.recv() => {
                let Some(update) = update else {
                    // dropped by the hub: stalled, or the engine is shutting down
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                let text = match serde_json::to_string(&*update) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(%err, "failed to encode broadcast");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                None | Some(Ok(Message::Close(_))) => break,
                Some(Err(err)) => {
                    debug!(observer = id, %err, "websocket error");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }
    state.engine.unsubscribe(id);
    debug!(observer = id, "websocket observer disconnected");
}
