//! HTTP surface of the daemon.
//!
//! Reporters push sensor readings and access events, dashboards pull recent data and follow
//! live readings through server-sent events or a raw websocket.
use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;

use crate::config::HttpParameters;
use crate::decode::{decode_sensor_bytes, RecordKind};
use crate::fanout::{Fanout, Payload, SENSOR_EVENT};
use crate::ingest::{Ingestor, Origin};
use crate::record::AccessSubmission;

/// Sent to every raw socket client right after it connects.
pub const SOCKET_GREETING: &str = "Conexão estabelecida com o servidor";

#[derive(Clone)]
struct AppState
{
    ingestor: Ingestor,
    shutdown: watch::Receiver<bool>,
}

impl FromRef<AppState> for Ingestor {
    fn from_ref(state: &AppState) -> Self {
        state.ingestor.clone()
    }
}

impl FromRef<AppState> for watch::Receiver<bool> {
    fn from_ref(state: &AppState) -> Self {
        state.shutdown.clone()
    }
}

/// Routes of the daemon. Open event streams and sockets are closed once `shutdown` fires.
pub fn router(ingestor: Ingestor, shutdown: watch::Receiver<bool>) -> Router {
    Router::new()
        .route("/salvar-sensor", post(save_sensor))
        .route("/registrar-acesso", post(register_access))
        .route("/api/dados", get(recent_readings))
        .route("/ultimo-acesso", get(latest_access))
        .route("/events", get(events))
        .route("/ws", get(socket_upgrade))
        .with_state(AppState { ingestor, shutdown })
}

/// Binds the configured address and serves until `shutdown` fires.
pub async fn serve(params: &HttpParameters, ingestor: Ingestor, shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
    let listener = TcpListener::bind((params.address.as_str(), params.port)).await?;
    serve_on(listener, ingestor, shutdown).await
}

/// Serves on an already bound listener until `shutdown` fires.
pub async fn serve_on(listener: TcpListener, ingestor: Ingestor, shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
    log::info!(target: "sensorlogd::http", "Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(ingestor, shutdown.clone()))
        .with_graceful_shutdown(stopped(shutdown))
        .await?;

    log::info!(target: "sensorlogd::http", "Http listener stopped!");
    Ok(())
}

/// Resolves once shutdown is signalled or the signalling side is gone.
async fn stopped(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn save_sensor(State(ingestor): State<Ingestor>, body: Bytes) -> Response {
    let sample = match decode_sensor_bytes(&body) {
        Ok(sample) => sample,
        Err(err) => {
            RecordKind::Sensor.policy().reject("sensorlogd::http", &String::from_utf8_lossy(&body), &err);
            return (StatusCode::BAD_REQUEST, Json(json!({ "erro": "❌ Dados incompletos" }))).into_response();
        }
    };

    match ingestor.ingest_sensor(sample, Origin::Http).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "mensagem": "✅ Dados salvos com sucesso" }))).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "erro": "Erro ao salvar dados" }))).into_response(),
    }
}

/// Accepts a badge scan. The answer never tells whether it was stored.
async fn register_access(State(ingestor): State<Ingestor>, body: Bytes) -> StatusCode {
    if let Ok(submission) = serde_json::from_slice::<AccessSubmission>(&body) {
        ingestor.ingest_access(submission).await;
    }
    StatusCode::ACCEPTED
}

async fn recent_readings(State(ingestor): State<Ingestor>) -> Response {
    match ingestor.recent_readings().await {
        Ok(readings) => Json(readings).into_response(),
        Err(err) => {
            log::error!(target: "sensorlogd::http", "Could not query sensor readings: \'{}\'", err);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "erro": "Erro ao acessar os dados." }))).into_response()
        }
    }
}

async fn latest_access(State(ingestor): State<Ingestor>) -> Response {
    match ingestor.latest_access().await {
        Ok(Some(event)) => Json(event).into_response(),
        Ok(None) => Json(json!({ "mensagem": "Nenhum acesso encontrado" })).into_response(),
        Err(err) => {
            log::error!(target: "sensorlogd::http", "Could not query latest access: \'{}\'", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Erro no servidor").into_response()
        }
    }
}

/// Room channel as server-sent events, ending on shutdown.
async fn events(State(ingestor): State<Ingestor>,
                State(shutdown): State<watch::Receiver<bool>>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let room = ingestor.fanout().room().join();

    let stream = stream::unfold(room, |mut room| async move {
        loop {
            match room.recv().await {
                Ok(payload) => return Some((Ok(sse_event(&payload)), room)),
                Err(RecvError::Lagged(missed)) => {
                    log::debug!(target: "sensorlogd::fanout", "Room member lagged, {} payloads dropped", missed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .take_until(stopped(shutdown));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(payload: &Payload) -> Event {
    let event = Event::default().event(SENSOR_EVENT);
    match payload {
        Payload::Reading(reading) => event.json_data(reading).unwrap_or_else(|_| Event::default()),
        Payload::Raw(text) => event.data(text.as_str()),
    }
}

async fn socket_upgrade(State(ingestor): State<Ingestor>,
                        State(shutdown): State<watch::Receiver<bool>>,
                        upgrade: WebSocketUpgrade) -> Response {
    let fanout = Arc::clone(ingestor.fanout());
    upgrade.on_upgrade(move |socket| socket_session(socket, fanout, shutdown))
}

/// Pumps the subscriber queue into the socket until either side goes away or shutdown fires.
async fn socket_session(socket: WebSocket, fanout: Arc<Fanout>, shutdown: watch::Receiver<bool>) {
    let (id, mut queue) = fanout.register_socket();
    let (mut sender, mut receiver) = socket.split();
    let stop = stopped(shutdown);
    tokio::pin!(stop);

    if sender.send(Message::Text(SOCKET_GREETING.to_string())).await.is_ok() {
        loop {
            tokio::select! {
                _ = &mut stop => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                outgoing = queue.recv() => match outgoing {
                    Some(text) => {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    fanout.unregister_socket(id);
}
