//! Loopback stand-in for the Telegram Bot API used by the crate's tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};

use {
    axum::{Json, Router, body::Bytes, extract::State, http::Uri, routing::post},
    serde_json::{Value, json},
    tokio::{sync::oneshot, task::JoinHandle},
};

pub(crate) const CONFLICT_DESCRIPTION: &str = "Conflict: terminated by other getUpdates request; make sure that only one bot instance is running";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TelegramApiMethod {
    GetMe,
    GetUpdates,
    DeleteWebhook,
    SetMyCommands,
    SendMessage,
    EditMessageText,
    DeleteMessage,
    SendDocument,
    Other(String),
}

impl TelegramApiMethod {
    fn from_path(path: &str) -> Self {
        let method = path.rsplit('/').next().unwrap_or_default();
        match method {
            "GetMe" => Self::GetMe,
            "GetUpdates" => Self::GetUpdates,
            "DeleteWebhook" => Self::DeleteWebhook,
            "SetMyCommands" => Self::SetMyCommands,
            "SendMessage" => Self::SendMessage,
            "EditMessageText" => Self::EditMessageText,
            "DeleteMessage" => Self::DeleteMessage,
            "SendDocument" => Self::SendDocument,
            _ => Self::Other(method.to_string()),
        }
    }
}

/// One request received by the mock. `body` is `Null` for multipart uploads.
#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub(crate) method: TelegramApiMethod,
    pub(crate) body: Value,
    pub(crate) raw_body: String,
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    next_message_id: Arc<AtomicI64>,
}

pub(crate) struct MockTelegramApi {
    state: MockState,
    url: reqwest::Url,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<()>,
}

impl MockTelegramApi {
    pub(crate) async fn start() -> Self {
        let state = MockState {
            next_message_id: Arc::new(AtomicI64::new(100)),
            ..Default::default()
        };
        let app = Router::new()
            .route("/{*path}", post(telegram_api_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock telegram api");
        });

        let url = reqwest::Url::parse(&format!("http://{addr}/")).expect("parse api url");
        Self {
            state,
            url,
            shutdown,
            server,
        }
    }

    pub(crate) fn bot(&self) -> teloxide::Bot {
        teloxide::Bot::new("test-token").set_api_url(self.url.clone())
    }

    pub(crate) fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().expect("requests lock").clone()
    }

    pub(crate) fn methods(&self) -> Vec<TelegramApiMethod> {
        self.requests().into_iter().map(|r| r.method).collect()
    }

    pub(crate) async fn shutdown(self) {
        let _ = self.shutdown.send(());
        self.server.await.expect("join mock server");
    }
}

fn message_result(message_id: i64, chat_id: i64, text: &str) -> Value {
    json!({
        "message_id": message_id,
        "date": 0,
        "chat": { "id": chat_id, "type": "private", "first_name": "Alice" },
        "text": text,
    })
}

fn ok(result: Value) -> Json<Value> {
    Json(json!({ "ok": true, "result": result }))
}

async fn telegram_api_handler(
    State(state): State<MockState>,
    uri: Uri,
    body: Bytes,
) -> Json<Value> {
    let method = TelegramApiMethod::from_path(uri.path());
    let raw_body = String::from_utf8_lossy(&body).to_string();
    let parsed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    state
        .requests
        .lock()
        .expect("lock requests")
        .push(CapturedRequest {
            method: method.clone(),
            body: parsed.clone(),
            raw_body,
        });

    let chat_id = parsed["chat_id"].as_i64().unwrap_or(42);
    match method {
        TelegramApiMethod::GetMe => ok(json!({
            "id": 777,
            "is_bot": true,
            "first_name": "Eval",
            "username": "eval_bot",
            "can_join_groups": true,
            "can_read_all_group_messages": false,
            "supports_inline_queries": false,
            "can_connect_to_business": false,
            "has_main_web_app": false,
        })),
        TelegramApiMethod::GetUpdates => Json(json!({
            "ok": false,
            "error_code": 409,
            "description": CONFLICT_DESCRIPTION,
        })),
        TelegramApiMethod::SendMessage | TelegramApiMethod::SendDocument => {
            let id = state.next_message_id.fetch_add(1, Ordering::SeqCst);
            let text = parsed["text"].as_str().unwrap_or_default();
            ok(message_result(id, chat_id, text))
        },
        TelegramApiMethod::EditMessageText => {
            let id = parsed["message_id"].as_i64().unwrap_or(1);
            let text = parsed["text"].as_str().unwrap_or_default();
            ok(message_result(id, chat_id, text))
        },
        TelegramApiMethod::DeleteWebhook
        | TelegramApiMethod::SetMyCommands
        | TelegramApiMethod::DeleteMessage
        | TelegramApiMethod::Other(_) => ok(json!(true)),
    }
}
