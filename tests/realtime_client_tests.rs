//! OpenAI realtime client against a tokio-tungstenite mock provider.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use callbridge_gateway::core::openai::{OpenAIClient, SessionSettings};
use callbridge_gateway::core::realtime::{
    BaseRealtime, ConnectionState, OpenAIRealtime, RealtimeAudioData, RealtimeConfig,
    RealtimeError, ReconnectionConfig, ReconnectionEvent, TokenRefresher,
};
use callbridge_gateway::telephony::{OpenAIProviderFactory, ProviderFactory};
use common::session_descriptor;

enum Command {
    Send(Value),
    Close,
}

struct MockProvider {
    url: String,
    /// Client events as `(connection index, event)`.
    events: mpsc::UnboundedReceiver<(usize, Value)>,
    commands: mpsc::UnboundedSender<Command>,
    authorization: Arc<parking_lot::Mutex<Vec<String>>>,
    beta: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl MockProvider {
    async fn next_event(&mut self) -> (usize, Value) {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("no client event in time")
            .expect("provider stopped")
    }

    fn send(&self, event: Value) {
        self.commands.send(Command::Send(event)).unwrap();
    }

    fn close(&self) {
        self.commands.send(Command::Close).unwrap();
    }
}

/// Accepts connections one at a time; commands go to the current connection.
async fn spawn_provider() -> MockProvider {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/v1/realtime", listener.local_addr().unwrap());

    let (events_tx, events) = mpsc::unbounded_channel();
    let (commands, mut commands_rx) = mpsc::unbounded_channel::<Command>();
    let authorization = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let beta = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let auth_seen = authorization.clone();
    let beta_seen = beta.clone();
    tokio::spawn(async move {
        let mut index = 0usize;
        while let Ok((stream, _)) = listener.accept().await {
            let auth_seen = auth_seen.clone();
            let beta_seen = beta_seen.clone();
            let callback = move |req: &Request, resp: Response| {
                let header = |name: &str| {
                    req.headers()
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string()
                };
                auth_seen.lock().push(header("authorization"));
                beta_seen.lock().push(header("openai-beta"));
                Ok::<Response, ErrorResponse>(resp)
            };
            let Ok(ws) = accept_hdr_async(stream, callback).await else {
                continue;
            };

            let connection = index;
            index += 1;
            let (mut sink, mut source) = ws.split();

            let events_tx = events_tx.clone();
            tokio::spawn(async move {
                while let Some(Ok(msg)) = source.next().await {
                    if let Message::Text(text) = msg
                        && let Ok(value) = serde_json::from_str::<Value>(&text)
                    {
                        let _ = events_tx.send((connection, value));
                    }
                }
            });

            while let Some(command) = commands_rx.recv().await {
                match command {
                    Command::Send(event) => {
                        let _ = sink.send(Message::Text(event.to_string().into())).await;
                    }
                    Command::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    });

    MockProvider {
        url,
        events,
        commands,
        authorization,
        beta,
    }
}

fn realtime_client(url: &str, reconnection: ReconnectionConfig) -> OpenAIRealtime {
    OpenAIRealtime::new(RealtimeConfig {
        token: "ek_test".to_string(),
        url: url.to_string(),
        settings: SessionSettings::default(),
        reconnection,
        token_refresher: None,
    })
    .unwrap()
}

/// Fast single-retry backoff for reconnection tests.
fn quick_reconnect() -> ReconnectionConfig {
    ReconnectionConfig {
        initial_delay: Duration::from_millis(20),
        jitter: false,
        ..ReconnectionConfig::with_max_attempts(1)
    }
}

async fn wait_for_connections(provider: &MockProvider, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while provider.authorization.lock().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("provider did not see the reconnection");
}

#[tokio::test]
async fn test_connect_authenticates_and_configures_session() {
    let mut provider = spawn_provider().await;
    let mut client = realtime_client(&provider.url, ReconnectionConfig::disabled());

    client.connect().await.unwrap();
    assert!(client.is_ready());
    assert_eq!(client.get_connection_state(), ConnectionState::Connected);

    let (connection, update) = provider.next_event().await;
    assert_eq!(connection, 0);
    assert_eq!(update["type"], "session.update");
    assert_eq!(update["session"]["voice"], "alloy");
    assert_eq!(provider.authorization.lock()[0], "Bearer ek_test");
    assert_eq!(provider.beta.lock()[0], "realtime=v1");

    client.disconnect().await.unwrap();
    assert!(!client.is_ready());
}

#[tokio::test]
async fn test_audio_flows_both_ways() {
    let mut provider = spawn_provider().await;
    let mut client = realtime_client(&provider.url, ReconnectionConfig::disabled());

    let (audio_tx, mut audio_rx) = mpsc::unbounded_channel::<RealtimeAudioData>();
    client
        .on_audio(Arc::new(move |audio: RealtimeAudioData| {
            let tx = audio_tx.clone();
            Box::pin(async move {
                let _ = tx.send(audio);
            })
        }))
        .unwrap();

    client.connect().await.unwrap();
    let _ = provider.next_event().await;

    client
        .send_audio(Bytes::from_static(&[5, 0, 6, 0]))
        .await
        .unwrap();
    let (_, append) = provider.next_event().await;
    assert_eq!(append["type"], "input_audio_buffer.append");
    assert_eq!(append["audio"], BASE64.encode([5u8, 0, 6, 0]));

    provider.send(json!({
        "type": "response.audio.delta",
        "response_id": "resp_1",
        "item_id": "item_1",
        "delta": BASE64.encode([1u8, 0, 2, 0])
    }));
    let audio = tokio::time::timeout(Duration::from_secs(5), audio_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(audio.data, Bytes::from_static(&[1, 0, 2, 0]));
    assert_eq!(audio.sample_rate, 24000);
    assert_eq!(audio.response_id.as_deref(), Some("resp_1"));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_provider_error_event_is_not_terminal() {
    let mut provider = spawn_provider().await;
    let mut client = realtime_client(&provider.url, ReconnectionConfig::disabled());

    let (error_tx, mut error_rx) = mpsc::unbounded_channel::<RealtimeError>();
    client
        .on_error(Arc::new(move |e: RealtimeError| {
            let tx = error_tx.clone();
            Box::pin(async move {
                let _ = tx.send(e);
            })
        }))
        .unwrap();

    client.connect().await.unwrap();
    let _ = provider.next_event().await;

    provider.send(json!({
        "type": "error",
        "error": {"type": "invalid_request_error", "message": "Unknown parameter"}
    }));
    let error = tokio::time::timeout(Duration::from_secs(5), error_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(error, RealtimeError::ProviderError(ref m) if m.contains("Unknown parameter")));
    assert!(!error.is_terminal());
    assert!(client.is_ready());

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_lost_socket_without_reconnection_is_terminal() {
    let mut provider = spawn_provider().await;
    let mut client = realtime_client(&provider.url, ReconnectionConfig::disabled());

    let (error_tx, mut error_rx) = mpsc::unbounded_channel::<RealtimeError>();
    client
        .on_error(Arc::new(move |e: RealtimeError| {
            let tx = error_tx.clone();
            Box::pin(async move {
                let _ = tx.send(e);
            })
        }))
        .unwrap();

    client.connect().await.unwrap();
    let _ = provider.next_event().await;
    provider.close();

    let error = tokio::time::timeout(Duration::from_secs(5), error_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(error.is_terminal());
    assert!(!client.is_ready());
    assert!(matches!(
        client.send_audio(Bytes::from_static(&[0, 0])).await,
        Err(RealtimeError::NotConnected)
    ));
}

#[tokio::test]
async fn test_reconnect_replays_session_update() {
    let mut provider = spawn_provider().await;
    let mut client = realtime_client(&provider.url, ReconnectionConfig::with_max_attempts(2));

    let (reconnect_tx, mut reconnect_rx) = mpsc::unbounded_channel::<ReconnectionEvent>();
    client
        .on_reconnection(Arc::new(move |event: ReconnectionEvent| {
            let tx = reconnect_tx.clone();
            Box::pin(async move {
                let _ = tx.send(event);
            })
        }))
        .unwrap();

    client.connect().await.unwrap();
    let (_, first) = provider.next_event().await;
    provider.close();

    let (connection, replayed) = provider.next_event().await;
    assert_eq!(connection, 1);
    assert_eq!(replayed["type"], "session.update");
    assert_eq!(replayed["session"], first["session"]);

    let event = tokio::time::timeout(Duration::from_secs(5), reconnect_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(event.success);
    assert_eq!(event.attempt, 1);
    assert!(client.is_ready());
    assert_eq!(provider.authorization.lock().len(), 2);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_uses_refreshed_token() {
    let mut provider = spawn_provider().await;

    let refreshes = Arc::new(AtomicUsize::new(0));
    let counter = refreshes.clone();
    let refresher: TokenRefresher = Arc::new(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move { Ok::<_, RealtimeError>(format!("ek_fresh_{n}")) })
    });

    let mut client = OpenAIRealtime::new(RealtimeConfig {
        token: "ek_initial".to_string(),
        url: provider.url.clone(),
        settings: SessionSettings::default(),
        reconnection: quick_reconnect(),
        token_refresher: Some(refresher),
    })
    .unwrap();

    client.connect().await.unwrap();
    let _ = provider.next_event().await;
    provider.close();

    let (connection, _) = provider.next_event().await;
    assert_eq!(connection, 1);
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(
        *provider.authorization.lock(),
        vec!["Bearer ek_initial".to_string(), "Bearer ek_fresh_1".to_string()]
    );

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_failed_refresh_spends_the_attempt() {
    let mut provider = spawn_provider().await;

    let refresher: TokenRefresher = Arc::new(|| {
        Box::pin(async {
            Err::<String, _>(RealtimeError::AuthenticationFailed("session expired".to_string()))
        })
    });
    let mut client = OpenAIRealtime::new(RealtimeConfig {
        token: "ek_initial".to_string(),
        url: provider.url.clone(),
        settings: SessionSettings::default(),
        reconnection: quick_reconnect(),
        token_refresher: Some(refresher),
    })
    .unwrap();

    let (error_tx, mut error_rx) = mpsc::unbounded_channel::<RealtimeError>();
    client
        .on_error(Arc::new(move |e: RealtimeError| {
            let tx = error_tx.clone();
            Box::pin(async move {
                let _ = tx.send(e);
            })
        }))
        .unwrap();

    client.connect().await.unwrap();
    let _ = provider.next_event().await;
    provider.close();

    let error = tokio::time::timeout(Duration::from_secs(5), error_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(error.is_terminal());
    // The stale token is never retried.
    assert_eq!(provider.authorization.lock().len(), 1);
}

#[tokio::test]
async fn test_provider_factory_reconnects_with_new_session() {
    let openai_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_descriptor("ek_first")))
        .up_to_n_times(1)
        .mount(&openai_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_descriptor("ek_second")))
        .mount(&openai_server)
        .await;

    let mut provider = spawn_provider().await;
    let factory = OpenAIProviderFactory::new(
        OpenAIClient::new(
            reqwest::Client::new(),
            "sk-test",
            format!("{}/v1", openai_server.uri()),
        ),
        SessionSettings::default(),
        provider.url.clone(),
        quick_reconnect(),
    );

    let mut realtime = factory.create().await.unwrap();
    realtime.connect().await.unwrap();
    let _ = provider.next_event().await;
    provider.close();

    wait_for_connections(&provider, 2).await;
    assert_eq!(
        *provider.authorization.lock(),
        vec!["Bearer ek_first".to_string(), "Bearer ek_second".to_string()]
    );
    assert_eq!(openai_server.received_requests().await.unwrap().len(), 2);

    realtime.disconnect().await.unwrap();
}
