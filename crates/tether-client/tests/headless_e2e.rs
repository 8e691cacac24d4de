//! End-to-end tests: the headless runner against a real tether server.
//!
//! The canned script host cannot run JavaScript, so these tests check what
//! crosses the socket rather than DOM effects:
//!
//! - Scripts queued during the page build arrive after the hello.
//! - Evaluations are answered and resolve on the server.
//! - Listener callbacks sent by the client reach the server's handler.
//! - Clearing `running` stops the runner.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use tether_client::infrastructure::{fetch_client_id, run, CannedScriptHost, RunOutcome};
use tether_client::{ClientConfig, ClientDispatcher};
use tether_core::ClientMessage;
use tether_server::application::Document;
use tether_server::domain::ServerConfig;
use tether_server::infrastructure::{serve, AppState, PageBuilder};

struct Harness {
    state: AppState,
    server_running: Arc<AtomicBool>,
    client_running: Arc<AtomicBool>,
    client_id: String,
    host: Arc<CannedScriptHost>,
    dispatcher: Arc<Mutex<ClientDispatcher>>,
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    runner: JoinHandle<anyhow::Result<RunOutcome>>,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.client_running.store(false, Ordering::Relaxed);
        self.server_running.store(false, Ordering::Relaxed);
    }
}

async fn start(builder: PageBuilder, host: CannedScriptHost) -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let state = AppState::new(ServerConfig::default(), builder);
    let server_running = Arc::new(AtomicBool::new(true));
    tokio::spawn(serve(listener, state.clone(), Arc::clone(&server_running)));

    let client_id = fetch_client_id(addr).await.unwrap();
    let host = Arc::new(host);
    let dispatcher = Arc::new(Mutex::new(ClientDispatcher::new(
        client_id.clone(),
        Arc::clone(&host) as Arc<dyn tether_client::ScriptHost>,
    )));
    let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
    let client_running = Arc::new(AtomicBool::new(true));
    let config = ClientConfig {
        server_addr: addr,
        client_id: Some(client_id.clone()),
        ..ClientConfig::default()
    };
    let runner = tokio::spawn(run(
        config,
        Arc::clone(&dispatcher),
        outgoing_rx,
        Arc::clone(&client_running),
    ));

    Harness {
        state,
        server_running,
        client_running,
        client_id,
        host,
        dispatcher,
        outgoing,
        runner,
    }
}

/// Polls until `check` holds, for up to five seconds.
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met within 5s");
}

#[tokio::test]
async fn test_build_scripts_arrive_after_hello() {
    // Arrange
    let builder: PageBuilder = Arc::new(|doc: &Document| doc.execute("console.log('built');"));

    // Act
    let harness = start(builder, CannedScriptHost::new()).await;

    // Assert
    let host = Arc::clone(&harness.host);
    eventually(|| host.recorded().iter().any(|js| js == "console.log('built');")).await;
    let session = harness.state.store.get(&harness.client_id).unwrap();
    assert_eq!(session.attachments(), 1);
}

#[tokio::test]
async fn test_evaluate_is_answered_by_host() {
    // Arrange
    let harness = start(
        Arc::new(|_: &Document| {}),
        CannedScriptHost::new().answer("2+2", json!(4)),
    )
    .await;
    let state = harness.state.clone();
    let client_id = harness.client_id.clone();
    eventually(|| {
        state
            .store
            .get(&client_id)
            .map(|s| s.attachments() == 1)
            .unwrap_or(false)
    })
    .await;
    let session = harness.state.store.get(&harness.client_id).unwrap();

    // Act
    let pending = session.evaluate("2+2").unwrap();

    // Assert
    let value = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap();
    assert_eq!(value, Ok(json!(4)));
}

#[tokio::test]
async fn test_listener_callback_reaches_server_handler() {
    // Arrange: the page registers a click listener and publishes its id
    let listener_id = Arc::new(StdMutex::new(None));
    let seen = Arc::new(StdMutex::new(Vec::<Value>::new()));
    let builder: PageBuilder = {
        let listener_id = Arc::clone(&listener_id);
        let seen = Arc::clone(&seen);
        Arc::new(move |doc: &Document| {
            let sink = Arc::clone(&seen);
            let id = doc
                .body()
                .on("click", &["type"], None, move |v| sink.lock().unwrap().push(v));
            *listener_id.lock().unwrap() = Some(id);
        })
    };
    let harness = start(builder, CannedScriptHost::new()).await;
    let host = Arc::clone(&harness.host);
    eventually(|| !host.recorded().is_empty()).await;
    let id = listener_id.lock().unwrap().unwrap();

    // Act
    let callback = harness
        .dispatcher
        .lock()
        .await
        .callback_ws(id, &json!({"type": "click"}));
    harness.outgoing.send(callback).unwrap();

    // Assert
    let seen_clone = Arc::clone(&seen);
    eventually(|| !seen_clone.lock().unwrap().is_empty()).await;
    assert_eq!(seen.lock().unwrap()[0], json!({"type": "click"}));
}

#[tokio::test]
async fn test_clearing_running_stops_runner() {
    let mut harness = start(Arc::new(|_: &Document| {}), CannedScriptHost::new()).await;
    let state = harness.state.clone();
    let client_id = harness.client_id.clone();
    eventually(|| state.store.get(&client_id).is_some_and(|s| s.attachments() == 1)).await;

    harness.client_running.store(false, Ordering::Relaxed);
    let outcome = tokio::time::timeout(Duration::from_secs(5), &mut harness.runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(outcome, RunOutcome::Stopped);
}
