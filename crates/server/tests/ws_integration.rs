//! WebSocket integration tests.
//!
//! Runs the router on an ephemeral port with a shell script as the detector
//! and a mock transcoder, and talks to it with a real WebSocket client.
#![cfg(unix)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use vidscope_core::{
    config::Isolation,
    testing::{fixtures, MockTranscoder, MOCK_OUTPUT},
    JobStage, ServerMessage, SessionContext,
};
use vidscope_server::{api::create_router, state::AppState};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DETECT_OK: &str = r#"
echo "video 1/1 (frame 1/3) 384x640 1 person"
echo "WARNING model is old"
echo "video 1/1 (frame 2/3) 384x640 1 person" >&2
mkdir -p "$2"
touch "$2/out.avi"
echo "video 1/1 (frame 3/3) 384x640 1 person"
"#;

struct TestServer {
    addr: SocketAddr,
    transcoder: Arc<MockTranscoder>,
    temp_dir: TempDir,
}

impl TestServer {
    async fn start(script_body: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let script = fixtures::write_script(temp_dir.path(), "detect.sh", script_body)
            .expect("Failed to write script");
        let config = fixtures::script_config(temp_dir.path(), &script, Isolation::Shared);
        std::fs::create_dir_all(&config.analysis.output_root).unwrap();
        std::fs::create_dir_all(&config.storage.static_dir).unwrap();

        let transcoder = Arc::new(MockTranscoder::new());
        let sessions = Arc::new(SessionContext::from_config(&config, transcoder.clone()));
        let app = create_router(Arc::new(AppState::new(config, sessions)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            transcoder,
            temp_dir,
        }
    }

    fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    async fn connect(&self, path: &str) -> Client {
        let (client, _) = connect_async(format!("ws://{}{}", self.addr, path))
            .await
            .expect("Failed to connect");
        client
    }
}

async fn send_json(client: &mut Client, json: &str) {
    client.send(Message::text(json.to_string())).await.unwrap();
}

/// Next server message, skipping control frames.
async fn next_message(client: &mut Client) -> Option<ServerMessage> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(10), client.next())
            .await
            .expect("timed out waiting for server message")?
            .ok()?;
        match frame {
            Message::Text(text) => {
                return Some(serde_json::from_str(text.as_str()).expect("invalid server message"))
            }
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

/// Messages up to and including the first result or failure.
async fn one_cycle(client: &mut Client) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Some(message) = next_message(client).await {
        let last = matches!(message, ServerMessage::Result { .. } | ServerMessage::Failure { .. });
        out.push(message);
        if last {
            break;
        }
    }
    out
}

#[tokio::test]
async fn test_detect_streams_progress_and_result() {
    let server = TestServer::start(DETECT_OK).await;
    let mut client = server.connect("/detect").await;

    send_json(&mut client, r#"{"source_locator":"http://example/video"}"#).await;
    let messages = one_cycle(&mut client).await;

    assert_eq!(messages.len(), 5);
    assert!(messages[..3]
        .iter()
        .all(|m| matches!(m, ServerMessage::Progress { line } if line.starts_with("video 1/1"))));
    assert_eq!(messages[3], ServerMessage::Completed);
    assert_eq!(
        messages[4],
        ServerMessage::Result {
            video_url: "/static/output.mp4".to_string()
        }
    );

    // The reference resolves to the transcoded file.
    let body = reqwest::get(format!("http://{}/static/output.mp4", server.addr))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(&body[..], MOCK_OUTPUT);

    let transcodes = server.transcoder.recorded_transcodes().await;
    assert_eq!(
        transcodes[0].job.input_path,
        server.root().join("runs/predict/out.avi")
    );
}

#[tokio::test]
async fn test_predict_query_url_starts_job() {
    let server = TestServer::start(DETECT_OK).await;
    let mut client = server.connect("/predict?url=http%3A%2F%2Fexample%2Fvideo").await;

    let messages = one_cycle(&mut client).await;
    assert!(matches!(messages.last(), Some(ServerMessage::Result { .. })));
}

#[tokio::test]
async fn test_legacy_message_field_is_accepted() {
    let server = TestServer::start(DETECT_OK).await;
    let mut client = server.connect("/detect").await;

    send_json(&mut client, r#"{"message":"http://example/video"}"#).await;
    let messages = one_cycle(&mut client).await;
    assert!(matches!(messages.last(), Some(ServerMessage::Result { .. })));
}

#[tokio::test]
async fn test_malformed_and_blank_requests_keep_connection_open() {
    let server = TestServer::start(DETECT_OK).await;
    let mut client = server.connect("/detect").await;

    send_json(&mut client, "this is not json").await;
    send_json(&mut client, r#"{"source_locator":"   "}"#).await;
    send_json(&mut client, r#"{}"#).await;
    send_json(&mut client, r#"{"source_locator":"http://example/video"}"#).await;

    let messages = one_cycle(&mut client).await;
    assert_eq!(messages.len(), 5);
    assert_eq!(server.transcoder.transcode_count().await, 1);
}

#[tokio::test]
async fn test_analysis_failure_is_reported_and_session_survives() {
    let server = TestServer::start("echo 'downloading source'\nexit 1\n").await;
    let mut client = server.connect("/detect").await;

    send_json(&mut client, r#"{"source_locator":"http://example/video"}"#).await;
    let messages = one_cycle(&mut client).await;
    assert_eq!(
        messages[0],
        ServerMessage::Progress {
            line: "downloading source".to_string()
        }
    );
    assert!(matches!(
        messages[1],
        ServerMessage::Failure {
            stage: JobStage::Analysis,
            ..
        }
    ));

    // Same connection, another request.
    send_json(&mut client, r#"{"source_locator":"http://example/again"}"#).await;
    let again = one_cycle(&mut client).await;
    assert_eq!(again.len(), 2);
    assert_eq!(server.transcoder.transcode_count().await, 0);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_client_close_terminates_analysis() {
    let script = "echo $$ > \"$(dirname \"$2\")/../pid\"\necho started\nexec sleep 30\n";
    let server = TestServer::start(script).await;
    let mut client = server.connect("/detect").await;

    send_json(&mut client, r#"{"source_locator":"http://example/video"}"#).await;
    let first = next_message(&mut client).await;
    assert_eq!(
        first,
        Some(ServerMessage::Progress {
            line: "started".to_string()
        })
    );

    let pid = std::fs::read_to_string(server.root().join("pid")).unwrap();
    let proc_entry = std::path::PathBuf::from(format!("/proc/{}", pid.trim()));
    assert!(proc_entry.exists());

    client.close(None).await.unwrap();

    let mut gone = false;
    for _ in 0..100 {
        if !proc_entry.exists() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(gone, "analysis process outlived its session");
}
