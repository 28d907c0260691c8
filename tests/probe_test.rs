use enhance_settings::ai::probe::{ConnectivityProbe, ProbeClassification, REACHABLE_MESSAGE};
use enhance_settings::store::FileSettingsBackend;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Serve one canned HTTP response on a local port
async fn serve_once(status: &'static str, body: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request(&mut stream).await;
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
    });
    port
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&raw);
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if raw.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}

async fn probe() -> (tempfile::TempDir, ConnectivityProbe) {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileSettingsBackend::open(
        dir.path().join("ai_settings.toml"),
        "openai",
        Duration::from_secs(2),
    )
    .await
    .unwrap();
    (dir, ConnectivityProbe::new(Arc::new(backend)))
}

#[tokio::test]
async fn test_probe_reachable() {
    let port = serve_once(
        "200 OK",
        r#"{"choices":[{"message":{"role":"assistant","content":"p"}}]}"#,
    )
    .await;
    let (_dir, probe) = probe().await;

    let result = probe
        .test(&format!("http://127.0.0.1:{}", port), "qwen2.5:3b", true)
        .await;

    assert!(result.ok);
    assert_eq!(result.classification, ProbeClassification::Reachable);
    assert_eq!(result.message, REACHABLE_MESSAGE);
}

#[tokio::test]
async fn test_probe_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let (_dir, probe) = probe().await;

    let result = probe
        .test(&format!("http://127.0.0.1:{}", port), "qwen2.5:3b", true)
        .await;

    assert!(!result.ok);
    assert_eq!(result.classification, ProbeClassification::ConnectionRefused);
    assert!(result.message.contains("ollama serve"));
}

#[tokio::test]
async fn test_probe_missing_model() {
    let port = serve_once(
        "404 Not Found",
        r#"{"error":{"message":"model \"llama3\" not found, try pulling it first"}}"#,
    )
    .await;
    let (_dir, probe) = probe().await;

    let result = probe
        .test(&format!("http://127.0.0.1:{}", port), "llama3", true)
        .await;

    assert_eq!(result.classification, ProbeClassification::ModelNotFound);
    assert_eq!(
        result.message,
        "Model \"llama3\" not found. Run: ollama pull llama3"
    );
}

#[tokio::test]
async fn test_probe_other_error_keeps_raw_text() {
    let port = serve_once("500 Internal Server Error", "out of memory").await;
    let (_dir, probe) = probe().await;

    let result = probe
        .test(&format!("http://127.0.0.1:{}", port), "llama3", true)
        .await;

    assert_eq!(result.classification, ProbeClassification::Other);
    assert_eq!(
        result.message,
        "API error (500 Internal Server Error): out of memory"
    );
}
