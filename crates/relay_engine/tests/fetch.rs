mod common;

use std::sync::Mutex;
use std::time::Duration;

use common::{init_logging, RecordingObserver};
use relay_engine::{FetchError, FetchSettings, Fetcher, ReqwestFetcher, TransferObserver};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn small_chunks() -> FetchSettings {
    FetchSettings {
        chunk_size: 1024,
        ..FetchSettings::default()
    }
}

#[tokio::test]
async fn streams_body_to_file_and_reports_progress() {
    init_logging();
    let server = MockServer::start().await;
    let body = vec![7u8; 5000];
    Mock::given(method("GET"))
        .and(path("/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.clone(), "video/mp4"))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("clip.mp4");
    let fetcher = ReqwestFetcher::new(small_chunks());
    let observer = RecordingObserver::default();
    let url = format!("{}/clip.mp4", server.uri());

    let fetched = fetcher
        .fetch_to_file(&url, &dest, &CancellationToken::new(), &observer)
        .await
        .expect("fetch ok");

    assert_eq!(fetched.bytes, 5000);
    assert_eq!(fetched.content_type.as_deref(), Some("video/mp4"));
    assert_eq!(std::fs::read(&dest).unwrap(), body);

    let progress = observer.progress.lock().unwrap().clone();
    assert_eq!(progress.first(), Some(&(0, Some(5000))));
    assert_eq!(progress.last(), Some(&(5000, Some(5000))));
    // Four full 1 KiB writes plus the remainder.
    assert_eq!(progress.len(), 6);
}

#[tokio::test]
async fn http_error_status_is_reported() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("missing.mp4");
    let fetcher = ReqwestFetcher::new(small_chunks());
    let url = format!("{}/missing.mp4", server.uri());

    let err = fetcher
        .fetch_to_file(&url, &dest, &CancellationToken::new(), &RecordingObserver::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::HttpStatus(404)));
    assert!(!dest.exists());
}

/// Cancels the token as soon as the transfer starts.
struct CancelOnFirstProgress {
    token: CancellationToken,
    calls: Mutex<usize>,
}

impl TransferObserver for CancelOnFirstProgress {
    fn on_progress(&self, _transferred: u64, _total: Option<u64>) {
        *self.calls.lock().unwrap() += 1;
        self.token.cancel();
    }
}

#[tokio::test]
async fn cancellation_mid_transfer_removes_partial_file() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8; 256 * 1024], "video/mp4"))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("big.mp4");
    let fetcher = ReqwestFetcher::new(small_chunks());
    let token = CancellationToken::new();
    let observer = CancelOnFirstProgress {
        token: token.clone(),
        calls: Mutex::new(0),
    };
    let url = format!("{}/big.mp4", server.uri());

    let err = fetcher
        .fetch_to_file(&url, &dest, &token, &observer)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Cancelled));
    assert!(!dest.exists());
    assert_eq!(*observer.calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn already_cancelled_token_skips_request() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("never.mp4");
    let token = CancellationToken::new();
    token.cancel();

    let err = ReqwestFetcher::new(small_chunks())
        .fetch_to_file(
            "http://127.0.0.1:9/never.mp4",
            &dest,
            &token,
            &RecordingObserver::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Cancelled));
    assert!(!dest.exists());
}

#[tokio::test]
async fn slow_response_times_out() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_string("slow"),
        )
        .mount(&server)
        .await;

    let settings = FetchSettings {
        total_timeout: Some(Duration::from_millis(50)),
        ..small_chunks()
    };
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("slow.mp4");
    let url = format!("{}/slow.mp4", server.uri());

    let err = ReqwestFetcher::new(settings)
        .fetch_to_file(&url, &dest, &CancellationToken::new(), &RecordingObserver::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Timeout(_)));
}
