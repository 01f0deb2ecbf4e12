// XADC - HTTP delivery tests
//
// Real reqwest transport against an in-process axum collector.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use xadc::{
    BoundedBatchQueue, Credentials, DeliveryError, EgressSender, HttpTransport, SenderConfig,
    SimulatedMemory, TickOutcome, Transport, DEFAULT_MEMORY_CEILING,
};

#[derive(Default)]
struct Collector {
    bodies: Mutex<Vec<String>>,
    auth: Mutex<Vec<Option<String>>>,
    status: Mutex<Option<(StatusCode, String)>>,
}

async fn write_handler(
    State(collector): State<Arc<Collector>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    collector.auth.lock().unwrap().push(
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
    if let Some(reply) = collector.status.lock().unwrap().clone() {
        return reply;
    }
    collector.bodies.lock().unwrap().push(body);
    (StatusCode::NO_CONTENT, String::new())
}

async fn start_collector() -> (String, Arc<Collector>) {
    let collector = Arc::new(Collector::default());
    let app = Router::new()
        .route("/write", post(write_handler))
        .with_state(Arc::clone(&collector));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/write", addr), collector)
}

fn queue_with(lines: usize) -> Arc<BoundedBatchQueue> {
    let queue = Arc::new(BoundedBatchQueue::new(
        "collector",
        Arc::new(SimulatedMemory::new(0)),
        DEFAULT_MEMORY_CEILING,
    ));
    for i in 1..=lines {
        queue.offer(format!("xadc_host,host=h,type=temp value={}", i));
    }
    queue
}

#[tokio::test]
async fn test_post_with_basic_auth() {
    let (url, collector) = start_collector().await;
    let creds = Credentials::from_parts(Some("xadc"), Some("secret"));
    let transport = HttpTransport::new(url, creds, Duration::from_secs(5)).unwrap();

    transport
        .deliver("a\nb".to_string())
        .await
        .unwrap();

    assert_eq!(collector.bodies.lock().unwrap().clone(), vec!["a\nb"]);
    assert_eq!(
        collector.auth.lock().unwrap()[0].as_deref(),
        Some("Basic eGFkYzpzZWNyZXQ=")
    );
}

#[tokio::test]
async fn test_no_credentials_no_header() {
    let (url, collector) = start_collector().await;
    let transport = HttpTransport::new(url, None, Duration::from_secs(5)).unwrap();

    transport.deliver("a".to_string()).await.unwrap();
    assert_eq!(collector.auth.lock().unwrap()[0], None);
}

#[tokio::test]
async fn test_bad_request_body_reported() {
    let (url, collector) = start_collector().await;
    *collector.status.lock().unwrap() = Some((StatusCode::BAD_REQUEST, "bad line".to_string()));
    let transport = HttpTransport::new(url, None, Duration::from_secs(5)).unwrap();

    let err = transport.deliver("a".to_string()).await.unwrap_err();
    assert_eq!(
        err,
        DeliveryError::Rejected {
            status: 400,
            body: "bad line".to_string()
        }
    );
}

#[tokio::test]
async fn test_sender_end_to_end() {
    let (url, collector) = start_collector().await;
    let queue = queue_with(150);
    let transport = HttpTransport::new(url, None, Duration::from_secs(5)).unwrap();
    let sender = EgressSender::new(SenderConfig::default(), Arc::clone(&queue), transport);

    assert_eq!(sender.tick().await, TickOutcome::Delivered(100));
    assert_eq!(queue.len(), 50);

    let bodies = collector.bodies.lock().unwrap().clone();
    let lines: Vec<&str> = bodies[0].split('\n').collect();
    assert_eq!(lines.len(), 100);
    assert_eq!(lines[0], "xadc_host,host=h,type=temp value=1");
    assert_eq!(lines[99], "xadc_host,host=h,type=temp value=100");
}

#[tokio::test]
async fn test_sender_keeps_batch_on_server_error() {
    let (url, collector) = start_collector().await;
    *collector.status.lock().unwrap() =
        Some((StatusCode::SERVICE_UNAVAILABLE, "overloaded".to_string()));
    let queue = queue_with(100);
    let transport = HttpTransport::new(url, None, Duration::from_secs(5)).unwrap();
    let sender = EgressSender::new(SenderConfig::default(), Arc::clone(&queue), transport);

    assert!(matches!(sender.tick().await, TickOutcome::Retained(_)));
    assert_eq!(queue.len(), 100);
    assert!(queue.health().delivery.is_degraded());

    // Collector recovers
    *collector.status.lock().unwrap() = None;
    assert_eq!(sender.tick().await, TickOutcome::Delivered(100));
    assert!(queue.is_empty());
    assert!(queue.health().is_healthy());
}

#[tokio::test]
async fn test_one_dead_destination_does_not_stall_another() {
    let (url, collector) = start_collector().await;
    let healthy = queue_with(100);
    let dead = queue_with(100);

    let good = EgressSender::new(
        SenderConfig::default(),
        Arc::clone(&healthy),
        HttpTransport::new(url, None, Duration::from_secs(5)).unwrap(),
    );
    let bad = EgressSender::new(
        SenderConfig::default(),
        Arc::clone(&dead),
        HttpTransport::new("http://127.0.0.1:9/write", None, Duration::from_secs(2)).unwrap(),
    );

    let (good_outcome, bad_outcome) = tokio::join!(good.tick(), bad.tick());
    assert_eq!(good_outcome, TickOutcome::Delivered(100));
    assert!(matches!(bad_outcome, TickOutcome::Retained(DeliveryError::Transport(_))));

    assert!(healthy.is_empty());
    assert_eq!(dead.len(), 100);
    assert_eq!(collector.bodies.lock().unwrap().len(), 1);
}
