//! Integration tests for full relay runs against mock HTTP servers.

mod support;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use video_relay::{DirectoryTransport, FailureCategory, FailureReason, Relay, RelayState, Request};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{RecordingTransport, leftover_entries, missing_tools, test_config};

async fn serve(path_str: &str, status: u16, body: &[u8]) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(path_str))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(body.to_vec()))
        .mount(&mock_server)
        .await;
    mock_server
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_direct_video_url_goes_straight_to_minimal_fetch() {
    let body = b"small clip bytes".to_vec();
    let server = serve("/clip.mp4", 200, &body).await;
    let temp = TempDir::new().expect("temp dir");
    let config = test_config(temp.path(), missing_tools(temp.path()));
    let relay = Relay::new(Arc::new(config));
    let transport = RecordingTransport::new();

    let request = Request::new(format!("{}/clip.mp4", server.uri()), "alice");
    let report = relay.run(&request, &transport).await;

    assert_eq!(report.state, RelayState::Completed, "{:?}", report.error);
    assert_eq!(
        report.transitions,
        vec![
            RelayState::Received,
            RelayState::Classifying,
            RelayState::Acquiring,
            RelayState::Preparing,
            RelayState::Delivering,
            RelayState::Completed,
        ]
    );
    let strategies: Vec<&str> = report.attempts.iter().map(|a| a.strategy.as_str()).collect();
    assert_eq!(strategies, vec!["direct"]);
    assert_eq!(report.parts_total, 1);
    assert_eq!(report.parts_sent, 1);

    let parts = transport.parts();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].file_name, "clip.mp4");
    assert_eq!(parts[0].bytes, body);
    assert!(parts[0].caption.contains("From: alice"));
    assert!(parts[0].caption.contains("Source: "));

    assert!(leftover_entries(temp.path()).is_empty(), "workspace not removed");
}

#[tokio::test]
async fn test_status_updates_follow_the_run() {
    let server = serve("/a.webm", 200, b"webm").await;
    let temp = TempDir::new().expect("temp dir");
    let relay = Relay::new(Arc::new(test_config(temp.path(), missing_tools(temp.path()))));
    let transport = RecordingTransport::new();

    let report = relay
        .handle_message(&format!("please get {}/a.webm", server.uri()), "bob", &transport)
        .await;
    assert!(report.is_success());

    let statuses = transport.statuses();
    assert!(statuses[0].contains("Analyzing URL"));
    assert!(statuses[1].contains("Downloading a.webm"));
    assert!(statuses[1].contains("Direct Download"));
    assert!(statuses.iter().any(|s| s.contains("Sending a.webm")));
    assert!(statuses.last().expect("final status").contains("Download completed!"));
}

#[tokio::test]
async fn test_oversized_file_is_delivered_in_ordered_parts() {
    let body = patterned(2_500);
    let server = serve("/big.mp4", 200, &body).await;
    let temp = TempDir::new().expect("temp dir");
    let config = video_relay::RelayConfig::builder()
        .temp_root(temp.path())
        .max_file_size(1_000)
        .split_chunk_size(400)
        .part_send_delay(std::time::Duration::ZERO)
        .tools(missing_tools(temp.path()))
        .build()
        .expect("config");
    let relay = Relay::new(Arc::new(config));
    let transport = RecordingTransport::new();

    let request = Request::new(format!("{}/big.mp4", server.uri()), "carol");
    let report = relay.run(&request, &transport).await;

    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(report.parts_total, 7);
    assert_eq!(report.parts_sent, 7);

    let parts = transport.parts();
    let indices: Vec<usize> = parts.iter().map(|p| p.index).collect();
    assert_eq!(indices, (1..=7).collect::<Vec<_>>());
    assert!(parts[..6].iter().all(|p| p.bytes.len() == 400));
    assert_eq!(parts[6].bytes.len(), 100);
    assert_eq!(parts[0].file_name, "big_part001.mp4");
    assert!(parts[2].caption.starts_with("📹 big.mp4 (Part 3/7)"));
    assert!(parts[2].caption.contains("Original: "));
    assert_eq!(transport.reassembled(), body);

    assert!(
        transport
            .statuses()
            .iter()
            .any(|s| s.contains("Splitting into 7 parts"))
    );
    assert!(leftover_entries(temp.path()).is_empty());
}

#[tokio::test]
async fn test_forbidden_everywhere_ends_in_exhaustion_and_cleanup() {
    let server = serve("/watch.mp4", 403, b"Forbidden").await;
    let temp = TempDir::new().expect("temp dir");
    let relay = Relay::new(Arc::new(test_config(temp.path(), missing_tools(temp.path()))));
    let transport = RecordingTransport::new();

    let request = Request::new(format!("{}/watch.mp4", server.uri()), "dave");
    let report = relay.run(&request, &transport).await;

    assert_eq!(
        report.state,
        RelayState::Failed(FailureReason::AcquisitionExhausted)
    );
    assert_eq!(report.failure, Some(FailureCategory::PlatformBlocked));
    assert!(report.attempts.iter().all(|a| a.outcome == "failed"));
    assert!(transport.parts().is_empty());
    assert!(
        transport
            .statuses()
            .last()
            .expect("final status")
            .contains("Platform access denied")
    );

    let workspace = report.workspace.expect("workspace was opened");
    assert!(!workspace.exists(), "workspace should be destroyed");
    assert!(leftover_entries(temp.path()).is_empty());
}

#[tokio::test]
async fn test_not_found_is_reported_as_generic_failure() {
    let server = serve("/gone.mp4", 404, b"").await;
    let temp = TempDir::new().expect("temp dir");
    let relay = Relay::new(Arc::new(test_config(temp.path(), missing_tools(temp.path()))));
    let transport = RecordingTransport::new();

    let request = Request::new(format!("{}/gone.mp4", server.uri()), "erin");
    let report = relay.run(&request, &transport).await;

    assert_eq!(report.failure, Some(FailureCategory::Generic));
    assert!(report.error.expect("error").contains("acquisition strategies failed"));
}

#[tokio::test]
async fn test_transport_rejection_stops_remaining_parts() {
    let body = patterned(2_000);
    let server = serve("/long.mkv", 200, &body).await;
    let temp = TempDir::new().expect("temp dir");
    let config = video_relay::RelayConfig::builder()
        .temp_root(temp.path())
        .max_file_size(500)
        .split_chunk_size(500)
        .part_send_delay(std::time::Duration::ZERO)
        .tools(missing_tools(temp.path()))
        .build()
        .expect("config");
    let relay = Relay::new(Arc::new(config));
    let transport = RecordingTransport::rejecting(2);

    let request = Request::new(format!("{}/long.mkv", server.uri()), "frank");
    let report = relay.run(&request, &transport).await;

    assert_eq!(report.state, RelayState::Failed(FailureReason::TransportError));
    assert_eq!(report.failure, Some(FailureCategory::Delivery));
    assert_eq!(report.parts_total, 4);
    assert_eq!(report.parts_sent, 1);
    assert_eq!(transport.parts().len(), 1);
    assert!(leftover_entries(temp.path()).is_empty());
}

#[tokio::test]
async fn test_message_without_url_is_rejected_without_workspace() {
    let temp = TempDir::new().expect("temp dir");
    let relay = Relay::new(Arc::new(test_config(temp.path(), missing_tools(temp.path()))));
    let transport = RecordingTransport::new();

    let report = relay.handle_message("hello bot", "gina", &transport).await;

    assert_eq!(report.state, RelayState::Failed(FailureReason::InvalidRequest));
    assert_eq!(report.failure, Some(FailureCategory::InvalidInput));
    assert!(report.workspace.is_none());
    assert!(transport.statuses()[0].contains("Invalid URL"));
    assert!(leftover_entries(temp.path()).is_empty());
}

#[tokio::test]
async fn test_concurrent_runs_use_separate_workspaces() {
    let server = MockServer::start().await;
    for name in ["/one.mp4", "/two.mp4", "/three.mp4"] {
        Mock::given(method("GET"))
            .and(path(name))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(name.as_bytes().to_vec()))
            .mount(&server)
            .await;
    }
    let temp = TempDir::new().expect("temp dir");
    let relay = Relay::new(Arc::new(test_config(temp.path(), missing_tools(temp.path()))));
    let transports = [
        RecordingTransport::new(),
        RecordingTransport::new(),
        RecordingTransport::new(),
    ];
    let requests: Vec<Request> = ["one", "two", "three"]
        .iter()
        .map(|n| Request::new(format!("{}/{n}.mp4", server.uri()), "hal"))
        .collect();

    let (a, b, c) = tokio::join!(
        relay.run(&requests[0], &transports[0]),
        relay.run(&requests[1], &transports[1]),
        relay.run(&requests[2], &transports[2]),
    );

    let workspaces = [&a, &b, &c].map(|r| r.workspace.clone().expect("workspace"));
    assert_ne!(workspaces[0], workspaces[1]);
    assert_ne!(workspaces[1], workspaces[2]);
    assert!(a.is_success() && b.is_success() && c.is_success());
    assert_eq!(transports[1].reassembled(), b"/two.mp4");
    assert!(leftover_entries(temp.path()).is_empty());
}

#[tokio::test]
async fn test_youtube_chain_falls_through_to_both_fetches_when_tools_are_missing() {
    let server = serve("/watch", 403, b"Forbidden").await;
    let temp = TempDir::new().expect("temp dir");
    let config = test_config(temp.path(), missing_tools(temp.path()));
    let chain = video_relay::build_default_chain(&config);
    let mut workspace = video_relay::Workspace::open(temp.path()).await.expect("workspace");

    let err = chain
        .acquire(
            &format!("{}/watch", server.uri()),
            video_relay::Platform::Youtube,
            &workspace,
        )
        .await
        .expect_err("every strategy should fail");

    let outcomes: Vec<(&str, &str)> = err
        .attempts()
        .iter()
        .map(|a| (a.strategy.as_str(), a.outcome.label()))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("yt-dlp", "skipped"),
            ("youtube-dl", "skipped"),
            ("direct-browser", "failed"),
            ("direct", "failed"),
        ]
    );
    assert_eq!(
        video_relay::failure::categorize_attempts(err.attempts()),
        FailureCategory::PlatformBlocked
    );

    workspace.destroy().await;
    workspace.destroy().await;
    assert!(leftover_entries(temp.path()).is_empty());
}

#[tokio::test]
async fn test_same_named_videos_from_separate_runs_both_survive_delivery() {
    let first = serve("/clip.mp4", 200, b"FIRST VIDEO").await;
    let second = serve("/clip.mp4", 200, b"SECOND").await;
    let temp = TempDir::new().expect("temp dir");
    let out = TempDir::new().expect("output dir");
    let relay = Relay::new(Arc::new(test_config(temp.path(), missing_tools(temp.path()))));
    let transport = DirectoryTransport::new(out.path());

    let a = relay
        .run(&Request::new(format!("{}/clip.mp4", first.uri()), "ann"), &transport)
        .await;
    let b = relay
        .run(&Request::new(format!("{}/clip.mp4", second.uri()), "ben"), &transport)
        .await;
    assert!(a.is_success() && b.is_success());

    let mut delivered: Vec<Vec<u8>> = ["clip.mp4", "clip_1.mp4"]
        .iter()
        .map(|name| std::fs::read(out.path().join(name)).expect("delivered file"))
        .collect();
    delivered.sort();
    assert_eq!(delivered, vec![b"FIRST VIDEO".to_vec(), b"SECOND".to_vec()]);

    let first_caption =
        std::fs::read_to_string(out.path().join("clip.mp4.txt")).expect("first caption");
    let second_caption =
        std::fs::read_to_string(out.path().join("clip_1.mp4.txt")).expect("second caption");
    assert!(first_caption.contains("From: ann"), "{first_caption}");
    assert!(second_caption.contains("From: ben"), "{second_caption}");
}

#[tokio::test]
async fn test_dropping_a_run_mid_acquisition_removes_its_workspace() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;
    let temp = TempDir::new().expect("temp dir");
    let relay = Relay::new(Arc::new(test_config(temp.path(), missing_tools(temp.path()))));
    let transport = RecordingTransport::new();
    let request = Request::new(format!("{}/slow.mp4", server.uri()), "ivy");

    let mut run = Box::pin(relay.run(&request, &transport));
    tokio::select! {
        report = &mut run => panic!("run finished early: {:?}", report.state),
        () = tokio::time::sleep(Duration::from_millis(500)) => {}
    }
    assert_eq!(leftover_entries(temp.path()).len(), 1, "workspace should exist mid-run");
    assert!(transport.statuses().iter().any(|s| s.contains("Downloading slow.mp4")));

    drop(run);

    assert!(leftover_entries(temp.path()).is_empty(), "cancelled run left its workspace");
    assert!(transport.parts().is_empty());
}
