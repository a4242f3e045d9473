// ABOUTME: End-to-end viewer scenarios driven through the public API with an in-memory source
//
// Covers the container/filter flow, stale-line protection when the tuple changes,
// and several viewers sharing one upstream connection.

use pipelog::config::ViewerConfig;
use pipelog::models::{DisplayLine, StepTarget};
use pipelog::source::{ManualLogSource, SourceError};
use pipelog::stream::{MulticastHub, HIGHLIGHT_END, HIGHLIGHT_START};
use pipelog::viewer::{SessionState, ViewerController, ViewerError, ViewerUpdate};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::advance;

fn target() -> StepTarget {
    StepTarget::new("argo", "build-42", "compile")
}

fn setup() -> (ManualLogSource, MulticastHub) {
    let source = ManualLogSource::new();
    let hub = MulticastHub::new(Arc::new(source.clone()), None);
    (source, hub)
}

fn texts(controller: &ViewerController) -> Vec<String> {
    controller.lines().iter().map(|line| line.text.clone()).collect()
}

fn marked(s: &str) -> String {
    format!("{HIGHLIGHT_START}{s}{HIGHLIGHT_END}")
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Drain updates until the controller has nothing left to wait for
async fn drain(controller: &mut ViewerController) -> Vec<ViewerUpdate> {
    let mut updates = Vec::new();
    while let Some(update) = controller.next_update().await {
        updates.push(update);
    }
    updates
}

#[tokio::test(start_paused = true)]
async fn test_select_type_and_wait_highlights_matches() {
    let (source, hub) = setup();
    let mut controller = ViewerController::new(target(), ViewerConfig::default(), hub);

    controller.select_container("main").unwrap();
    for text in ["e", "er", "err"] {
        controller.set_raw_filter(text);
        advance(Duration::from_millis(200)).await;
    }

    assert_eq!(
        controller.next_update().await,
        Some(ViewerUpdate::FilterCommitted {
            term: "err".to_string()
        })
    );

    let err_sessions: Vec<_> = source
        .opened_tuples()
        .into_iter()
        .filter(|tuple| tuple.filter_term() == "err")
        .collect();
    assert_eq!(err_sessions.len(), 1);
    assert_eq!(err_sessions[0].container(), "main");
    assert_eq!(err_sessions[0].tail_lines(), 50);

    let feed = source.latest_feed().unwrap();
    feed.push("ok");
    feed.push("error: disk");
    feed.push("errno=5");
    for _ in 0..3 {
        assert!(matches!(
            controller.next_update().await,
            Some(ViewerUpdate::Line(_))
        ));
    }

    assert_eq!(
        texts(&controller),
        vec![
            "ok".to_string(),
            format!("{}or: disk", marked("err")),
            format!("{}no=5", marked("err")),
        ]
    );
    assert!(matches!(
        controller.state(),
        SessionState::Streaming { caught_up: false, .. }
    ));
}

#[tokio::test]
async fn test_switching_container_never_shows_stale_lines() {
    let (source, hub) = setup();
    let mut controller = ViewerController::new(target(), ViewerConfig::default(), hub);
    controller.start();

    let main = source.latest_feed().unwrap();
    main.push("main-1");
    assert_eq!(
        controller.next_update().await,
        Some(ViewerUpdate::Line(DisplayLine::new("main-1")))
    );

    // Residual lines already in flight when the switch happens
    main.push("main-2");
    main.push("main-3");
    settle().await;

    controller.select_container("init").unwrap();
    let init = source.latest_feed().unwrap();
    assert_eq!(init.tuple().container(), "init");
    init.push("init-1");
    init.finish();

    assert_eq!(
        drain(&mut controller).await,
        vec![
            ViewerUpdate::Line(DisplayLine::new("init-1")),
            ViewerUpdate::CaughtUp,
        ]
    );
    assert_eq!(texts(&controller), vec!["init-1"]);

    settle().await;
    assert!(!main.is_attached());
    assert!(!main.push("main-4"));
}

#[tokio::test]
async fn test_at_most_one_upstream_attached_per_viewer() {
    let (source, hub) = setup();
    let mut controller = ViewerController::new(target(), ViewerConfig::default(), hub);
    controller.start();

    for container in ["init", "sidecar", "main", "init"] {
        controller.select_container(container).unwrap();
        settle().await;
        assert_eq!(source.attached_count(), 1);
    }
    assert_eq!(source.open_count(), 5);

    controller.dispose();
    settle().await;
    assert_eq!(source.attached_count(), 0);
}

#[tokio::test]
async fn test_viewers_share_connection_and_late_viewer_gets_replay() {
    let (source, hub) = setup();
    let mut first = ViewerController::new(target(), ViewerConfig::default(), hub.clone());
    first.start();

    let feed = source.latest_feed().unwrap();
    feed.push("a");
    first.next_update().await;

    let mut second = ViewerController::new(target(), ViewerConfig::default(), hub.clone());
    second.start();
    assert_eq!(source.open_count(), 1);
    assert_eq!(
        second.next_update().await,
        Some(ViewerUpdate::Line(DisplayLine::new("a")))
    );

    feed.push("b");
    first.next_update().await;
    second.next_update().await;
    assert_eq!(texts(&first), texts(&second));

    // The connection survives while any viewer remains
    first.dispose();
    feed.push("c");
    assert_eq!(
        second.next_update().await,
        Some(ViewerUpdate::Line(DisplayLine::new("c")))
    );

    second.dispose();
    settle().await;
    assert!(!feed.is_attached());

    // A new viewer gets a fresh connection with no leftover history
    let mut third = ViewerController::new(target(), ViewerConfig::default(), hub);
    third.start();
    assert_eq!(source.open_count(), 2);
    source.latest_feed().unwrap().push("fresh");
    assert_eq!(
        third.next_update().await,
        Some(ViewerUpdate::Line(DisplayLine::new("fresh")))
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_filter_falls_back_to_plain_lines() {
    let (source, hub) = setup();
    let mut controller = ViewerController::new(target(), ViewerConfig::default(), hub);
    controller.start();

    controller.set_raw_filter("(");
    let update = controller.next_update().await;
    let Some(ViewerUpdate::Errored(ViewerError::FilterCompile(err))) = update else {
        panic!("expected a filter compile error, got {update:?}");
    };
    assert_eq!(err.term, "(");

    source.latest_feed().unwrap().push("(unbalanced");
    controller.next_update().await;
    assert_eq!(texts(&controller), vec!["(unbalanced"]);

    // A valid term clears the error on the next tuple
    controller.set_raw_filter("ok");
    assert_eq!(
        controller.next_update().await,
        Some(ViewerUpdate::FilterCommitted {
            term: "ok".to_string()
        })
    );
    assert_eq!(controller.state().name(), "connecting");
}

#[tokio::test]
async fn test_source_failure_is_reported_once_and_recoverable() {
    let (source, hub) = setup();
    let mut controller = ViewerController::new(target(), ViewerConfig::default(), hub);
    controller.start();

    let feed = source.latest_feed().unwrap();
    feed.push("partial");
    feed.fail(SourceError::Status {
        status: 404,
        message: "pod not found".to_string(),
    });

    let updates = drain(&mut controller).await;
    assert_eq!(updates.len(), 2);
    assert!(matches!(
        &updates[1],
        ViewerUpdate::Errored(ViewerError::Source(SourceError::Status { status: 404, .. }))
    ));
    assert_eq!(controller.state().name(), "errored");

    controller.select_container("sidecar").unwrap();
    assert_eq!(controller.state().name(), "connecting");
    assert!(controller.state().error().is_none());
}

#[tokio::test]
async fn test_retry_reconnects_while_peer_viewer_still_holds_failure() {
    let (source, hub) = setup();
    let mut a = ViewerController::new(target(), ViewerConfig::default(), hub.clone());
    let mut b = ViewerController::new(target(), ViewerConfig::default(), hub);
    a.start();
    b.start();
    assert_eq!(source.open_count(), 1);

    source
        .latest_feed()
        .unwrap()
        .fail(SourceError::Stream("reset".to_string()));
    assert!(matches!(
        a.next_update().await,
        Some(ViewerUpdate::Errored(ViewerError::Source(SourceError::Stream(_))))
    ));

    // `b` has not drained its failure yet
    a.retry();
    assert_eq!(source.open_count(), 2);
    assert_eq!(a.state().name(), "connecting");

    source.latest_feed().unwrap().push("recovered");
    assert_eq!(
        a.next_update().await,
        Some(ViewerUpdate::Line(DisplayLine::new("recovered")))
    );
    assert_eq!(a.state().name(), "streaming");

    assert!(matches!(
        b.next_update().await,
        Some(ViewerUpdate::Errored(ViewerError::Source(SourceError::Stream(_))))
    ));
}
