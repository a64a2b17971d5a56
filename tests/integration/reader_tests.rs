//! Integration tests for the stream reader task.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agent_stream::client::reader::TRUNCATED_FRAME_MESSAGE;
use agent_stream::client::{run_reader, ReaderItem, ReaderOptions, Tagged};
use agent_stream::framing::FramingMode;
use agent_stream::models::{SessionStatus, StreamEvent};
use agent_stream::session::SessionMachine;

use super::test_helpers::{chunked_reader, three_fragments};

fn options(mode: FramingMode) -> ReaderOptions {
    ReaderOptions {
        mode,
        max_frame_bytes: 1 << 20,
        idle_timeout: None,
    }
}

/// Run the reader over `chunks` to completion and collect its output.
async fn read_all(mode: FramingMode, chunks: &[&str]) -> Vec<Tagged> {
    let (tx, mut rx) = mpsc::channel(32);
    run_reader(3, chunked_reader(chunks), options(mode), tx, CancellationToken::new())
        .await
        .expect("reader");

    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
        items.push(item);
    }
    items
}

// ── End to end ───────────────────────────────────────────────────────────────

/// Three fragmented reads yield exactly one domain event, then completion.
#[tokio::test]
async fn three_fragment_domain_event_completes_session() {
    let items = read_all(FramingMode::Concatenated, &three_fragments()).await;

    assert_eq!(items.len(), 2, "one event and the close marker: {items:?}");
    assert!(items.iter().all(|tagged| tagged.generation == 3));

    let ReaderItem::Event(StreamEvent::DomainEvent(event)) = &items[0].item else {
        panic!("expected a domain event, got {:?}", items[0].item);
    };
    assert_eq!(event.order_id, "1");
    assert_eq!(event.state, "DELIVERED");
    assert_eq!(items[1].item, ReaderItem::Closed);

    let mut machine = SessionMachine::new(vec!["DELIVERED".into()], 4);
    machine.start("track order 1", 3);
    for tagged in items {
        match tagged.item {
            ReaderItem::Event(event) => {
                machine.apply(event);
            }
            ReaderItem::Closed => {
                machine.finish();
            }
            ReaderItem::Failed(message) => {
                machine.fail(&message);
            }
        }
    }

    assert_eq!(machine.status(), SessionStatus::Complete);
    assert_eq!(machine.state().event_log.len(), 1);
    assert_eq!(machine.state().current_order_id.as_deref(), Some("1"));
}

/// Line framing yields highlights and tokens and skips noise.
#[tokio::test]
async fn line_stream_skips_noise() {
    let items = read_all(
        FramingMode::Lines,
        &[
            "{\"status\":\"start\"}\n{\"response\":\"He",
            "llo\",\"node\":\"writer\"}\nnot json at all\n",
            "{\"response\":\" world\"}",
        ],
    )
    .await;

    let kinds: Vec<_> = items.into_iter().map(|tagged| tagged.item).collect();
    assert_eq!(
        kinds,
        vec![
            ReaderItem::Event(StreamEvent::NodeHighlight {
                node_id: "writer".into()
            }),
            ReaderItem::Event(StreamEvent::Token {
                text: "Hello".into()
            }),
            ReaderItem::Event(StreamEvent::Token {
                text: " world".into()
            }),
            ReaderItem::Closed,
        ]
    );
}

/// Incomplete domain events are dropped and later frames still arrive.
#[tokio::test]
async fn invalid_domain_event_is_dropped() {
    let items = read_all(
        FramingMode::Concatenated,
        &[
            r#"{"response": "{'order_id': '1'}"}"#,
            r#"{"response": "{'order_id': 'oops}"}"#,
            r#"{"response": "All done."}"#,
        ],
    )
    .await;

    assert_eq!(
        items.into_iter().map(|tagged| tagged.item).collect::<Vec<_>>(),
        vec![
            ReaderItem::Event(StreamEvent::FinalResponse {
                text: "All done.".into()
            }),
            ReaderItem::Closed,
        ]
    );
}

/// A body that ends inside an object reports a failure.
#[tokio::test]
async fn truncated_object_reports_failure() {
    let items = read_all(FramingMode::Concatenated, &[r#"{"response": "{'order"#]).await;

    assert_eq!(
        items.last().map(|tagged| &tagged.item),
        Some(&ReaderItem::Failed(TRUNCATED_FRAME_MESSAGE.to_owned()))
    );
}

/// A non-object marker after the last object still closes the stream cleanly.
#[tokio::test]
async fn trailing_marker_after_last_object_closes_cleanly() {
    let mut chunks = three_fragments().to_vec();
    chunks.push("\n[DONE]\n");

    let items = read_all(FramingMode::Concatenated, &chunks).await;

    assert_eq!(items.len(), 2, "one event and the close marker: {items:?}");
    assert!(matches!(
        items[0].item,
        ReaderItem::Event(StreamEvent::DomainEvent(_))
    ));
    assert_eq!(items[1].item, ReaderItem::Closed);
}

// ── Cancellation and timeouts ────────────────────────────────────────────────

/// Cancellation stops the reader without emitting anything further.
#[tokio::test]
async fn cancellation_stops_reader_silently() {
    let (client_side, mut server_side) = tokio::io::duplex(64);
    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();

    let task = tokio::spawn(run_reader(
        1,
        client_side,
        options(FramingMode::Lines),
        tx,
        cancel.clone(),
    ));

    tokio::io::AsyncWriteExt::write_all(&mut server_side, b"{\"response\":\"a\"}\n")
        .await
        .unwrap();
    let first = rx.recv().await.expect("first token");
    assert_eq!(
        first.item,
        ReaderItem::Event(StreamEvent::Token { text: "a".into() })
    );

    cancel.cancel();
    task.await.unwrap().unwrap();

    // Bytes written after cancellation are never observed.
    let _ = tokio::io::AsyncWriteExt::write_all(&mut server_side, b"{\"response\":\"b\"}\n").await;
    assert!(rx.recv().await.is_none(), "no close marker after cancellation");
}

/// A silent body fails once the idle window elapses.
#[tokio::test(start_paused = true)]
async fn idle_stream_times_out() {
    let (client_side, _server_side) = tokio::io::duplex(64);
    let (tx, mut rx) = mpsc::channel(8);
    let opts = ReaderOptions {
        idle_timeout: Some(Duration::from_secs(2)),
        ..options(FramingMode::Lines)
    };

    run_reader(9, client_side, opts, tx, CancellationToken::new())
        .await
        .unwrap();

    let tagged = rx.recv().await.expect("failure item");
    assert_eq!(tagged.generation, 9);
    assert!(matches!(tagged.item, ReaderItem::Failed(ref msg) if msg.contains("idle")));
}

/// The reader stops when the receiver is dropped.
#[tokio::test]
async fn dropped_receiver_stops_reader() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    run_reader(
        1,
        chunked_reader(&["{\"response\":\"a\"}\n{\"response\":\"b\"}\n"]),
        options(FramingMode::Lines),
        tx,
        CancellationToken::new(),
    )
    .await
    .expect("reader returns cleanly");
}

/// A frame that arrives slowly in small pieces is not mistaken for silence.
#[tokio::test(start_paused = true)]
async fn slowly_arriving_frame_is_not_idle() {
    let (client_side, mut server_side) = tokio::io::duplex(256);
    let (tx, mut rx) = mpsc::channel(8);
    let opts = ReaderOptions {
        idle_timeout: Some(Duration::from_secs(1)),
        ..options(FramingMode::Lines)
    };

    let frame = format!("{{\"response\":\"{}\"}}\n", "x".repeat(80));
    let writer = tokio::spawn(async move {
        for piece in frame.as_bytes().chunks(20) {
            tokio::time::sleep(Duration::from_millis(600)).await;
            tokio::io::AsyncWriteExt::write_all(&mut server_side, piece)
                .await
                .unwrap();
        }
    });

    run_reader(4, client_side, opts, tx, CancellationToken::new())
        .await
        .unwrap();
    writer.await.unwrap();

    let items: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|tagged| tagged.item)
        .collect();
    assert_eq!(
        items,
        vec![
            ReaderItem::Event(StreamEvent::Token {
                text: "x".repeat(80)
            }),
            ReaderItem::Closed,
        ]
    );
}
