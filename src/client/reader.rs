//! Stream reader task.
//!
//! Reads a streaming response body through [`FrameCodec`], interprets each
//! frame into [`StreamEvent`]s, and forwards them through a tokio [`mpsc`]
//! channel tagged with the generation of the request that produced them.
//!
//! A frame that fails to parse or validate is logged and skipped; it does
//! **not** terminate the reader. The task always ends with exactly one
//! [`ReaderItem::Closed`] or [`ReaderItem::Failed`] unless it was cancelled
//! or the receiver went away.
//!
//! The idle timeout measures silence on the wire, not time between frames:
//! a large frame arriving slowly keeps the stream alive.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::wire::interpret_frame;
use crate::errors::TRANSPORT_FALLBACK_MESSAGE;
use crate::framing::{FrameCodec, FramingMode};
use crate::models::StreamEvent;
use crate::{AppError, Result};

/// Failure text sent when the body ends inside an unterminated frame.
pub const TRUNCATED_FRAME_MESSAGE: &str = "stream ended inside an incomplete frame";

/// Something the reader observed, tagged with its request generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged {
    /// Generation of the request whose body produced `item`.
    pub generation: u64,
    /// The observation.
    pub item: ReaderItem,
}

/// Observation produced by the reader.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderItem {
    /// An interpreted stream value.
    Event(StreamEvent),
    /// The body ended cleanly.
    Closed,
    /// The body failed; carries the text to record as the session error.
    Failed(String),
}

/// Reader parameters that do not change per request.
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    /// Framing protocol of the body.
    pub mode: FramingMode,
    /// Cap on a retained partial frame.
    pub max_frame_bytes: usize,
    /// Fail the stream after this long without receiving any bytes.
    pub idle_timeout: Option<Duration>,
}

/// Reader task: decode `body` and emit [`Tagged`] observations on `tx`.
///
/// # Cancellation
///
/// When `cancel` fires the reader stops immediately and emits nothing
/// further; the body is dropped, which closes the connection.
///
/// # Errors
///
/// Returns `Ok(())` in every case; failures are reported in-band as
/// [`ReaderItem::Failed`].
pub async fn run_reader<R>(
    generation: u64,
    body: R,
    options: ReaderOptions,
    tx: mpsc::Sender<Tagged>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(
        ActivityReader::new(body),
        FrameCodec::new(options.mode, options.max_frame_bytes),
    );

    loop {
        let idle = idle_deadline(framed.get_ref().last_read, options.idle_timeout);

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(generation, "stream reader: cancellation received, stopping");
                break;
            }

            () = tokio::time::sleep_until(idle), if options.idle_timeout.is_some() => {
                if idle_deadline(framed.get_ref().last_read, options.idle_timeout) > Instant::now() {
                    // Bytes arrived while waiting for the rest of a frame.
                    continue;
                }
                warn!(generation, "stream reader: no bytes within idle timeout");
                let seconds = options.idle_timeout.map_or(0, |timeout| timeout.as_secs());
                send(&tx, generation, ReaderItem::Failed(format!(
                    "stream idle for {seconds}s"
                ))).await;
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        let item = if framed.decoder().truncated() {
                            debug!(generation, "stream reader: EOF inside incomplete frame");
                            ReaderItem::Failed(TRUNCATED_FRAME_MESSAGE.to_owned())
                        } else {
                            debug!(generation, "stream reader: EOF detected");
                            ReaderItem::Closed
                        };
                        send(&tx, generation, item).await;
                        break;
                    }

                    Some(Err(err)) => {
                        warn!(generation, error = %err, "stream reader: body error, stopping");
                        send(
                            &tx,
                            generation,
                            ReaderItem::Failed(TRANSPORT_FALLBACK_MESSAGE.to_owned()),
                        )
                        .await;
                        break;
                    }

                    Some(Ok(frame)) => {
                        if !forward_frame(&tx, generation, options.mode, &frame).await {
                            debug!(generation, "stream reader: receiver closed, stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Interpret `frame` and send its events. Returns `false` once the
/// receiver is gone.
async fn forward_frame(
    tx: &mpsc::Sender<Tagged>,
    generation: u64,
    mode: FramingMode,
    frame: &str,
) -> bool {
    let events = match interpret_frame(mode, frame) {
        Ok(events) => events,
        Err(AppError::Validation(reason)) => {
            debug!(generation, %reason, "stream reader: domain event rejected");
            return true;
        }
        Err(err) => {
            warn!(
                generation,
                error = %err,
                raw_frame = %frame,
                "stream reader: parse error, skipping frame"
            );
            return true;
        }
    };

    for event in events {
        if !send(tx, generation, ReaderItem::Event(event)).await {
            return false;
        }
    }
    true
}

async fn send(tx: &mpsc::Sender<Tagged>, generation: u64, item: ReaderItem) -> bool {
    tx.send(Tagged { generation, item }).await.is_ok()
}

fn idle_deadline(last_read: Instant, timeout: Option<Duration>) -> Instant {
    last_read + timeout.unwrap_or(Duration::ZERO)
}

/// Body wrapper recording when bytes last arrived.
#[derive(Debug)]
struct ActivityReader<R> {
    inner: R,
    last_read: Instant,
}

impl<R> ActivityReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            last_read: Instant::now(),
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ActivityReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if buf.filled().len() > before {
            this.last_read = Instant::now();
        }
        poll
    }
}
