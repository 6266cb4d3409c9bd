use std::sync::Arc;

use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use crate::api::{ApiError, ByteStream, RestTransport};

use super::frame::NotificationFrame;

pub const STREAM_PATH: &str = "/notifications/stream";

/// Frames of one stream connection.
pub type FrameStream = BoxStream<'static, Result<NotificationFrame, ApiError>>;

/// Source of notification frames.
///
/// Each [`open`](Self::open) is a new connection; nothing is shared between
/// two streams, so a consumer reconnects simply by opening again.
#[derive(Clone)]
pub struct NotificationFeed {
  transport: Arc<dyn RestTransport>,
  path: String,
}

impl NotificationFeed {
  pub fn new(transport: Arc<dyn RestTransport>) -> Self {
    Self {
      transport,
      path: STREAM_PATH.to_string(),
    }
  }

  pub fn with_path(mut self, path: impl Into<String>) -> Self {
    self.path = path.into();
    self
  }

  /// Lazily connect and yield frames until the server closes the stream.
  ///
  /// Nothing is sent until the stream is first polled. A transport failure
  /// is yielded once as `Err` and ends the stream; there is no reconnect.
  /// Events that do not decode to a frame are skipped.
  pub fn open(&self) -> FrameStream {
    let transport = self.transport.clone();
    let path = self.path.clone();

    stream::once(async move {
      debug!(%path, "opening notification stream");
      transport.open_stream(&path).await
    })
    .flat_map(|opened| match opened {
      Ok(bytes) => frames(bytes),
      Err(err) => stream::iter([Err(err)]).boxed(),
    })
    .boxed()
  }
}

fn frames(bytes: ByteStream) -> FrameStream {
  let events = bytes.eventsource().boxed();

  stream::unfold(Some(events), |events| async move {
    let mut events = events?;
    loop {
      let Some(next) = events.next().await else {
        debug!("notification stream closed");
        return None;
      };
      match next {
        Ok(event) => match NotificationFrame::from_event(&event) {
          Ok(frame) => return Some((Ok(frame), Some(events))),
          Err(err) => {
            warn!(event = %event.event, error = %err, "skipping undecodable notification frame");
          }
        },
        Err(EventStreamError::Transport(err)) => {
          warn!(error = %err, "notification stream failed");
          return Some((Err(err), None));
        }
        Err(err) => warn!(error = %err, "skipping malformed event"),
      }
    }
  })
  .boxed()
}
