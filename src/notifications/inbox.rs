use std::collections::{HashMap, VecDeque};

use crate::api::{ApiError, ErrorBody};

use super::frame::{Notification, NotificationFrame, NotificationStatus};

/// Recent stream activity, bounded to the last `capacity` frames.
///
/// Tallies count every notification seen, including those that have since
/// fallen out of the buffer.
#[derive(Debug)]
pub struct NotificationInbox {
  frames: VecDeque<NotificationFrame>,
  capacity: usize,
  tallies: HashMap<NotificationStatus, u64>,
  last_status: Option<String>,
  last_error: Option<ErrorBody>,
  errors: u64,
}

impl Default for NotificationInbox {
  fn default() -> Self {
    Self::new(50)
  }
}

impl NotificationInbox {
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      frames: VecDeque::with_capacity(capacity),
      capacity,
      tallies: HashMap::new(),
      last_status: None,
      last_error: None,
      errors: 0,
    }
  }

  /// Record a frame, dropping the oldest one when full.
  pub fn push(&mut self, frame: NotificationFrame) {
    match &frame {
      NotificationFrame::Notification { payload } => {
        *self.tallies.entry(payload.status).or_default() += 1;
      }
      NotificationFrame::Status { status } => self.last_status = Some(status.clone()),
      NotificationFrame::Error { error } => {
        self.errors += 1;
        self.last_error = Some(error.clone());
      }
    }

    if self.frames.len() == self.capacity {
      self.frames.pop_front();
    }
    self.frames.push_back(frame);
  }

  /// Record a stream failure, which is kept as an error frame.
  pub fn push_failure(&mut self, err: &ApiError) {
    self.push(NotificationFrame::Error {
      error: ErrorBody {
        code: err.code.clone(),
        message: err.message.clone(),
        details: err.details.clone(),
      },
    });
  }

  /// Buffered frames, oldest first.
  pub fn frames(&self) -> impl Iterator<Item = &NotificationFrame> {
    self.frames.iter()
  }

  /// Buffered notifications, oldest first.
  pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
    self.frames.iter().filter_map(|frame| match frame {
      NotificationFrame::Notification { payload } => Some(payload),
      _ => None,
    })
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn tally(&self, status: NotificationStatus) -> u64 {
    self.tallies.get(&status).copied().unwrap_or(0)
  }

  pub fn unread(&self) -> u64 {
    self.tally(NotificationStatus::Unread)
  }

  pub fn last_status(&self) -> Option<&str> {
    self.last_status.as_deref()
  }

  pub fn last_error(&self) -> Option<&ErrorBody> {
    self.last_error.as_ref()
  }

  pub fn errors(&self) -> u64 {
    self.errors
  }

  pub fn clear(&mut self) {
    *self = Self::new(self.capacity);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::Map;

  fn note(id: &str, status: NotificationStatus) -> NotificationFrame {
    NotificationFrame::Notification {
      payload: Notification {
        id: id.to_string(),
        tenant_id: None,
        title: String::new(),
        message: String::new(),
        level: None,
        status,
        created_at: None,
        extra: Map::new(),
      },
    }
  }

  #[test]
  fn test_ring_buffer_keeps_newest() {
    let mut inbox = NotificationInbox::new(3);
    for i in 0..5 {
      inbox.push(note(&i.to_string(), NotificationStatus::Unread));
    }

    let ids: Vec<_> = inbox.notifications().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "3", "4"]);
    assert_eq!(inbox.len(), 3);
    // Tallies outlive the buffer
    assert_eq!(inbox.unread(), 5);
  }

  #[test]
  fn test_tallies_status_and_errors() {
    let mut inbox = NotificationInbox::default();
    assert_eq!(inbox.capacity(), 50);

    inbox.push(NotificationFrame::Status {
      status: "connected".to_string(),
    });
    inbox.push(note("a", NotificationStatus::Unread));
    inbox.push(note("b", NotificationStatus::Read));
    inbox.push(note("c", NotificationStatus::Archived));
    inbox.push(note("d", NotificationStatus::Read));
    inbox.push_failure(&ApiError::network("stream reset"));

    assert_eq!(inbox.tally(NotificationStatus::Unread), 1);
    assert_eq!(inbox.tally(NotificationStatus::Read), 2);
    assert_eq!(inbox.tally(NotificationStatus::Archived), 1);
    assert_eq!(inbox.last_status(), Some("connected"));
    assert_eq!(inbox.errors(), 1);
    assert_eq!(inbox.last_error().unwrap().code, "NETWORK_ERROR");
    assert_eq!(inbox.len(), 6);

    inbox.clear();
    assert!(inbox.is_empty());
    assert_eq!(inbox.errors(), 0);
    assert_eq!(inbox.capacity(), 50);
  }

  #[test]
  fn test_zero_capacity_is_clamped() {
    let mut inbox = NotificationInbox::new(0);
    inbox.push(note("a", NotificationStatus::Unread));
    inbox.push(note("b", NotificationStatus::Unread));
    assert_eq!(inbox.len(), 1);
  }
}
