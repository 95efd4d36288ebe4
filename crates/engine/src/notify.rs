//! Notification sink
//!
//! `Notifier` is the strict interface: delivery failures come back as
//! `SignalError::NotifyFailure`. The `*_best_effort` helpers are the
//! fire-and-forget contract: they log and never propagate.

use async_trait::async_trait;
use tracing::warn;

use crate::error::SignalResult;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, chat_id: &str, text: &str) -> SignalResult<()>;

    async fn send_photo(
        &self,
        chat_id: &str,
        png: Vec<u8>,
        caption: Option<&str>,
    ) -> SignalResult<()>;
}

pub async fn text_best_effort(notifier: &dyn Notifier, chat_id: &str, text: &str) {
    if let Err(e) = notifier.send_text(chat_id, text).await {
        warn!(chat_id, error = %e, "send_text failed");
    }
}

pub async fn photo_best_effort(
    notifier: &dyn Notifier,
    chat_id: &str,
    png: Vec<u8>,
    caption: Option<&str>,
) {
    if let Err(e) = notifier.send_photo(chat_id, png, caption).await {
        warn!(chat_id, error = %e, "send_photo failed");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::error::SignalError;

    /// Message captured by `RecordingNotifier`
    #[derive(Debug, Clone, PartialEq)]
    pub enum Sent {
        Text { chat_id: String, text: String },
        Photo { chat_id: String, bytes: usize, caption: Option<String> },
    }

    /// In-memory notifier; fails every send, or only the next `fail_next` ones
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<Sent>>,
        pub fail: bool,
        pub fail_next: AtomicUsize,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn flaky(failures: usize) -> Self {
            Self {
                fail_next: AtomicUsize::new(failures),
                ..Self::default()
            }
        }

        fn should_fail(&self) -> bool {
            self.fail
                || self
                    .fail_next
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        pub fn texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Text { text, .. } => Some(text),
                    Sent::Photo { caption, .. } => caption,
                })
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_text(&self, chat_id: &str, text: &str) -> SignalResult<()> {
            if self.should_fail() {
                return Err(SignalError::NotifyFailure("chat unreachable".into()));
            }
            self.sent.lock().unwrap().push(Sent::Text {
                chat_id: chat_id.to_string(),
                text: text.to_string(),
            });
            Ok(())
        }

        async fn send_photo(
            &self,
            chat_id: &str,
            png: Vec<u8>,
            caption: Option<&str>,
        ) -> SignalResult<()> {
            if self.should_fail() {
                return Err(SignalError::NotifyFailure("chat unreachable".into()));
            }
            self.sent.lock().unwrap().push(Sent::Photo {
                chat_id: chat_id.to_string(),
                bytes: png.len(),
                caption: caption.map(str::to_string),
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{RecordingNotifier, Sent};
    use super::*;

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let notifier = RecordingNotifier::failing();
        assert!(notifier.send_text("1", "hi").await.is_err());

        text_best_effort(&notifier, "1", "hi").await;
        photo_best_effort(&notifier, "1", vec![1, 2, 3], None).await;
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_best_effort_delivers() {
        let notifier = RecordingNotifier::default();
        text_best_effort(&notifier, "42", "hello").await;
        photo_best_effort(&notifier, "42", vec![0; 8], Some("cap")).await;
        assert_eq!(
            notifier.sent(),
            vec![
                Sent::Text { chat_id: "42".into(), text: "hello".into() },
                Sent::Photo { chat_id: "42".into(), bytes: 8, caption: Some("cap".into()) },
            ]
        );
    }
}
