use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Outbound messages to users.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    VerifyEmail {
        to: String,
        verify_url: String,
    },
    RoomInvitation {
        to: String,
        interviewee_name: String,
        title: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        url: String,
    },
    InterviewerAssignment {
        to: String,
        interviewer_name: String,
        candidate_name: String,
        candidate_email: String,
        title: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        url: String,
    },
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Notification::VerifyEmail { to, .. }
            | Notification::RoomInvitation { to, .. }
            | Notification::InterviewerAssignment { to, .. } => to,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::VerifyEmail { .. } => "verify_email",
            Notification::RoomInvitation { .. } => "room_invitation",
            Notification::InterviewerAssignment { .. } => "interviewer_assignment",
        }
    }
}

/// Delivery channel for notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Records notifications as log events instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> anyhow::Result<()> {
        match &notification {
            Notification::VerifyEmail { to, verify_url } => {
                info!(kind = notification.kind(), %to, %verify_url, "Notification");
            }
            Notification::RoomInvitation {
                to,
                interviewee_name,
                title,
                start,
                end,
                url,
            } => {
                info!(
                    kind = notification.kind(),
                    %to, %interviewee_name, %title, %start, %end, %url,
                    "Notification"
                );
            }
            Notification::InterviewerAssignment {
                to,
                interviewer_name,
                candidate_name,
                candidate_email,
                title,
                start,
                end,
                url,
            } => {
                info!(
                    kind = notification.kind(),
                    %to, %interviewer_name, %candidate_name, %candidate_email,
                    %title, %start, %end, %url,
                    "Notification"
                );
            }
        }
        Ok(())
    }
}

/// Sends a notification in the background; delivery failures are only logged.
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        let to = notification.recipient().to_string();
        let kind = notification.kind();
        if let Err(e) = notifier.send(notification).await {
            warn!("Failed to send {kind} notification to {to}: {e:?}");
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, notification: Notification) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(notification);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_background() {
        let recorder = Arc::new(RecordingNotifier::default());
        dispatch(
            recorder.clone(),
            Notification::VerifyEmail {
                to: "a@b.c".into(),
                verify_url: "http://front/verify".into(),
            },
        );
        for _ in 0..50 {
            if !recorder.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient(), "a@b.c");
        assert_eq!(sent[0].kind(), "verify_email");
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_everything() {
        let n = Notification::RoomInvitation {
            to: "x@y.z".into(),
            interviewee_name: "X".into(),
            title: "Round 1".into(),
            start: Utc::now(),
            end: Utc::now(),
            url: "http://front/rooms/1".into(),
        };
        assert!(LogNotifier.send(n).await.is_ok());
    }
}
