//! Conflict alerts pushed to whoever is watching for them.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::conflicts::model::{CaseId, ConflictLevel, ReasonCategory};

/// Emitted once per check whose level is above `none`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictAlert {
    /// `None` when the check record could not be written; the conflict
    /// still stands but there is no report to look up.
    pub report_id: Option<Uuid>,
    pub case_id: Option<CaseId>,
    pub level: ConflictLevel,
    pub categories: Vec<ReasonCategory>,
    pub conflicting_case_ids: Vec<CaseId>,
    pub checked_by: String,
}

/// Delivery must not block or fail the check that raised the alert.
pub trait ConflictNotifier: Send + Sync {
    fn notify(&self, alert: &ConflictAlert);
}

/// Logs alerts at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl ConflictNotifier for TracingNotifier {
    fn notify(&self, alert: &ConflictAlert) {
        tracing::warn!(
            report_id = ?alert.report_id,
            recorded = alert.report_id.is_some(),
            case_id = ?alert.case_id,
            level = %alert.level,
            conflicting_cases = ?alert.conflicting_case_ids,
            checked_by = %alert.checked_by,
            "Conflict detected"
        );
    }
}

/// Forwards alerts onto an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<ConflictAlert>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConflictAlert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ConflictNotifier for ChannelNotifier {
    fn notify(&self, alert: &ConflictAlert) {
        if self.tx.send(alert.clone()).is_err() {
            tracing::debug!(report_id = ?alert.report_id, "Alert receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(report_id: Option<Uuid>) -> ConflictAlert {
        ConflictAlert {
            report_id,
            case_id: Some(2),
            level: ConflictLevel::High,
            categories: vec![ReasonCategory::DirectOpposition],
            conflicting_case_ids: vec![1],
            checked_by: "clerk".to_string(),
        }
    }

    #[tokio::test]
    async fn channel_notifier_delivers() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let sent = alert(Some(Uuid::new_v4()));
        notifier.notify(&sent);
        assert_eq!(rx.recv().await, Some(sent));
    }

    #[test]
    fn unrecorded_alert_serializes_a_null_report_id() {
        let value = serde_json::to_value(alert(None)).expect("serialize");
        assert!(value["report_id"].is_null());
        assert_eq!(value["level"], "high");
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify(&alert(None));
    }
}
