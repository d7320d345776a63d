//! Customer notification triggers.
//!
//! A status change notifies the customer when the status belongs to one of the
//! notification phases below and the customer has that phase enabled. Sending
//! goes through a remote function; the outcome is returned to the caller, who
//! decides whether to await it, spawn it or drop it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::FunctionInvoker;

/// Customer-facing notification phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationPhaseOption {
    pub value: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub statuses: &'static [&'static str],
}

/// Checked in declaration order.
pub const NOTIFICATION_PHASES: &[NotificationPhaseOption] = &[
    NotificationPhaseOption {
        value: "order_created",
        label: "Order created",
        description: "The order was registered and entered the pipeline",
        statuses: &["pending", "order_generated"],
    },
    NotificationPhaseOption {
        value: "in_production",
        label: "In production",
        description: "Separation or production of the items has started",
        statuses: &["separation_started", "in_production"],
    },
    NotificationPhaseOption {
        value: "production_completed",
        label: "Production completed",
        description: "All items were produced or separated",
        statuses: &["separation_completed", "production_completed"],
    },
    NotificationPhaseOption {
        value: "ready_for_shipping",
        label: "Ready for shipping",
        description: "The order is packed and released for shipping",
        statuses: &["ready_for_shipping", "released_for_shipping"],
    },
    NotificationPhaseOption {
        value: "invoiced",
        label: "Invoiced",
        description: "The invoice was issued",
        statuses: &["invoice_issued", "invoice_sent"],
    },
    NotificationPhaseOption {
        value: "in_transit",
        label: "In transit",
        description: "The carrier collected the order",
        statuses: &["in_transit", "collected"],
    },
    NotificationPhaseOption {
        value: "delivered",
        label: "Delivered",
        description: "The order reached the customer",
        statuses: &["delivered", "completed"],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDecision {
    pub should_notify: bool,
    pub phase: Option<&'static str>,
}

/// Find the first enabled notification phase that covers `status`.
pub fn should_notify_for_status<S: AsRef<str>>(
    status: &str,
    enabled_phases: &[S],
) -> NotificationDecision {
    let hit = NOTIFICATION_PHASES.iter().find(|option| {
        option.statuses.contains(&status)
            && enabled_phases.iter().any(|p| p.as_ref() == option.value)
    });
    NotificationDecision {
        should_notify: hit.is_some(),
        phase: hit.map(|option| option.value),
    }
}

/// Look up a notification phase by value.
pub fn notification_phase(value: &str) -> Option<&'static NotificationPhaseOption> {
    NOTIFICATION_PHASES.iter().find(|o| o.value == value)
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

/// Result of an attempted customer notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Success { message: Option<String> },
    Skipped { reason: String },
    Failed { reason: String },
}

/// Reply body of the notification function.
#[derive(Debug, Deserialize)]
struct NotifyReply {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Notify the customer of `order_id` about `new_status`, if enabled.
pub async fn notify_status_change<I, S>(
    invoker: &I,
    function_name: &str,
    order_id: &str,
    new_status: &str,
    enabled_phases: &[S],
) -> NotifyOutcome
where
    I: FunctionInvoker,
    S: AsRef<str>,
{
    let decision = should_notify_for_status(new_status, enabled_phases);
    let Some(phase) = decision.phase else {
        return NotifyOutcome::Skipped {
            reason: format!("status '{new_status}' has no enabled notification phase"),
        };
    };

    let payload = json!({
        "order_id": order_id,
        "trigger_type": "status_change",
        "new_status": new_status,
    });

    match invoker.invoke(function_name, payload).await {
        Ok(reply) => outcome_from_reply(order_id, phase, reply),
        Err(e) => {
            warn!(order_id = %order_id, phase = phase, error = %e, "Customer notification failed");
            NotifyOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

fn outcome_from_reply(order_id: &str, phase: &str, reply: Value) -> NotifyOutcome {
    match serde_json::from_value::<NotifyReply>(reply) {
        Ok(NotifyReply {
            success: true,
            message,
        }) => {
            info!(order_id = %order_id, phase = phase, "Customer notification sent");
            NotifyOutcome::Success { message }
        }
        Ok(NotifyReply {
            success: false,
            message,
        }) => {
            let reason = message.unwrap_or_else(|| "notification function reported failure".into());
            warn!(order_id = %order_id, phase = phase, reason = %reason, "Customer notification rejected");
            NotifyOutcome::Failed { reason }
        }
        Err(e) => NotifyOutcome::Failed {
            reason: format!("unexpected notification reply: {e}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use std::sync::Mutex;

    struct MockInvoker {
        reply: Mutex<Option<Result<Value>>>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl MockInvoker {
        fn replying(reply: Result<Value>) -> Self {
            Self {
                reply: Mutex::new(Some(reply)),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl FunctionInvoker for MockInvoker {
        async fn invoke(&self, name: &str, payload: Value) -> Result<Value> {
            self.calls.lock().unwrap().push((name.to_string(), payload));
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Ok(Value::Null))
        }
    }

    #[test]
    fn matches_enabled_phase() {
        let decision = should_notify_for_status("delivered", &["delivered", "in_transit"]);
        assert_eq!(
            decision,
            NotificationDecision {
                should_notify: true,
                phase: Some("delivered"),
            }
        );
    }

    #[test]
    fn disabled_phase_does_not_match() {
        let decision = should_notify_for_status("delivered", &["in_transit"]);
        assert!(!decision.should_notify);
        assert_eq!(decision.phase, None);
    }

    #[test]
    fn unknown_status_never_notifies() {
        let all: Vec<&str> = NOTIFICATION_PHASES.iter().map(|o| o.value).collect();
        assert!(!should_notify_for_status("awaiting_lab", &all).should_notify);
        assert!(!should_notify_for_status("", &all).should_notify);
        let none: &[&str] = &[];
        assert!(!should_notify_for_status("delivered", none).should_notify);
    }

    #[test]
    fn secondary_statuses_are_covered() {
        let enabled = vec!["in_transit".to_string()];
        assert_eq!(
            should_notify_for_status("collected", &enabled).phase,
            Some("in_transit")
        );
        assert_eq!(notification_phase("invoiced").unwrap().label, "Invoiced");
    }

    #[tokio::test]
    async fn sends_payload_and_reports_success() {
        let invoker =
            MockInvoker::replying(Ok(serde_json::json!({"success": true, "message": "queued"})));
        let outcome =
            notify_status_change(&invoker, "ai-agent-notify", "o-1", "in_transit", &["in_transit"])
                .await;
        assert_eq!(
            outcome,
            NotifyOutcome::Success {
                message: Some("queued".into())
            }
        );

        let calls = invoker.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "ai-agent-notify");
        assert_eq!(
            calls[0].1,
            serde_json::json!({
                "order_id": "o-1",
                "trigger_type": "status_change",
                "new_status": "in_transit",
            })
        );
    }

    #[tokio::test]
    async fn skips_without_calling_remote() {
        let invoker = MockInvoker::replying(Ok(Value::Null));
        let outcome =
            notify_status_change(&invoker, "ai-agent-notify", "o-1", "in_packaging", &["delivered"])
                .await;
        assert!(matches!(outcome, NotifyOutcome::Skipped { .. }));
        assert!(invoker.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remote_errors_become_failed() {
        let invoker = MockInvoker::replying(Err(Error::Status {
            status: 500,
            message: "boom".into(),
        }));
        let outcome =
            notify_status_change(&invoker, "ai-agent-notify", "o-1", "delivered", &["delivered"])
                .await;
        assert_eq!(
            outcome,
            NotifyOutcome::Failed {
                reason: "boom (HTTP 500)".into()
            }
        );

        let rejected = MockInvoker::replying(Ok(serde_json::json!({"success": false})));
        let outcome =
            notify_status_change(&rejected, "ai-agent-notify", "o-1", "delivered", &["delivered"])
                .await;
        assert!(matches!(outcome, NotifyOutcome::Failed { .. }));

        let garbled = MockInvoker::replying(Ok(serde_json::json!("ok")));
        let outcome =
            notify_status_change(&garbled, "ai-agent-notify", "o-1", "delivered", &["delivered"])
                .await;
        assert!(matches!(outcome, NotifyOutcome::Failed { .. }));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(NotifyOutcome::Skipped {
            reason: "off".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "skipped", "reason": "off"}));
    }
}
