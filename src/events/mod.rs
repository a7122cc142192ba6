use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::models::{AddressPoint, LocationStep, RouteEstimate};
use crate::wizard::WizardStage;

/// Notifications the wizard publishes to its host (screens, analytics).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WizardEvent {
    StageChanged {
        from: WizardStage,
        to: WizardStage,
    },
    AddressResolved {
        step: LocationStep,
        point: AddressPoint,
    },
    RouteEstimated(RouteEstimate),
    /// `first_quote` selects the celebratory first-quote path in the host
    QuoteSubmitted {
        quote_id: String,
        first_quote: bool,
    },
    Exited,
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<WizardEvent>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<WizardEvent>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WizardEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Publishes without waiting; a full or closed channel drops the event.
    pub fn publish(&self, event: WizardEvent) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Dropping wizard event: {}", e);
        }
    }
}
