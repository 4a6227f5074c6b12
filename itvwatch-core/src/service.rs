//! Check service combining the booking site and the notifier.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::model::{Availability, CenterId, Plate};
use crate::ports::{AvailabilityPort, NotifyError, NotifyPort};
use crate::report::format_report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of a completed run.
pub enum RunOutcome {
    /// The aggregate message was delivered.
    Sent {
        /// Number of center sections in the message.
        sections: usize,
    },
    /// No center had free slots; nothing was sent.
    NothingToSend,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent { .. } => formatter.write_str("message sent"),
            Self::NothingToSend => formatter.write_str("nothing to send"),
        }
    }
}

/// Public entry point for checking all configured centers.
pub struct CheckService {
    availability: Arc<dyn AvailabilityPort>,
    notifier: Arc<dyn NotifyPort>,
}

impl CheckService {
    /// Create a new service bound to the provided backends.
    #[must_use]
    pub fn new(availability: Arc<dyn AvailabilityPort>, notifier: Arc<dyn NotifyPort>) -> Self {
        Self {
            availability,
            notifier,
        }
    }

    /// Query every center in order and send one message if any has slots.
    ///
    /// Per-center failures are logged and treated as "no slots".
    ///
    /// # Errors
    ///
    /// Returns a [`NotifyError`] if the aggregate message cannot be delivered.
    pub async fn run(&self, config: &Config) -> Result<RunOutcome, NotifyError> {
        let sections = self.collect_sections(&config.plate, &config.centers).await;

        if sections.is_empty() {
            info!("no center has free slots");
            return Ok(RunOutcome::NothingToSend);
        }

        self.notifier.notify(&sections.join("\n\n")).await?;
        info!(sections = sections.len(), "availability report sent");

        Ok(RunOutcome::Sent {
            sections: sections.len(),
        })
    }

    /// Build one titled report section per center that has free slots.
    async fn collect_sections(&self, plate: &Plate, centers: &[CenterId]) -> Vec<String> {
        let mut sections = Vec::new();

        for &center in centers {
            let availability = self
                .availability
                .fetch_availability(plate, center)
                .await
                .unwrap_or_else(|err| {
                    warn!(%center, error = %err, "availability check failed");
                    Availability::Error(err.to_string())
                });

            match &availability {
                Availability::Error(message) => {
                    info!(%center, %message, "booking site returned an error");
                }
                Availability::Slots { slots, .. } => {
                    info!(%center, slots = slots.len(), "availability checked");
                }
            }

            if availability.has_slots() {
                sections.push(format!(
                    "*Centro {center}*\n{}",
                    format_report(&availability, centers)
                ));
            }
        }

        sections
    }
}
