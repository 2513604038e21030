//! Notification dispatch for one normalized snapshot.

use std::sync::Arc;

use crate::domain::{NotificationDeduplicator, WildEncounter};
use crate::error::NotifyError;
use crate::ingest::NormalizedSnapshot;
use crate::notify::composer::AlertComposer;
use crate::notify::email::EmailTransport;
use crate::notify::profile::{InterestSet, Profile};
use crate::notify::webhook::{WebhookClient, WebhookReport};

/// Outcome counts of one [`Dispatcher::dispatch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Webhook delivery counts.
    pub webhooks: WebhookReport,
    /// Alerts emailed.
    pub alerts_sent: usize,
    /// Alerts that could not be delivered.
    pub alerts_failed: usize,
    /// Interest matches skipped because they were already alerted on.
    pub alerts_suppressed: usize,
}

/// Sends alert emails for interesting encounters and posts every entity
/// event to the configured webhooks.
///
/// The recency set is shared between all workers' dispatchers, so an
/// encounter seen by several scan points is alerted on once. An alert whose
/// delivery fails is not retried.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    dedup: Arc<NotificationDeduplicator>,
    interest: InterestSet,
    recipients: Vec<String>,
    composer: AlertComposer,
    email: Arc<dyn EmailTransport>,
    webhooks: WebhookClient,
}

impl Dispatcher {
    /// Creates a dispatcher for the operator `profile`.
    #[must_use]
    pub fn new(
        dedup: Arc<NotificationDeduplicator>,
        profile: Profile,
        composer: AlertComposer,
        email: Arc<dyn EmailTransport>,
        webhooks: WebhookClient,
    ) -> Self {
        Self {
            dedup,
            interest: profile.interested,
            recipients: profile.emails,
            composer,
            email,
            webhooks,
        }
    }

    /// Shared recency set.
    #[must_use]
    pub fn deduplicator(&self) -> &Arc<NotificationDeduplicator> {
        &self.dedup
    }

    /// Composes and emails the alert for `encounter`.
    ///
    /// Does not consult the recency set; [`dispatch`](Self::dispatch) does.
    ///
    /// # Errors
    ///
    /// Returns a [`NotifyError`] if email delivery fails.
    pub async fn notify(&self, encounter: &WildEncounter) -> Result<(), NotifyError> {
        let alert = self.composer.compose(encounter).await;
        self.email.send(&self.recipients, &alert).await
    }

    /// Dispatches everything for one snapshot. Never fails: delivery
    /// problems are logged and counted.
    pub async fn dispatch(&self, normalized: &NormalizedSnapshot) -> DispatchReport {
        let events = normalized.events();
        let (webhooks, (alerts_sent, alerts_failed, alerts_suppressed)) =
            tokio::join!(self.webhooks.post_all(&events), self.alert_all(normalized));

        DispatchReport {
            webhooks,
            alerts_sent,
            alerts_failed,
            alerts_suppressed,
        }
    }

    async fn alert_all(&self, normalized: &NormalizedSnapshot) -> (usize, usize, usize) {
        let (mut sent, mut failed, mut suppressed) = (0, 0, 0);
        for encounter in normalized.encounters.values() {
            if !self.interest.contains(encounter.pokemon_id) {
                continue;
            }
            if !self.dedup.should_notify(encounter.encounter_id) {
                suppressed += 1;
                continue;
            }
            match self.notify(encounter).await {
                Ok(()) => sent += 1,
                Err(err) => {
                    failed += 1;
                    tracing::warn!(
                        encounter = %encounter.encounter_id,
                        species = encounter.pokemon_id,
                        error = %err,
                        "alert delivery failed"
                    );
                }
            }
        }
        (sent, failed, suppressed)
    }
}
