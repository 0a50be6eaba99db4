use std::path::PathBuf;
use std::time::Duration;

use log::{error, info, warn};
use serde_json::json;

use crate::idempotency::IdempotencyStore;
use crate::job::{JobPayload, NotificationJob, PaymentVerificationPayload, RegistrationPayload, TeamBroadcastPayload};
use crate::mailer::{AttachedFile, InlinePart, Mailer, OutboundEmail};
use crate::qr::QrGenerator;
use crate::render::{Renderer, Template};

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_BASE_DELAY_SECS: u64 = 60;
/// A retried duplicate within this window after a crash does not resend.
pub const SENT_MARKER_TTL_SECS: i64 = 604_800;

/// Explicit attempt outcome inspected by the consumer; retry control flow
/// never travels through errors.
#[derive(Debug)]
pub enum JobOutcome {
    Sent,
    Duplicate,
    Retry { error: String, delay: Duration },
    Terminal { error: String },
}

pub fn retry_delay(attempt_count: u32) -> Duration {
    Duration::from_secs(RETRY_BASE_DELAY_SECS * 2u64.pow(attempt_count))
}

pub fn failure_outcome(job: &NotificationJob, error: String) -> JobOutcome {
    if job.attempt_count >= MAX_RETRIES {
        error!(
            "Max retries exceeded for {} job {} (key {}): {}",
            job.payload.kind(),
            job.job_id,
            job.idempotency_key,
            error
        );
        JobOutcome::Terminal { error }
    } else {
        JobOutcome::Retry {
            delay: retry_delay(job.attempt_count),
            error,
        }
    }
}

pub struct Dispatcher<S, R, M> {
    store: S,
    renderer: R,
    mailer: M,
    qr: QrGenerator,
    logo_path: Option<PathBuf>,
    event_name: String,
}

impl<S, R, M> Dispatcher<S, R, M>
where
    S: IdempotencyStore,
    R: Renderer,
    M: Mailer,
{
    pub fn new(
        store: S,
        renderer: R,
        mailer: M,
        qr: QrGenerator,
        logo_path: Option<PathBuf>,
        event_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            renderer,
            mailer,
            qr,
            logo_path,
            event_name: event_name.into(),
        }
    }

    /// Runs one delivery attempt through the job state machine:
    /// idempotency check, render, artifacts, send, mark-sent.
    pub async fn process(&self, job: &NotificationJob) -> JobOutcome {
        match self.store.seen(&job.idempotency_key).await {
            Ok(true) => {
                info!(
                    "Notification already sent for {}, skipping",
                    job.idempotency_key
                );
                return JobOutcome::Duplicate;
            }
            Ok(false) => {}
            Err(e) => {
                // Fail open: attempting a duplicate beats dropping a send.
                warn!(
                    "Idempotency store unavailable for {}, assuming unsent: {}",
                    job.idempotency_key, e
                );
            }
        }

        let result = match &job.payload {
            JobPayload::RegistrationConfirmation(payload) => {
                self.send_registration(payload).await
            }
            JobPayload::TeamRegistrationBroadcast(payload) => {
                self.send_team_broadcast(payload).await
            }
            JobPayload::PaymentVerification(payload) => {
                self.send_payment_verification(payload).await
            }
        };

        match result {
            Ok(()) => {
                if let Err(e) = self
                    .store
                    .mark(&job.idempotency_key, SENT_MARKER_TTL_SECS)
                    .await
                {
                    warn!(
                        "Failed to record idempotency key {}: {}",
                        job.idempotency_key, e
                    );
                }
                info!(
                    "Sent {} notification for {}",
                    job.payload.kind(),
                    job.idempotency_key
                );
                JobOutcome::Sent
            }
            Err(e) => failure_outcome(job, e),
        }
    }

    async fn send_registration(&self, payload: &RegistrationPayload) -> Result<(), String> {
        let other_members: Vec<_> = payload
            .team_members
            .iter()
            .filter(|m| !m.is_leader)
            .map(|m| json!({"name": m.name, "institution": m.institution}))
            .collect();

        let mut context = json!({
            "participant_name": payload.participant.name,
            "participant_id": payload.participant.id,
            "participant_email": payload.participant.email,
            "participant_phone": payload.participant.phone,
            "participant_institution": payload.participant.institution,
            "trx_id": payload.payment.trx_id,
            "amount": payload.payment.amount,
            "payment_phone": payload.payment.phone,
            "segments": payload.segments,
            "competitions": payload.competitions,
        });
        let subject = match &payload.team {
            Some(team) => {
                context["team_name"] = json!(team.name);
                context["team_members"] = json!(other_members);
                context["team_competitions"] = json!(payload.team_competitions);
                format!(
                    "Registration Successful - Team {} - {}",
                    team.name, self.event_name
                )
            }
            None => format!("Registration Successful - {}", self.event_name),
        };

        let html_body = self
            .renderer
            .render(Template::RegistrationConfirmation, &context)?;

        self.mailer
            .send(OutboundEmail {
                to: vec![payload.participant.email.clone()],
                cc: vec![],
                subject,
                text_body: format!(
                    "Thank you for registering for {}! Please view this email in HTML format.",
                    self.event_name
                ),
                html_body,
                inline_parts: self.logo_part().into_iter().collect(),
                attachments: vec![],
            })
            .await
    }

    async fn send_team_broadcast(&self, payload: &TeamBroadcastPayload) -> Result<(), String> {
        let recipients: Vec<_> = payload
            .members
            .iter()
            .filter(|m| !m.email.is_empty())
            .collect();

        if recipients.is_empty() {
            warn!("No addressable members for team {}", payload.team.id);
            return Ok(());
        }

        let mut failures: Vec<String> = Vec::new();
        let mut delivered = 0usize;

        for member in &recipients {
            let others: Vec<_> = payload
                .members
                .iter()
                .filter(|m| m.email != member.email || m.name != member.name)
                .map(|m| json!({"name": m.name, "institution": m.institution}))
                .collect();

            let context = json!({
                "participant_name": member.name,
                "participant_email": member.email,
                "participant_institution": member.institution,
                "trx_id": payload.payment.trx_id,
                "amount": payload.payment.amount,
                "payment_phone": payload.payment.phone,
                "segments": [],
                "competitions": [],
                "team_name": payload.team.name,
                "team_members": others,
                "team_competitions": payload.team_competitions,
            });

            let html_body = match self
                .renderer
                .render(Template::RegistrationConfirmation, &context)
            {
                Ok(html) => html,
                Err(e) => {
                    failures.push(format!("{}: {}", member.email, e));
                    continue;
                }
            };

            let role = if member.is_leader {
                "Team Leader"
            } else {
                "Team Member"
            };
            let send_result = self
                .mailer
                .send(OutboundEmail {
                    to: vec![member.email.clone()],
                    cc: vec![],
                    subject: format!(
                        "Registration Successful - {} - Team {} - {}",
                        role, payload.team.name, self.event_name
                    ),
                    text_body: format!(
                        "Thank you for registering for {}! Please view this email in HTML format.",
                        self.event_name
                    ),
                    html_body,
                    inline_parts: self.logo_part().into_iter().collect(),
                    attachments: vec![],
                })
                .await;

            match send_result {
                Ok(()) => delivered += 1,
                Err(e) => failures.push(format!("{}: {}", member.email, e)),
            }
        }

        if !failures.is_empty() {
            warn!(
                "Team {} broadcast: {} of {} sends failed: {}",
                payload.team.id,
                failures.len(),
                recipients.len(),
                failures.join("; ")
            );
        }

        if delivered > 0 {
            Ok(())
        } else {
            Err(format!(
                "All {} member sends failed for team {}: {}",
                recipients.len(),
                payload.team.id,
                failures.join("; ")
            ))
        }
    }

    async fn send_payment_verification(
        &self,
        payload: &PaymentVerificationPayload,
    ) -> Result<(), String> {
        let entity_ref = payload.entity_ref().to_string();

        // The ticket is the point of this email: no QR, no send.
        let qr_bytes = self.qr.generate(&entity_ref)?;
        let qr_filename = format!("{}_qr.jpg", entity_ref);

        let mut cc: Vec<String> = Vec::new();
        if let Some(team) = &payload.team {
            for email in &team.member_emails {
                if !email.is_empty()
                    && *email != payload.participant.email
                    && !cc.contains(email)
                {
                    cc.push(email.clone());
                }
            }
        }

        let mut context = json!({
            "participant_name": payload.participant.name,
            "participant_id": payload.participant.id,
            "participant_email": payload.participant.email,
            "qr_id": entity_ref,
            "segments": payload.segments,
            "competitions": payload.competitions,
        });
        let subject = match &payload.team {
            Some(team) => {
                context["team_name"] = json!(team.name);
                format!("Payment Verified - Team {} - {}", team.name, self.event_name)
            }
            None => format!("Payment Verified - {} Registration", self.event_name),
        };

        let html_body = self.renderer.render(Template::PaymentVerification, &context)?;

        let mut inline_parts: Vec<InlinePart> = self.logo_part().into_iter().collect();
        inline_parts.push(InlinePart {
            content_id: "qr_code".to_string(),
            filename: qr_filename.clone(),
            mime: "image/jpeg".to_string(),
            bytes: qr_bytes.clone(),
        });

        self.mailer
            .send(OutboundEmail {
                to: vec![payload.participant.email.clone()],
                cc,
                subject,
                text_body: "Your payment has been verified. Please view this email in HTML format."
                    .to_string(),
                html_body,
                inline_parts,
                attachments: vec![AttachedFile {
                    filename: qr_filename,
                    mime: "image/jpeg".to_string(),
                    bytes: qr_bytes,
                }],
            })
            .await
    }

    /// Best effort: a missing logo is logged, never fatal.
    fn logo_part(&self) -> Option<InlinePart> {
        let path = self.logo_path.as_ref()?;
        match std::fs::read(path) {
            Ok(bytes) => Some(InlinePart {
                content_id: "logo".to_string(),
                filename: "logo.png".to_string(),
                mime: "image/png".to_string(),
                bytes,
            }),
            Err(e) => {
                warn!("Logo not found at {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::{IdempotencyStore, InMemoryIdempotencyStore, UnavailableStore};
    use crate::job::{
        MemberFacts, ParticipantFacts, PaymentFacts, TeamFacts, TeamVerificationFacts,
    };
    use crate::mailer::fakes::RecordingMailer;
    use crate::render::HtmlRenderer;

    fn dispatcher<S: IdempotencyStore>(
        store: S,
        mailer: RecordingMailer,
    ) -> Dispatcher<S, HtmlRenderer, RecordingMailer> {
        Dispatcher::new(
            store,
            HtmlRenderer::new("TechFest"),
            mailer,
            QrGenerator::new(None),
            None,
            "TechFest",
        )
    }

    fn participant() -> ParticipantFacts {
        ParticipantFacts {
            id: 1,
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "0170000000".to_string(),
            institution: "Analytical Society".to_string(),
        }
    }

    fn registration_job() -> NotificationJob {
        NotificationJob::registration_confirmation(RegistrationPayload {
            participant: participant(),
            payment: PaymentFacts {
                trx_id: "TX1".to_string(),
                amount: 1500,
                phone: "0170000000".to_string(),
            },
            segments: vec!["Tech Showcase".to_string()],
            competitions: vec![],
            team: None,
            team_members: vec![],
            team_competitions: vec![],
        })
    }

    fn member(name: &str, email: &str, leader: bool) -> MemberFacts {
        MemberFacts {
            name: name.to_string(),
            email: email.to_string(),
            institution: "Analytical Society".to_string(),
            is_leader: leader,
        }
    }

    fn broadcast_job() -> NotificationJob {
        NotificationJob::team_registration_broadcast(TeamBroadcastPayload {
            team: TeamFacts {
                id: 4,
                name: "Alpha".to_string(),
            },
            members: vec![
                member("Ada Lovelace", "ada@example.com", true),
                member("Grace Hopper", "grace@example.com", false),
                member("Edith Clarke", "edith@example.com", false),
            ],
            team_competitions: vec!["Robotics Sprint".to_string()],
            payment: PaymentFacts {
                trx_id: "TX2".to_string(),
                amount: 3000,
                phone: "0170000000".to_string(),
            },
        })
    }

    fn verification_job(team: Option<TeamVerificationFacts>) -> NotificationJob {
        NotificationJob::payment_verification(PaymentVerificationPayload {
            participant: participant(),
            segments: vec!["Tech Showcase".to_string()],
            competitions: vec![],
            team,
        })
    }

    #[tokio::test]
    async fn resend_after_success_is_suppressed() {
        let d = dispatcher(InMemoryIdempotencyStore::new(), RecordingMailer::new());
        let job = registration_job();

        assert!(matches!(d.process(&job).await, JobOutcome::Sent));
        assert!(matches!(d.process(&job).await, JobOutcome::Duplicate));
        assert_eq!(d.mailer.sent_count(), 1);
    }

    #[tokio::test]
    async fn store_outage_fails_open() {
        let d = dispatcher(UnavailableStore, RecordingMailer::new());

        assert!(matches!(d.process(&registration_job()).await, JobOutcome::Sent));
        assert_eq!(d.mailer.sent_count(), 1);
    }

    #[tokio::test]
    async fn retry_delays_double_then_terminal() {
        let d = dispatcher(InMemoryIdempotencyStore::new(), RecordingMailer::failing(10));
        let mut job = registration_job();

        for expected_secs in [60, 120, 240] {
            match d.process(&job).await {
                JobOutcome::Retry { delay, .. } => {
                    assert_eq!(delay, Duration::from_secs(expected_secs));
                }
                other => panic!("expected retry, got {:?}", other),
            }
            job = job.next_attempt();
        }

        assert!(matches!(d.process(&job).await, JobOutcome::Terminal { .. }));
    }

    #[tokio::test]
    async fn broadcast_survives_single_member_failure() {
        let mailer = RecordingMailer::rejecting(vec!["grace@example.com".to_string()]);
        let d = dispatcher(InMemoryIdempotencyStore::new(), mailer);

        assert!(matches!(d.process(&broadcast_job()).await, JobOutcome::Sent));
        assert_eq!(d.mailer.sent_count(), 2);
    }

    #[tokio::test]
    async fn broadcast_with_no_deliveries_is_retryable() {
        let mailer = RecordingMailer::rejecting(vec![
            "ada@example.com".to_string(),
            "grace@example.com".to_string(),
            "edith@example.com".to_string(),
        ]);
        let d = dispatcher(InMemoryIdempotencyStore::new(), mailer);

        assert!(matches!(
            d.process(&broadcast_job()).await,
            JobOutcome::Retry { .. }
        ));
    }

    #[tokio::test]
    async fn team_verification_ccs_members_and_attaches_ticket() {
        let d = dispatcher(InMemoryIdempotencyStore::new(), RecordingMailer::new());
        let job = verification_job(Some(TeamVerificationFacts {
            id: 4,
            name: "Alpha".to_string(),
            member_emails: vec![
                "ada@example.com".to_string(),
                "grace@example.com".to_string(),
                "edith@example.com".to_string(),
            ],
        }));

        assert!(matches!(d.process(&job).await, JobOutcome::Sent));

        let sent = d.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["ada@example.com".to_string()]);
        assert_eq!(
            sent[0].cc,
            vec!["grace@example.com".to_string(), "edith@example.com".to_string()]
        );
        assert!(sent[0]
            .inline_parts
            .iter()
            .any(|p| p.content_id == "qr_code"));
        assert_eq!(sent[0].attachments.len(), 1);
        assert_eq!(sent[0].attachments[0].filename, "t_4_qr.jpg");
    }

    #[tokio::test]
    async fn solo_verification_addresses_participant_only() {
        let d = dispatcher(InMemoryIdempotencyStore::new(), RecordingMailer::new());

        assert!(matches!(d.process(&verification_job(None)).await, JobOutcome::Sent));

        let sent = d.mailer.sent.lock().unwrap();
        assert_eq!(sent[0].to, vec!["ada@example.com".to_string()]);
        assert!(sent[0].cc.is_empty());
        assert_eq!(sent[0].attachments[0].filename, "p_1_qr.jpg");
    }
}
