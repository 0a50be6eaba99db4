use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to one notifiable entity, rendered as `p_{id}` or `t_{id}`.
/// The same form is scanned back from QR codes at the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Participant(i64),
    Team(i64),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Participant(id) => write!(f, "p_{}", id),
            EntityRef::Team(id) => write!(f, "t_{}", id),
        }
    }
}

impl FromStr for EntityRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, raw_id) = s
            .split_once('_')
            .ok_or_else(|| format!("Invalid entity ref: {}", s))?;

        let id: i64 = raw_id
            .parse()
            .map_err(|_| format!("Invalid entity ref: {}", s))?;

        match kind {
            "p" => Ok(EntityRef::Participant(id)),
            "t" => Ok(EntityRef::Team(id)),
            _ => Err(format!("Invalid entity ref: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantFacts {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub institution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFacts {
    pub trx_id: String,
    pub amount: i64,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamFacts {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberFacts {
    pub name: String,
    pub email: String,
    pub institution: String,
    pub is_leader: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationPayload {
    pub participant: ParticipantFacts,
    pub payment: PaymentFacts,
    pub segments: Vec<String>,
    pub competitions: Vec<String>,
    pub team: Option<TeamFacts>,
    pub team_members: Vec<MemberFacts>,
    pub team_competitions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamBroadcastPayload {
    pub team: TeamFacts,
    pub members: Vec<MemberFacts>,
    pub team_competitions: Vec<String>,
    pub payment: PaymentFacts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamVerificationFacts {
    pub id: i64,
    pub name: String,
    pub member_emails: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentVerificationPayload {
    pub participant: ParticipantFacts,
    pub segments: Vec<String>,
    pub competitions: Vec<String>,
    pub team: Option<TeamVerificationFacts>,
}

/// Everything a worker needs is denormalized into the payload at enqueue
/// time; workers never read the relational store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "job_type", content = "payload", rename_all = "snake_case")]
pub enum JobPayload {
    RegistrationConfirmation(RegistrationPayload),
    TeamRegistrationBroadcast(TeamBroadcastPayload),
    PaymentVerification(PaymentVerificationPayload),
}

impl JobPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            JobPayload::RegistrationConfirmation(_) => "registration_confirmation",
            JobPayload::TeamRegistrationBroadcast(_) => "team_registration_broadcast",
            JobPayload::PaymentVerification(_) => "payment_verification",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub job_id: Uuid,
    pub idempotency_key: String,
    pub attempt_count: u32,
    #[serde(flatten)]
    pub payload: JobPayload,
}

impl NotificationJob {
    pub fn registration_confirmation(payload: RegistrationPayload) -> Self {
        let key = format!(
            "reg_email_{}_{}",
            payload.participant.id, payload.payment.trx_id
        );
        Self::new(key, JobPayload::RegistrationConfirmation(payload))
    }

    pub fn team_registration_broadcast(payload: TeamBroadcastPayload) -> Self {
        let key = format!("team_reg_email_{}_{}", payload.team.id, payload.payment.trx_id);
        Self::new(key, JobPayload::TeamRegistrationBroadcast(payload))
    }

    pub fn payment_verification(payload: PaymentVerificationPayload) -> Self {
        let key = format!("payment_email_{}", payload.entity_ref());
        Self::new(key, JobPayload::PaymentVerification(payload))
    }

    fn new(idempotency_key: String, payload: JobPayload) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            idempotency_key,
            attempt_count: 0,
            payload,
        }
    }

    /// The same job rescheduled for its next delivery attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt_count: self.attempt_count + 1,
            ..self.clone()
        }
    }
}

impl PaymentVerificationPayload {
    /// Team verification tickets are addressed to the team, not the leader.
    pub fn entity_ref(&self) -> EntityRef {
        match &self.team {
            Some(team) => EntityRef::Team(team.id),
            None => EntityRef::Participant(self.participant.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant() -> ParticipantFacts {
        ParticipantFacts {
            id: 7,
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "0170000000".to_string(),
            institution: "Analytical Society".to_string(),
        }
    }

    #[test]
    fn entity_ref_round_trip() {
        assert_eq!("p_12".parse::<EntityRef>(), Ok(EntityRef::Participant(12)));
        assert_eq!("t_3".parse::<EntityRef>(), Ok(EntityRef::Team(3)));
        assert_eq!(EntityRef::Participant(12).to_string(), "p_12");
        assert_eq!(EntityRef::Team(3).to_string(), "t_3");
    }

    #[test]
    fn entity_ref_rejects_garbage() {
        assert!("x_12".parse::<EntityRef>().is_err());
        assert!("p_abc".parse::<EntityRef>().is_err());
        assert!("12".parse::<EntityRef>().is_err());
    }

    #[test]
    fn registration_key_includes_trx_id() {
        let job = NotificationJob::registration_confirmation(RegistrationPayload {
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
        });

        assert_eq!(job.idempotency_key, "reg_email_7_TX1");
        assert_eq!(job.attempt_count, 0);
    }

    #[test]
    fn verification_key_prefers_team_ref() {
        let solo = NotificationJob::payment_verification(PaymentVerificationPayload {
            participant: participant(),
            segments: vec![],
            competitions: vec![],
            team: None,
        });
        assert_eq!(solo.idempotency_key, "payment_email_p_7");

        let team = NotificationJob::payment_verification(PaymentVerificationPayload {
            participant: participant(),
            segments: vec![],
            competitions: vec![],
            team: Some(TeamVerificationFacts {
                id: 4,
                name: "Alpha".to_string(),
                member_emails: vec![],
            }),
        });
        assert_eq!(team.idempotency_key, "payment_email_t_4");
    }

    #[test]
    fn wire_shape_round_trip() {
        let job = NotificationJob::payment_verification(PaymentVerificationPayload {
            participant: participant(),
            segments: vec!["Tech Showcase".to_string()],
            competitions: vec![],
            team: None,
        });

        let raw = serde_json::to_value(&job).unwrap();
        assert_eq!(raw["job_type"], "payment_verification");
        assert!(raw["payload"]["participant"]["email"].is_string());
        assert_eq!(raw["attempt_count"], 0);

        let back: NotificationJob = serde_json::from_value(raw).unwrap();
        assert_eq!(back.idempotency_key, job.idempotency_key);
    }

    #[test]
    fn next_attempt_increments_only_the_counter() {
        let job = NotificationJob::payment_verification(PaymentVerificationPayload {
            participant: participant(),
            segments: vec![],
            competitions: vec![],
            team: None,
        });

        let retried = job.next_attempt();
        assert_eq!(retried.attempt_count, 1);
        assert_eq!(retried.idempotency_key, job.idempotency_key);
        assert_eq!(retried.job_id, job.job_id);
    }
}
