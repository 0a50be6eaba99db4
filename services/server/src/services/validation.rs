use serde_json::{Map, Value};
use sqlx::PgPool;
use validator::Validate;

use crate::models::{CompetitionRow, CouponRow, SegmentRow, TeamCompetitionRow};
use crate::types::registration_types::{
    RegistrationRequest, GENDERS, PROJECT_TYPES, T_SHIRT_SIZES,
};

/// Competition code whose team registrations must carry a structured
/// project submission (and vice versa).
pub const FLAGSHIP_AWARD_CODE: &str = "award";

#[derive(Debug)]
pub enum ValidationFailure {
    /// Field -> message map, returned to the client as HTTP 400.
    Invalid(Map<String, Value>),
    Internal(String),
}

/// Code lookups resolved during validation, reused by the transaction so
/// every list is fetched exactly once.
#[derive(Debug, Clone)]
pub struct ResolvedRegistration {
    pub segments: Vec<SegmentRow>,
    pub competitions: Vec<CompetitionRow>,
    pub team_competitions: Vec<TeamCompetitionRow>,
    pub coupon: Option<CouponRow>,
}

/// Runs every check before the transaction starts: no insert is attempted
/// until the whole request is known to be valid.
pub async fn validate_registration(
    pool: &PgPool,
    req: &RegistrationRequest,
) -> Result<ResolvedRegistration, ValidationFailure> {
    let mut errors = Map::new();

    field_checks(req, &mut errors);

    if trx_id_exists(pool, &req.payment.trx_id)
        .await
        .map_err(ValidationFailure::Internal)?
    {
        push_error(
            &mut errors,
            "payment",
            format!("Transaction ID {} already exists", req.payment.trx_id),
        );
    }

    if email_registered(pool, &req.participant.email)
        .await
        .map_err(ValidationFailure::Internal)?
    {
        push_error(
            &mut errors,
            "participant",
            format!("Email {} is already registered", req.participant.email),
        );
    }

    let segments = resolve_segments(pool, &req.segment)
        .await
        .map_err(ValidationFailure::Internal)?;
    report_missing(&mut errors, "segment", "segment", &req.segment, segments.iter().map(|s| s.code.as_str()));

    let competitions = resolve_competitions(pool, &req.competition)
        .await
        .map_err(ValidationFailure::Internal)?;
    report_missing(
        &mut errors,
        "competition",
        "competition",
        &req.competition,
        competitions.iter().map(|c| c.code.as_str()),
    );

    let mut team_competitions = Vec::new();
    if let Some(team_block) = &req.team_competition {
        if team_name_taken(pool, &team_block.team.team_name)
            .await
            .map_err(ValidationFailure::Internal)?
        {
            push_error(
                &mut errors,
                "team_competition",
                format!("Team name '{}' already exists", team_block.team.team_name),
            );
        }

        team_competitions = resolve_team_competitions(pool, &team_block.competition)
            .await
            .map_err(ValidationFailure::Internal)?;
        report_missing(
            &mut errors,
            "team_competition",
            "team competition",
            &team_block.competition,
            team_competitions.iter().map(|c| c.code.as_str()),
        );
    }

    let mut coupon = None;
    if let Some(coupon_input) = &req.coupon {
        match find_coupon(pool, &coupon_input.coupon_code)
            .await
            .map_err(ValidationFailure::Internal)?
        {
            Some(row) if row.remaining_uses > 0 => coupon = Some(row),
            Some(row) => push_error(
                &mut errors,
                "coupon",
                format!("Coupon '{}' has no remaining uses", row.code),
            ),
            None => push_error(
                &mut errors,
                "coupon",
                format!("Invalid coupon code: {}", coupon_input.coupon_code),
            ),
        }
    }

    if errors.is_empty() {
        Ok(ResolvedRegistration {
            segments,
            competitions,
            team_competitions,
            coupon,
        })
    } else {
        Err(ValidationFailure::Invalid(errors))
    }
}

/// Checks that need no database access.
pub fn field_checks(req: &RegistrationRequest, errors: &mut Map<String, Value>) {
    if let Err(e) = req.participant.validate() {
        push_error(errors, "participant", e.to_string());
    }
    check_choice(errors, "participant", "gender", &req.participant.gender, &GENDERS);
    check_optional_choice(
        errors,
        "participant",
        "t-shirt size",
        req.participant.t_shirt_size.as_deref(),
        &T_SHIRT_SIZES,
    );

    if let Err(e) = req.payment.validate() {
        push_error(errors, "payment", e.to_string());
    }

    if let Some(team_block) = &req.team_competition {
        if let Err(e) = team_block.team.validate() {
            push_error(errors, "team_competition", e.to_string());
        }

        let mut member_emails: Vec<&str> = Vec::new();
        for member in &team_block.team.members {
            if let Err(e) = member.validate() {
                push_error(errors, "team_competition", e.to_string());
            }
            check_choice(errors, "team_competition", "gender", &member.gender, &GENDERS);
            check_optional_choice(
                errors,
                "team_competition",
                "t-shirt size",
                member.t_shirt_size.as_deref(),
                &T_SHIRT_SIZES,
            );
            if let Some(email) = member.email.as_deref() {
                if !email.is_empty() {
                    member_emails.push(email);
                }
            }
        }

        let mut deduped = member_emails.clone();
        deduped.sort_unstable();
        deduped.dedup();
        if deduped.len() != member_emails.len() {
            push_error(
                errors,
                "team_competition",
                "Duplicate emails found in team members".to_string(),
            );
        }

        if member_emails.contains(&req.participant.email.as_str()) {
            push_error(
                errors,
                "team_competition",
                "Team leader email cannot be the same as team member email".to_string(),
            );
        }
    }

    check_award_linkage(req, errors);
}

fn check_award_linkage(req: &RegistrationRequest, errors: &mut Map<String, Value>) {
    let team_codes: &[String] = req
        .team_competition
        .as_ref()
        .map(|t| t.competition.as_slice())
        .unwrap_or(&[]);
    let has_flagship = team_codes.iter().any(|c| c == FLAGSHIP_AWARD_CODE);

    match &req.award_project {
        Some(award) => {
            if let Err(e) = award.validate() {
                push_error(errors, "award_project", e.to_string());
            }
            if !PROJECT_TYPES.contains(&award.project_type.as_str()) {
                push_error(
                    errors,
                    "award_project",
                    format!("Invalid project type: {}", award.project_type),
                );
            }
            if req.team_competition.is_none() {
                push_error(
                    errors,
                    "award_project",
                    "Award project requires team competition registration".to_string(),
                );
            } else if !has_flagship {
                push_error(
                    errors,
                    "award_project",
                    format!(
                        "Award project provided but '{}' not in team competitions",
                        FLAGSHIP_AWARD_CODE
                    ),
                );
            }
        }
        None => {
            if has_flagship {
                push_error(
                    errors,
                    "award_project",
                    format!(
                        "Award project details are required when registering for '{}' competition",
                        FLAGSHIP_AWARD_CODE
                    ),
                );
            }
        }
    }
}

fn push_error(errors: &mut Map<String, Value>, field: &str, message: String) {
    // First error per field wins; later ones usually repeat the cause.
    errors
        .entry(field.to_string())
        .or_insert_with(|| Value::String(message));
}

fn check_choice(
    errors: &mut Map<String, Value>,
    field: &str,
    label: &str,
    value: &str,
    allowed: &[&str],
) {
    if !allowed.contains(&value) {
        push_error(errors, field, format!("Invalid {}: {}", label, value));
    }
}

fn check_optional_choice(
    errors: &mut Map<String, Value>,
    field: &str,
    label: &str,
    value: Option<&str>,
    allowed: &[&str],
) {
    if let Some(value) = value {
        if !value.is_empty() && !allowed.contains(&value) {
            push_error(errors, field, format!("Invalid {}: {}", label, value));
        }
    }
}

fn report_missing<'a>(
    errors: &mut Map<String, Value>,
    field: &str,
    label: &str,
    requested: &[String],
    resolved: impl Iterator<Item = &'a str>,
) {
    let resolved: Vec<&str> = resolved.collect();
    let missing: Vec<&str> = requested
        .iter()
        .map(|c| c.as_str())
        .filter(|c| !resolved.contains(c))
        .collect();

    if !missing.is_empty() {
        push_error(
            errors,
            field,
            format!("Invalid {} codes: {}", label, missing.join(", ")),
        );
    }
}

async fn trx_id_exists(pool: &PgPool, trx_id: &str) -> Result<bool, String> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM payments WHERE trx_id = $1)")
        .bind(trx_id)
        .fetch_one(pool)
        .await
        .map_err(|e| format!("Failed to check transaction id: {}", e))
}

async fn email_registered(pool: &PgPool, email: &str) -> Result<bool, String> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM participants WHERE email = $1)")
        .bind(email)
        .fetch_one(pool)
        .await
        .map_err(|e| format!("Failed to check participant email: {}", e))
}

async fn team_name_taken(pool: &PgPool, team_name: &str) -> Result<bool, String> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM teams WHERE team_name = $1)")
        .bind(team_name)
        .fetch_one(pool)
        .await
        .map_err(|e| format!("Failed to check team name: {}", e))
}

async fn resolve_segments(pool: &PgPool, codes: &[String]) -> Result<Vec<SegmentRow>, String> {
    if codes.is_empty() {
        return Ok(Vec::new());
    }
    sqlx::query_as::<_, SegmentRow>(
        "SELECT id, segment_name, code FROM segments WHERE code = ANY($1)",
    )
    .bind(codes)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("Failed to resolve segment codes: {}", e))
}

async fn resolve_competitions(
    pool: &PgPool,
    codes: &[String],
) -> Result<Vec<CompetitionRow>, String> {
    if codes.is_empty() {
        return Ok(Vec::new());
    }
    sqlx::query_as::<_, CompetitionRow>(
        "SELECT id, competition_name, code FROM competitions WHERE code = ANY($1)",
    )
    .bind(codes)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("Failed to resolve competition codes: {}", e))
}

async fn resolve_team_competitions(
    pool: &PgPool,
    codes: &[String],
) -> Result<Vec<TeamCompetitionRow>, String> {
    if codes.is_empty() {
        return Ok(Vec::new());
    }
    sqlx::query_as::<_, TeamCompetitionRow>(
        "SELECT id, competition_name, code FROM team_competitions WHERE code = ANY($1)",
    )
    .bind(codes)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("Failed to resolve team competition codes: {}", e))
}

pub async fn find_coupon(pool: &PgPool, code: &str) -> Result<Option<CouponRow>, String> {
    sqlx::query_as::<_, CouponRow>(
        "SELECT id, code, discount, remaining_uses FROM coupons WHERE code = $1",
    )
    .bind(code)
    .fetch_optional(pool)
    .await
    .map_err(|e| format!("Failed to look up coupon: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::registration_types::{
        AwardProjectInput, CouponInput, ParticipantInput, PaymentInput, TeamCompetitionInput,
        TeamInfoInput, TeamMemberInput,
    };

    fn participant() -> ParticipantInput {
        ParticipantInput {
            full_name: "Ada Lovelace".to_string(),
            gender: "F".to_string(),
            email: "ada@example.com".to_string(),
            phone: "0170000000".to_string(),
            age: 28,
            institution: "Analytical Society".to_string(),
            institution_id: "AS-01".to_string(),
            address: None,
            guardian_phone: None,
            t_shirt_size: Some("M".to_string()),
        }
    }

    fn member(name: &str, email: Option<&str>) -> TeamMemberInput {
        TeamMemberInput {
            full_name: name.to_string(),
            gender: "F".to_string(),
            email: email.map(|e| e.to_string()),
            phone: "0170000001".to_string(),
            age: 25,
            institution: "Analytical Society".to_string(),
            institution_id: "AS-02".to_string(),
            address: None,
            t_shirt_size: None,
        }
    }

    fn team_block(codes: Vec<&str>, members: Vec<TeamMemberInput>) -> TeamCompetitionInput {
        TeamCompetitionInput {
            team: TeamInfoInput {
                team_name: "Alpha".to_string(),
                members,
            },
            competition: codes.into_iter().map(|c| c.to_string()).collect(),
        }
    }

    fn request() -> RegistrationRequest {
        RegistrationRequest {
            participant: participant(),
            payment: PaymentInput {
                amount: 1500,
                phone: "0170000000".to_string(),
                method: None,
                trx_id: "TX1".to_string(),
            },
            segment: vec!["tech".to_string()],
            competition: vec![],
            team_competition: None,
            award_project: None,
            coupon: None,
        }
    }

    fn errors_for(req: &RegistrationRequest) -> Map<String, Value> {
        let mut errors = Map::new();
        field_checks(req, &mut errors);
        errors
    }

    #[test]
    fn clean_request_has_no_field_errors() {
        assert!(errors_for(&request()).is_empty());
    }

    #[test]
    fn invalid_gender_is_reported() {
        let mut req = request();
        req.participant.gender = "X".to_string();

        let errors = errors_for(&req);
        assert!(errors.contains_key("participant"));
    }

    #[test]
    fn duplicate_member_emails_are_rejected() {
        let mut req = request();
        req.team_competition = Some(team_block(
            vec!["robo"],
            vec![
                member("Grace Hopper", Some("grace@example.com")),
                member("Edith Clarke", Some("grace@example.com")),
            ],
        ));

        let errors = errors_for(&req);
        assert_eq!(
            errors.get("team_competition").and_then(|v| v.as_str()),
            Some("Duplicate emails found in team members")
        );
    }

    #[test]
    fn leader_email_cannot_repeat_among_members() {
        let mut req = request();
        req.team_competition = Some(team_block(
            vec!["robo"],
            vec![member("Grace Hopper", Some("ada@example.com"))],
        ));

        let errors = errors_for(&req);
        assert_eq!(
            errors.get("team_competition").and_then(|v| v.as_str()),
            Some("Team leader email cannot be the same as team member email")
        );
    }

    #[test]
    fn flagship_code_requires_award_project() {
        let mut req = request();
        req.team_competition = Some(team_block(vec![FLAGSHIP_AWARD_CODE], vec![]));

        let errors = errors_for(&req);
        assert!(errors.contains_key("award_project"));
    }

    #[test]
    fn award_project_requires_flagship_code() {
        let mut req = request();
        req.team_competition = Some(team_block(vec!["robo"], vec![]));
        req.award_project = Some(AwardProjectInput {
            project_name: "Difference Engine".to_string(),
            project_type: "engineering".to_string(),
            project_description: "A mechanical computer".to_string(),
            pitch_deck: None,
            video_link: None,
        });

        let errors = errors_for(&req);
        assert!(errors.contains_key("award_project"));
    }

    #[test]
    fn award_project_without_team_is_rejected() {
        let mut req = request();
        req.award_project = Some(AwardProjectInput {
            project_name: "Difference Engine".to_string(),
            project_type: "engineering".to_string(),
            project_description: "A mechanical computer".to_string(),
            pitch_deck: None,
            video_link: None,
        });

        let errors = errors_for(&req);
        assert_eq!(
            errors.get("award_project").and_then(|v| v.as_str()),
            Some("Award project requires team competition registration")
        );
    }

    #[test]
    fn linked_award_and_flagship_pass() {
        let mut req = request();
        req.team_competition = Some(team_block(vec![FLAGSHIP_AWARD_CODE, "robo"], vec![]));
        req.award_project = Some(AwardProjectInput {
            project_name: "Difference Engine".to_string(),
            project_type: "engineering".to_string(),
            project_description: "A mechanical computer".to_string(),
            pitch_deck: None,
            video_link: None,
        });
        req.coupon = Some(CouponInput {
            coupon_code: "SAVE10".to_string(),
        });

        assert!(errors_for(&req).is_empty());
    }
}
