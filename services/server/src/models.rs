use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
pub struct ParticipantRow {
    pub id: i64,
    pub f_name: String,
    pub l_name: String,
    pub email: String,
    pub phone: String,
    pub institution: String,
    pub payment_verified: bool,
}

impl ParticipantRow {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.f_name, self.l_name).trim_end().to_string()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
pub struct TeamRow {
    pub id: i64,
    pub team_name: String,
    pub payment_verified: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
pub struct TeamMemberRow {
    pub id: i64,
    pub team_id: i64,
    pub f_name: String,
    pub l_name: String,
    pub email: String,
    pub phone: String,
    pub institution: String,
    pub is_leader: bool,
}

impl TeamMemberRow {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.f_name, self.l_name).trim_end().to_string()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
pub struct SegmentRow {
    pub id: i64,
    pub segment_name: String,
    pub code: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
pub struct CompetitionRow {
    pub id: i64,
    pub competition_name: String,
    pub code: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
pub struct TeamCompetitionRow {
    pub id: i64,
    pub competition_name: String,
    pub code: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
pub struct CouponRow {
    pub id: i64,
    pub code: String,
    pub discount: f64,
    pub remaining_uses: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
pub struct GiftRow {
    pub id: i64,
    pub gift_name: String,
}
