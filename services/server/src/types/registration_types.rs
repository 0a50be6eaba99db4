use serde::Deserialize;
use validator::Validate;

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct ParticipantInput {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,

    pub gender: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 6, message = "Phone must be atleast 6 digits"))]
    pub phone: String,

    #[validate(range(min = 1, max = 120, message = "Age must be between 1 and 120"))]
    pub age: i32,

    #[validate(length(min = 1, message = "Institution is required"))]
    pub institution: String,

    #[validate(length(min = 1, message = "Institution ID is required"))]
    pub institution_id: String,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub guardian_phone: Option<String>,

    #[serde(default)]
    pub t_shirt_size: Option<String>,
}

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct PaymentInput {
    #[validate(range(min = 1, message = "Amount must be greater than 0"))]
    pub amount: i64,

    #[validate(length(min = 6, message = "Payment phone must be atleast 6 digits"))]
    pub phone: String,

    #[serde(default)]
    pub method: Option<String>,

    #[validate(length(min = 1, message = "Transaction ID is required"))]
    pub trx_id: String,
}

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct TeamMemberInput {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,

    pub gender: String,

    // Only the leader is required to be reachable.
    #[serde(default)]
    pub email: Option<String>,

    #[validate(length(min = 6, message = "Phone must be atleast 6 digits"))]
    pub phone: String,

    #[validate(range(min = 1, max = 120, message = "Age must be between 1 and 120"))]
    pub age: i32,

    #[validate(length(min = 1, message = "Institution is required"))]
    pub institution: String,

    #[validate(length(min = 1, message = "Institution ID is required"))]
    pub institution_id: String,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub t_shirt_size: Option<String>,
}

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct TeamInfoInput {
    #[validate(length(min = 1, max = 100, message = "Team name is required"))]
    pub team_name: String,

    #[serde(rename = "participant")]
    pub members: Vec<TeamMemberInput>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TeamCompetitionInput {
    pub team: TeamInfoInput,
    pub competition: Vec<String>,
}

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct AwardProjectInput {
    #[validate(length(min = 1, max = 200, message = "Project name is required"))]
    pub project_name: String,

    pub project_type: String,

    #[validate(length(min = 1, message = "Project description is required"))]
    pub project_description: String,

    #[serde(default)]
    #[validate(url(message = "Pitch deck must be a URL"))]
    pub pitch_deck: Option<String>,

    #[serde(default)]
    #[validate(url(message = "Video link must be a URL"))]
    pub video_link: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CouponInput {
    pub coupon_code: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RegistrationRequest {
    pub participant: ParticipantInput,
    pub payment: PaymentInput,

    #[serde(default)]
    pub segment: Vec<String>,

    #[serde(default)]
    pub competition: Vec<String>,

    #[serde(default)]
    pub team_competition: Option<TeamCompetitionInput>,

    #[serde(default)]
    pub award_project: Option<AwardProjectInput>,

    #[serde(default)]
    pub coupon: Option<CouponInput>,
}

#[derive(Deserialize, Debug)]
pub struct PaymentVerificationRequest {
    pub id: i64,
}

#[derive(Deserialize, Debug)]
pub struct GiftReceivedRequest {
    pub gift_name: String,
}

pub const GENDERS: [&str; 3] = ["M", "F", "O"];
pub const T_SHIRT_SIZES: [&str; 6] = ["XS", "S", "M", "L", "XL", "XXL"];
pub const PROJECT_TYPES: [&str; 10] = [
    "robotics",
    "ai",
    "cs",
    "data_science",
    "environment",
    "health",
    "engineering",
    "education",
    "media",
    "other",
];
