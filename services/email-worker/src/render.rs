use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    RegistrationConfirmation,
    PaymentVerification,
}

/// Template rendering seam: one shared renderer is injected into the
/// dispatcher and used by every job type.
pub trait Renderer: Send + Sync {
    fn render(&self, template: Template, context: &Value) -> Result<String, String>;
}

/// Built-in HTML bodies. Context keys mirror the enqueue-time payloads:
/// `participant_name`, `trx_id`, `segments`, `team_name`, `qr_id`, ...
pub struct HtmlRenderer {
    event_name: String,
}

impl HtmlRenderer {
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
        }
    }
}

impl Renderer for HtmlRenderer {
    fn render(&self, template: Template, context: &Value) -> Result<String, String> {
        let participant_name = required_text(context, "participant_name")?;

        match template {
            Template::RegistrationConfirmation => {
                Ok(self.registration_body(&participant_name, context))
            }
            Template::PaymentVerification => {
                let qr_id = required_text(context, "qr_id")?;
                Ok(self.verification_body(&participant_name, &qr_id, context))
            }
        }
    }
}

impl HtmlRenderer {
    fn registration_body(&self, participant_name: &str, context: &Value) -> String {
        let segments = item_list(context, "segments");
        let competitions = item_list(context, "competitions");
        let team_competitions = item_list(context, "team_competitions");
        let team_block = match text(context, "team_name") {
            Some(team_name) => format!(
                r#"<h3 style="color: #2563eb;">Team: {team_name}</h3>
        {members}"#,
                members = member_list(context),
            ),
            None => String::new(),
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Registration Successful</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <img src="cid:logo" alt="{event_name}" style="max-height: 80px;">
        <h2 style="color: #2563eb;">Registration Successful</h2>
        <p>Dear {participant_name},</p>
        <p>Thank you for registering for {event_name}. Your registration has been
        received and your payment is awaiting verification.</p>
        <table style="border-collapse: collapse;">
            <tr><td style="padding: 4px 12px 4px 0; color: #666;">Transaction ID</td><td>{trx_id}</td></tr>
            <tr><td style="padding: 4px 12px 4px 0; color: #666;">Amount</td><td>{amount}</td></tr>
            <tr><td style="padding: 4px 12px 4px 0; color: #666;">Payment phone</td><td>{payment_phone}</td></tr>
        </table>
        {segments}
        {competitions}
        {team_block}
        <p style="color: #666; font-size: 14px;">
            You will receive your entry ticket once your payment is verified.
        </p>
    </div>
</body>
</html>"#,
            event_name = self.event_name,
            trx_id = text(context, "trx_id").unwrap_or_default(),
            amount = text(context, "amount").unwrap_or_default(),
            payment_phone = text(context, "payment_phone").unwrap_or_default(),
            segments = titled_list("Segments", &segments),
            competitions = titled_list("Competitions", &competitions),
            team_block = if team_block.is_empty() {
                team_block
            } else {
                format!("{}{}", team_block, titled_list("Team competitions", &team_competitions))
            },
        )
    }

    fn verification_body(&self, participant_name: &str, qr_id: &str, context: &Value) -> String {
        let segments = item_list(context, "segments");
        let competitions = item_list(context, "competitions");
        let team_line = match text(context, "team_name") {
            Some(team_name) => format!(
                r#"<p>This ticket admits team <strong>{team_name}</strong>.</p>"#
            ),
            None => String::new(),
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Payment Verified</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <img src="cid:logo" alt="{event_name}" style="max-height: 80px;">
        <h2 style="color: #16a34a;">Payment Verified</h2>
        <p>Dear {participant_name},</p>
        <p>Your payment for {event_name} has been verified. Present the QR code
        below at the entrance.</p>
        <p style="margin: 30px 0; text-align: center;">
            <img src="cid:qr_code" alt="{qr_id}" style="width: 260px; height: 260px;">
        </p>
        <p style="text-align: center; color: #666; font-size: 14px;">Ticket ID: {qr_id}</p>
        {team_line}
        {segments}
        {competitions}
    </div>
</body>
</html>"#,
            event_name = self.event_name,
            segments = titled_list("Segments", &segments),
            competitions = titled_list("Competitions", &competitions),
        )
    }
}

fn text(context: &Value, key: &str) -> Option<String> {
    match context.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn required_text(context: &Value, key: &str) -> Result<String, String> {
    text(context, key).ok_or_else(|| format!("Missing template context field: {}", key))
}

fn item_list(context: &Value, key: &str) -> Vec<String> {
    match context.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn titled_list(title: &str, items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }

    let rows: String = items
        .iter()
        .map(|item| format!("<li>{}</li>", item))
        .collect();
    format!(
        r#"<h4 style="margin-bottom: 4px;">{}</h4><ul style="margin-top: 0;">{}</ul>"#,
        title, rows
    )
}

fn member_list(context: &Value) -> String {
    let members = match context.get("team_members") {
        Some(Value::Array(members)) => members,
        _ => return String::new(),
    };

    let rows: String = members
        .iter()
        .map(|member| {
            format!(
                "<li>{} — {}</li>",
                member.get("name").and_then(|v| v.as_str()).unwrap_or(""),
                member
                    .get("institution")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
            )
        })
        .collect();
    format!(r#"<ul style="margin-top: 0;">{}</ul>"#, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registration_body_carries_payment_and_segments() {
        let renderer = HtmlRenderer::new("TechFest");
        let html = renderer
            .render(
                Template::RegistrationConfirmation,
                &json!({
                    "participant_name": "Ada Lovelace",
                    "trx_id": "TX1",
                    "amount": 1500,
                    "payment_phone": "0170000000",
                    "segments": ["Tech Showcase"],
                    "competitions": [],
                }),
            )
            .unwrap();

        assert!(html.contains("Ada Lovelace"));
        assert!(html.contains("TX1"));
        assert!(html.contains("Tech Showcase"));
        assert!(html.contains("cid:logo"));
        assert!(!html.contains("Team:"));
    }

    #[test]
    fn verification_body_embeds_qr_cid_and_ticket_id() {
        let renderer = HtmlRenderer::new("TechFest");
        let html = renderer
            .render(
                Template::PaymentVerification,
                &json!({
                    "participant_name": "Ada Lovelace",
                    "qr_id": "t_4",
                    "team_name": "Alpha",
                    "segments": [],
                    "competitions": ["Robotics Sprint"],
                }),
            )
            .unwrap();

        assert!(html.contains("cid:qr_code"));
        assert!(html.contains("t_4"));
        assert!(html.contains("Alpha"));
        assert!(html.contains("Robotics Sprint"));
    }

    #[test]
    fn missing_required_context_is_an_error() {
        let renderer = HtmlRenderer::new("TechFest");
        let result = renderer.render(
            Template::PaymentVerification,
            &json!({"participant_name": "Ada Lovelace"}),
        );

        assert!(result.is_err());
    }
}
