use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

#[derive(Debug, Clone)]
pub struct InlinePart {
    pub content_id: String,
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AttachedFile {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// One fully composed outbound message. Inline parts are referenced from
/// the HTML body by `cid:` URLs.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub inline_parts: Vec<InlinePart>,
    pub attachments: Vec<AttachedFile>,
}

pub trait Mailer: Send + Sync {
    fn send(
        &self,
        email: OutboundEmail,
    ) -> impl std::future::Future<Output = Result<(), String>> + Send;
}

/// SMTP relay transport. The blocking send runs on the blocking pool so
/// workers never stall the runtime.
#[derive(Clone)]
pub struct SmtpMailer {
    smtp_server: String,
    smtp_port: u16,
    credentials: Credentials,
    from_header: String,
}

impl SmtpMailer {
    pub fn new(
        smtp_server: String,
        smtp_port: u16,
        smtp_username: String,
        smtp_password: String,
        from_email: String,
        from_name: String,
    ) -> Self {
        Self {
            smtp_server,
            smtp_port,
            credentials: Credentials::new(smtp_username, smtp_password),
            from_header: format!("{} <{}>", from_name, from_email),
        }
    }

    fn build_transport(&self) -> Result<SmtpTransport, String> {
        Ok(SmtpTransport::relay(&self.smtp_server)
            .map_err(|e| format!("SMTP relay error: {}", e))?
            .port(self.smtp_port)
            .credentials(self.credentials.clone())
            .build())
    }

    fn build_message(&self, email: OutboundEmail) -> Result<Message, String> {
        let mut builder = Message::builder()
            .from(
                self.from_header
                    .parse()
                    .map_err(|e| format!("Invalid from address: {}", e))?,
            )
            .subject(email.subject);

        for recipient in &email.to {
            builder = builder.to(recipient
                .parse()
                .map_err(|e| format!("Invalid to address {}: {}", recipient, e))?);
        }
        for recipient in &email.cc {
            builder = builder.cc(recipient
                .parse()
                .map_err(|e| format!("Invalid cc address {}: {}", recipient, e))?);
        }

        let mut related = MultiPart::related().singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(email.html_body),
        );
        for part in email.inline_parts {
            let content_type = ContentType::parse(&part.mime)
                .map_err(|e| format!("Invalid inline content type {}: {}", part.mime, e))?;
            related = related.singlepart(
                Attachment::new_inline(part.content_id).body(part.bytes, content_type),
            );
        }

        let alternative = MultiPart::alternative()
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(email.text_body),
            )
            .multipart(related);

        let mut mixed = MultiPart::mixed().multipart(alternative);
        for file in email.attachments {
            let content_type = ContentType::parse(&file.mime)
                .map_err(|e| format!("Invalid attachment content type {}: {}", file.mime, e))?;
            mixed = mixed.singlepart(Attachment::new(file.filename).body(file.bytes, content_type));
        }

        builder
            .multipart(mixed)
            .map_err(|e| format!("Failed to build email: {}", e))
    }
}

impl Mailer for SmtpMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), String> {
        let message = self.build_message(email)?;
        let transport = self.build_transport()?;

        tokio::task::spawn_blocking(move || {
            transport
                .send(&message)
                .map(|_| ())
                .map_err(|e| format!("Failed to send email: {}", e))
        })
        .await
        .map_err(|e| format!("Email task failed: {}", e))?
    }
}

#[cfg(test)]
pub mod fakes {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::{Mailer, OutboundEmail};

    /// Records every accepted message; can be told to reject the first N
    /// sends, or to reject specific recipients.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<OutboundEmail>>,
        pub fail_first: AtomicU32,
        pub rejected_recipients: Vec<String>,
    }

    impl RecordingMailer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(times: u32) -> Self {
            Self {
                fail_first: AtomicU32::new(times),
                ..Self::default()
            }
        }

        pub fn rejecting(recipients: Vec<String>) -> Self {
            Self {
                rejected_recipients: recipients,
                ..Self::default()
            }
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl Mailer for RecordingMailer {
        async fn send(&self, email: OutboundEmail) -> Result<(), String> {
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Err("simulated transport failure".to_string());
            }

            if email
                .to
                .iter()
                .any(|r| self.rejected_recipients.contains(r))
            {
                return Err(format!("recipient rejected: {}", email.to.join(",")));
            }

            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }
}
