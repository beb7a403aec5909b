//! Outbound email: the `Mailer` port, its lettre-backed implementation and message templates.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};

use crate::config::{Config, EmailTransportConfig};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), AppError>;
}

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
    Log,
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let transport = match &config.email_transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let mut builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| AppError::internal(format!("create SMTP transport: {e}")))?
                .port(*port);

                if let (Some(username), Some(password)) = (username, password) {
                    builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
                }
                EmailTransport::Smtp(builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir)
                        .map_err(|e| AppError::internal(format!("create emails directory: {e}")))?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
            EmailTransportConfig::Log => {
                tracing::warn!("No email transport configured. Outgoing mail is only logged.");
                EmailTransport::Log
            }
        };

        Ok(Self {
            transport,
            from_email: config.email_from.clone(),
            from_name: config.email_from_name.clone(),
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, AppError> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| AppError::internal(format!("parse from email: {e}")))?;

        let to = match &email.to_name {
            Some(name) => format!("{name} <{}>", email.to),
            None => email.to.clone(),
        }
        .parse::<Mailbox>()
        .map_err(|e| AppError::internal(format!("parse to email: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(email.text.clone(), email.html.clone()))
            .map_err(|e| AppError::internal(format!("build email message: {e}")))
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), AppError> {
        let message = self.build_message(email)?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message)
                    .await
                    .map_err(|e| AppError::internal(format!("send SMTP email: {e}")))?;
            }
            EmailTransport::File(file) => {
                file.send(message)
                    .await
                    .map_err(|e| AppError::internal(format!("send file email: {e}")))?;
            }
            EmailTransport::Log => {
                tracing::info!("[mock email] to: {} subject: {}", email.to, email.subject);
                tracing::debug!("[mock email] body: {}", email.text);
            }
        }

        tracing::info!("Email sent to {}", email.to);
        Ok(())
    }
}

/// Plain text stored on a notification log, sent as-is with a minimal HTML rendition.
pub fn from_stored(to: &str, subject: &str, body: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        to_name: None,
        subject: subject.to_string(),
        text: body.to_string(),
        html: html_page(subject, &format!("<p>{}</p>", escape_html(body))),
    }
}

pub fn overdue_subject(laptop_unique_id: &str) -> String {
    format!("Reminder: Overdue Laptop Check-in Required - {laptop_unique_id}")
}

/// Whole days since checkout, rounded down.
pub fn days_overdue(checked_out_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - checked_out_at).num_days()
}

pub struct OverdueReminder<'a> {
    pub user_email: &'a str,
    pub user_name: &'a str,
    pub laptop_unique_id: &'a str,
    pub make: &'a str,
    pub model: &'a str,
    pub checked_out_at: DateTime<Utc>,
}

pub fn overdue_reminder(reminder: &OverdueReminder<'_>, now: DateTime<Utc>) -> OutgoingEmail {
    let days = days_overdue(reminder.checked_out_at, now);
    let checked_out = reminder.checked_out_at.format("%Y-%m-%d");
    let name = escape_html(reminder.user_name);

    let text = format!(
        "Hi {},\n\nThis is a reminder that the laptop {} ({} {}) you checked out on {} is overdue for return by {} days.\n\nPlease return the laptop as soon as possible.\n\nThank you,\nLaptop Checkout System",
        reminder.user_name, reminder.laptop_unique_id, reminder.make, reminder.model, checked_out, days
    );
    let content = format!(
        r#"<h2>Laptop Check-in Reminder</h2>
        <p>Hi {name},</p>
        <p>This is a friendly reminder that the laptop you checked out is overdue for return.</p>
        <ul>
            <li><strong>Unique ID:</strong> {id}</li>
            <li><strong>Make/Model:</strong> {make} {model}</li>
            <li><strong>Checked Out:</strong> {checked_out}</li>
            <li><strong>Days Overdue:</strong> {days}</li>
        </ul>
        <p>Please return the laptop as soon as possible or contact the admin if you need an extension.</p>"#,
        id = escape_html(reminder.laptop_unique_id),
        make = escape_html(reminder.make),
        model = escape_html(reminder.model),
    );

    let subject = overdue_subject(reminder.laptop_unique_id);
    OutgoingEmail {
        to: reminder.user_email.to_string(),
        to_name: Some(reminder.user_name.to_string()),
        html: html_page(&subject, &content),
        subject,
        text,
    }
}

pub fn invitation_body(user_name: &str, login_url: &str) -> String {
    format!(
        "Hi {user_name},\n\nYou've been invited to join the Laptop Checkout System.\n\nSign in here: {login_url}\n\nThank you,\nLaptop Checkout System"
    )
}

fn html_page(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #666; }}
    </style>
</head>
<body>
    <div class="container">
        {content}
        <div class="footer">
            <p>Laptop Checkout System. This is an automated message, please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>"#,
        title = escape_html(title),
    )
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn overdue_reminder_mentions_laptop_and_days() {
        let now = Utc::now();
        let reminder = OverdueReminder {
            user_email: "jane@example.com",
            user_name: "Jane",
            laptop_unique_id: "LAP-00112233AABBCCDD",
            make: "Dell",
            model: "XPS 13",
            checked_out_at: now - Duration::days(3) - Duration::hours(2),
        };
        let email = overdue_reminder(&reminder, now);

        assert_eq!(email.subject, "Reminder: Overdue Laptop Check-in Required - LAP-00112233AABBCCDD");
        assert!(email.text.contains("overdue for return by 3 days"));
        assert!(email.text.contains("Dell XPS 13"));
        assert!(email.html.contains("<strong>Days Overdue:</strong> 3"));
        assert_eq!(email.to_name.as_deref(), Some("Jane"));
    }

    #[test]
    fn stored_body_is_escaped_in_html() {
        let email = from_stored("admin@example.com", "Laptop Reported Lost: LAP-1", "found by <script>");
        assert_eq!(email.text, "found by <script>");
        assert!(email.html.contains("found by &lt;script&gt;"));
    }

    #[tokio::test]
    async fn log_transport_accepts_any_message() {
        let config = Config::with_defaults("postgres://localhost/laptops", "redis://127.0.0.1/", "secret");
        let service = EmailService::new(&config).unwrap();
        service
            .send(&from_stored("jane@example.com", "Hello", "Body"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_recipient_is_an_error() {
        let config = Config::with_defaults("postgres://localhost/laptops", "redis://127.0.0.1/", "secret");
        let service = EmailService::new(&config).unwrap();
        let err = service.send(&from_stored("not an address", "Hello", "Body")).await.unwrap_err();
        assert!(err.to_string().contains("parse to email"));
    }
}
