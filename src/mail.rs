use chrono::NaiveDate;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid recipient address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("message build error: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Outbound notification mail. Callers go through `send_best_effort`, which
/// logs failures and never propagates them.
#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Mailbox>,
    pub client_url: String,
}

impl Mailer {
    /// Disabled (no-op) unless SMTP_HOST is configured.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let Some(host) = cfg.smtp_host.as_deref() else {
            return Ok(Self {
                transport: None,
                from: None,
                client_url: cfg.client_url.clone(),
            });
        };

        let from: Mailbox = cfg
            .smtp_from
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("SMTP_FROM is required when SMTP_HOST is set"))?
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid SMTP_FROM: {e}"))?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(cfg.smtp_port);
        if let (Some(user), Some(pass)) = (&cfg.smtp_username, &cfg.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: Some(builder.build()),
            from: Some(from),
            client_url: cfg.client_url.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    pub async fn send(&self, to: &str, subject: &str, html: String) -> Result<(), MailError> {
        let (Some(transport), Some(from)) = (&self.transport, &self.from) else {
            tracing::debug!("mailer disabled, skipping \"{subject}\" to {to}");
            return Ok(());
        };

        let message = Message::builder()
            .from(from.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)?;

        transport.send(message).await?;
        Ok(())
    }

    pub async fn send_best_effort(&self, to: &str, subject: &str, html: String) {
        if let Err(e) = self.send(to, subject, html).await {
            tracing::warn!("email \"{subject}\" to {to} failed: {e}");
        }
    }
}

/* -------------------------
   Templates
--------------------------*/

pub fn welcome_email(first_name: &str, role_label: &str, client_url: &str) -> (String, String) {
    let subject = "Welcome to HealthCare Pro".to_string();
    let html = format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif; color: #333;">
    <h1>Welcome, {first_name}!</h1>
    <p>Your {role_label} account has been created.</p>
    <p><a href="{client_url}/login">Sign in</a> to get started.</p>
    <p>— The HealthCare Pro team</p>
  </body>
</html>"#
    );
    (subject, html)
}

pub fn booking_email(
    first_name: &str,
    doctor_name: &str,
    date: NaiveDate,
    start_time: &str,
    end_time: &str,
    client_url: &str,
) -> (String, String) {
    let subject = "Your appointment request was received".to_string();
    let html = format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif; color: #333;">
    <h1>Appointment requested</h1>
    <p>Hi {first_name},</p>
    <p>Your appointment with Dr. {doctor_name} on <b>{date}</b>
       ({start_time}&ndash;{end_time}) is pending confirmation.</p>
    <p>Track its status from <a href="{client_url}/appointments">your dashboard</a>.</p>
    <p>— The HealthCare Pro team</p>
  </body>
</html>"#
    );
    (subject, html)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_mailer() -> Mailer {
        Mailer {
            transport: None,
            from: None,
            client_url: "http://localhost:5173".into(),
        }
    }

    #[tokio::test]
    async fn test_disabled_mailer_send_is_ok() {
        let mailer = disabled_mailer();
        assert!(!mailer.is_enabled());
        let res = mailer
            .send("someone@example.com", "subject", "<p>hi</p>".into())
            .await;
        assert!(res.is_ok());
    }

    #[test]
    fn test_welcome_email_mentions_recipient() {
        let (subject, html) = welcome_email("Alice", "patient", "http://localhost:5173");
        assert!(!subject.is_empty());
        assert!(html.contains("Alice"));
        assert!(html.contains("patient"));
        assert!(html.contains("http://localhost:5173/login"));
    }

    #[test]
    fn test_booking_email_mentions_slot() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let (_, html) = booking_email("Ann", "John Smith", date, "09:00", "09:30", "http://x");
        assert!(html.contains("John Smith"));
        assert!(html.contains("2025-06-10"));
        assert!(html.contains("09:00"));
    }
}
