use axum::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use tracing::{error, info};

use crate::config::SmtpConfig;

/// Outbound mail seam. Delivery is best-effort: callers dispatch through
/// [`send_verification_email`] and never wait on the result.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, to: &str, verification_token: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    smtp: SmtpConfig,
    base_url: String,
}

impl SmtpMailer {
    pub fn new(smtp: SmtpConfig, base_url: String) -> Self {
        Self { smtp, base_url }
    }

    fn verification_body(&self, verification_token: &str) -> String {
        format!(
            "<p>Welcome!</p>\
             <p><a target=\"_blank\" href=\"{}/api/auth/users/verify/{}\">\
             Click to verify your email</a></p>",
            self.base_url, verification_token
        )
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification(&self, to: &str, verification_token: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.smtp.from.parse()?)
            .to(to.parse()?)
            .subject("Verify email")
            .header(ContentType::TEXT_HTML)
            .body(self.verification_body(verification_token))?;

        let mailer = SmtpTransport::relay(&self.smtp.host)?
            .credentials(Credentials::new(
                self.smtp.username.clone(),
                self.smtp.password.clone(),
            ))
            .port(self.smtp.port)
            .build();

        // lettre's SMTP transport is blocking; keep it off the runtime workers.
        tokio::task::spawn_blocking(move || mailer.send(&email)).await??;
        Ok(())
    }
}

/// Fire-and-forget dispatch: the HTTP response never waits for SMTP, and a
/// failed delivery is logged, not propagated.
pub fn send_verification_email(
    mailer: std::sync::Arc<dyn Mailer>,
    to: String,
    verification_token: String,
) {
    tokio::spawn(async move {
        match mailer.send_verification(&to, &verification_token).await {
            Ok(()) => info!(%to, "verification email sent"),
            Err(e) => error!(%to, error = %e, "verification email failed"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmtpConfig;

    fn mailer() -> SmtpMailer {
        SmtpMailer::new(
            SmtpConfig {
                host: "localhost".into(),
                port: 587,
                username: "u".into(),
                password: "p".into(),
                from: "no-reply@authgate.local".into(),
            },
            "https://auth.example.com".into(),
        )
    }

    #[test]
    fn body_contains_verification_link() {
        let body = mailer().verification_body("tok123");
        assert!(body.contains("https://auth.example.com/api/auth/users/verify/tok123"));
    }
}
