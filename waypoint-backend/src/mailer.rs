use async_trait::async_trait;
use tracing::info;

/// Outbound notification seam. Every call is fire-and-forget from the
/// handlers' point of view: delivery failures never fail a request.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_signup_pin(&self, email: &str, name: &str, pin: &str);
    async fn send_signup_success(&self, email: &str);
    async fn send_password_reset(&self, email: &str, name: &str, new_password: &str);
}

/// Default mailer: logs that a mail would have been sent. Secrets are never
/// logged, only their presence.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_signup_pin(&self, email: &str, name: &str, pin: &str) {
        info!(email, name, pin_len = pin.len(), "would send signup pin mail");
    }

    async fn send_signup_success(&self, email: &str) {
        info!(email, "would send signup success mail");
    }

    async fn send_password_reset(&self, email: &str, name: &str, new_password: &str) {
        info!(
            email,
            name,
            password_len = new_password.len(),
            "would send password reset mail"
        );
    }
}
