//! Outbound transactional email over SMTP.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::{authentication::Credentials, Error as SmtpError},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::EmailConfig;

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("invalid email address: {0}")]
    InvalidAddress(String),
}

/// Notifications sent around the account lifecycle.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_email(&self, to: &str, token: &str) -> Result<(), EmailError>;
    async fn send_password_reset_email(&self, to: &str, token: &str) -> Result<(), EmailError>;
    async fn send_welcome_email(&self, to: &str) -> Result<(), EmailError>;
    async fn send_password_reset_confirmation_email(&self, to: &str) -> Result<(), EmailError>;
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    frontend_url: String,
}

impl SmtpMailer {
    /// Without a username the relay is used unauthenticated and in plain text
    /// (MailHog and friends).
    pub fn new(config: &EmailConfig, frontend_url: &str) -> Result<Self, EmailError> {
        let transport = if config.smtp_username.is_empty() {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        } else {
            let credentials =
                Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                .port(config.smtp_port)
                .credentials(credentials)
                .build()
        };

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        })
    }

    async fn send_html(&self, to: &str, subject: &str, html: String) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)?;

        self.transport.send(message).await.map_err(|e| {
            error!(error = %e, subject, "smtp send failed");
            EmailError::Smtp(e)
        })?;
        debug!(subject, "email sent");
        Ok(())
    }
}

pub fn verification_link(frontend_url: &str, token: &str) -> String {
    format!("{frontend_url}/verifyStart?token={token}")
}

pub fn password_reset_link(frontend_url: &str, token: &str) -> String {
    format!("{frontend_url}/PasswordReset/{token}")
}

fn button(href: &str, label: &str) -> String {
    format!(
        r#"<a href="{href}" style="padding: 10px 20px; background-color: #F15A24; color: #fff; text-decoration: none; border-radius: 5px;">{label}</a>"#
    )
}

fn layout(body: &str) -> String {
    format!(
        r#"<html><body><div style="font-family: Arial, sans-serif; color: #333;">{body}</div></body></html>"#
    )
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification_email(&self, to: &str, token: &str) -> Result<(), EmailError> {
        let link = verification_link(&self.frontend_url, token);
        let html = layout(&format!(
            "<h2>Engineer Portfolio</h2>\
             <p>Thanks for signing up. Confirm your email address to finish registration.</p>\
             {}\
             <p>This link is valid for <strong>7 days</strong>.</p>",
            button(&link, "Complete registration")
        ));
        self.send_html(to, "Confirm your Engineer Portfolio account", html)
            .await
    }

    async fn send_password_reset_email(&self, to: &str, token: &str) -> Result<(), EmailError> {
        let link = password_reset_link(&self.frontend_url, token);
        let html = layout(&format!(
            "<h2>Password reset</h2>\
             <p>We received a request to reset your password.</p>\
             {}\
             <p>This link is valid for 1 hour.</p>",
            button(&link, "Reset password")
        ));
        self.send_html(to, "Reset your password", html).await
    }

    async fn send_welcome_email(&self, to: &str) -> Result<(), EmailError> {
        let html = layout(
            "<h2>Welcome to Engineer Portfolio!</h2>\
             <p>Share your projects and let companies discover your work.</p>",
        );
        self.send_html(to, "Welcome to Engineer Portfolio", html)
            .await
    }

    async fn send_password_reset_confirmation_email(&self, to: &str) -> Result<(), EmailError> {
        let html = layout(&format!(
            "<p>Hello {to},</p>\
             <p>Your password has been changed.</p>\
             <p>If you did not make this change, reset your password right away.</p>"
        ));
        self.send_html(to, "Your password was changed", html).await
    }
}
