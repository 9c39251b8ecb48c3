//! Registration confirmation delivery
//!
//! Dispatchers are chosen once at startup from [`SmtpConfig`]. Delivery runs
//! after the registration is stored; a failed send never undoes it.

use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use parking_lot::Mutex;
use registration_core::credential::decode_image;
use std::sync::Arc;
use thiserror::Error;

/// Content id the HTML body uses to reference the QR image
const QR_CONTENT_ID: &str = "qrcode";

/// Notification errors
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Address could not be parsed
    #[error("Invalid address: {0}")]
    Address(String),

    /// Message could not be assembled
    #[error("Failed to build email: {0}")]
    Build(String),

    /// Relay rejected or connection failed
    #[error("Failed to send email: {0}")]
    Transport(String),
}

/// A confirmation sent after a successful registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationConfirmation {
    /// Recipient address
    pub to: String,

    /// Recipient display name
    pub user_name: String,

    /// Event title
    pub event_title: String,

    /// Base64 PNG of the QR credential
    pub qr_image_base64: String,
}

impl RegistrationConfirmation {
    /// Email subject line
    pub fn subject(&self) -> String {
        format!("Registration Confirmation - {}", self.event_title)
    }

    /// HTML body referencing the inline QR image
    pub fn html_body(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Registration Confirmation</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2 style="color: #2563eb;">Registration Confirmation</h2>
        <p>Dear {user_name},</p>
        <p>You have successfully registered for <strong>{event_title}</strong>.</p>
        <p>Please present the QR code below at the event entrance:</p>
        <p style="margin: 30px 0; text-align: center;">
            <img src="cid:{cid}" alt="Registration QR code" style="max-width: 300px;">
        </p>
        <p style="color: #666; font-size: 14px;">The QR code can be used only once.</p>
        <p>Best regards,<br>Event Management Team</p>
    </div>
</body>
</html>"#,
            user_name = html_escape::encode_safe(&self.user_name),
            event_title = html_escape::encode_safe(&self.event_title),
            cid = QR_CONTENT_ID,
        )
    }
}

/// Sends registration confirmations
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one confirmation
    async fn send_registration_confirmation(
        &self,
        confirmation: &RegistrationConfirmation,
    ) -> Result<(), NotifyError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// SMTP delivery (STARTTLS relay)
#[derive(Clone)]
pub struct SmtpDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl std::fmt::Debug for SmtpDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpDispatcher")
            .field("from", &self.from.to_string())
            .finish()
    }
}

impl SmtpDispatcher {
    /// Build from configuration
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = format!("{} <{}>", config.from_name, config.username)
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Address(format!("from: {e}")))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
            .map_err(|e| NotifyError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }

    fn build_message(&self, confirmation: &RegistrationConfirmation) -> Result<Message, NotifyError> {
        let to = confirmation
            .to
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Address(format!("to: {e}")))?;

        let png = decode_image(&confirmation.qr_image_base64)
            .map_err(|e| NotifyError::Build(e.to_string()))?;
        let png_type = ContentType::parse("image/png")
            .map_err(|e| NotifyError::Build(e.to_string()))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(confirmation.subject())
            .multipart(
                MultiPart::related()
                    .singlepart(SinglePart::html(confirmation.html_body()))
                    .singlepart(
                        Attachment::new_inline(QR_CONTENT_ID.to_string()).body(png, png_type),
                    ),
            )
            .map_err(|e| NotifyError::Build(e.to_string()))
    }
}

#[async_trait]
impl NotificationDispatcher for SmtpDispatcher {
    async fn send_registration_confirmation(
        &self,
        confirmation: &RegistrationConfirmation,
    ) -> Result<(), NotifyError> {
        let message = self.build_message(confirmation)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        tracing::info!(to = %confirmation.to, event = %confirmation.event_title, "Confirmation email sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// Logs confirmations instead of sending them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send_registration_confirmation(
        &self,
        confirmation: &RegistrationConfirmation,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            to = %confirmation.to,
            subject = %confirmation.subject(),
            qr_image_bytes = confirmation.qr_image_base64.len(),
            "SMTP not configured, confirmation logged only"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Records confirmations in memory
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<RegistrationConfirmation>>,
    fail: bool,
}

impl RecordingDispatcher {
    /// Dispatcher that records and succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher that records every attempt and then fails it
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Confirmations attempted so far
    pub fn sent(&self) -> Vec<RegistrationConfirmation> {
        self.sent.lock().clone()
    }

    /// Forget recorded confirmations
    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send_registration_confirmation(
        &self,
        confirmation: &RegistrationConfirmation,
    ) -> Result<(), NotifyError> {
        self.sent.lock().push(confirmation.clone());
        if self.fail {
            return Err(NotifyError::Transport("recording dispatcher set to fail".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// How confirmations are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Real mail through the configured relay
    Smtp,
    /// SMTP not configured; confirmations are only logged
    LogOnly,
}

/// Pick the dispatcher for this configuration
pub fn dispatcher_from_config(
    config: &SmtpConfig,
) -> Result<(DispatchMode, Arc<dyn NotificationDispatcher>), NotifyError> {
    if config.is_configured() {
        Ok((DispatchMode::Smtp, Arc::new(SmtpDispatcher::new(config)?)))
    } else {
        Ok((DispatchMode::LogOnly, Arc::new(LogDispatcher)))
    }
}
