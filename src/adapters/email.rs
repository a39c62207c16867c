use crate::domain::model::ChangeReport;
use crate::domain::ports::Notifier;
use crate::utils::error::{MonitorError, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from: String,
    pub to: String,
    pub password: String,
}

/// Sends change reports over SMTP (STARTTLS), text and HTML bodies as
/// `multipart/alternative`.
pub struct SmtpNotifier {
    settings: EmailSettings,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(settings: EmailSettings) -> Result<Self> {
        let credentials =
            Credentials::new(settings.from.clone(), settings.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
            .map_err(|e| MonitorError::DeliveryError {
                message: format!("SMTP transport setup failed: {}", e),
            })?
            .port(settings.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            settings,
            transport,
        })
    }

    fn build_message(&self, report: &ChangeReport) -> Result<Message> {
        let from: Mailbox =
            self.settings
                .from
                .parse()
                .map_err(|e| MonitorError::DeliveryError {
                    message: format!("Invalid sender address '{}': {}", self.settings.from, e),
                })?;
        let to: Mailbox = self
            .settings
            .to
            .parse()
            .map_err(|e| MonitorError::DeliveryError {
                message: format!("Invalid recipient address '{}': {}", self.settings.to, e),
            })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(report.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                report.text_body.clone(),
                report.html_body.clone(),
            ))
            .map_err(|e| MonitorError::DeliveryError {
                message: format!("Failed to compose email: {}", e),
            })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, report: &ChangeReport) -> Result<()> {
        let message = self.build_message(report)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MonitorError::DeliveryError {
                message: format!("SMTP send failed: {}", e),
            })?;

        tracing::info!(
            "✅ Email sent successfully with {} changes",
            report.total_changes
        );
        Ok(())
    }
}

/// Fallback used when email is disabled: the report lands in the log instead.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, report: &ChangeReport) -> Result<()> {
        tracing::info!("📭 Email disabled; report follows ({})", report.subject);
        for line in report.text_body.lines() {
            tracing::info!("  {}", line);
        }
        Ok(())
    }
}
