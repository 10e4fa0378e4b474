//! # SMTP clip notifications
//!
//! Sends each finished clip as an email attachment through a configured
//! SMTP relay. Meant to run behind the notification queue, off the capture
//! loop.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use vigil::prelude::v1::*;

fn default_port() -> u16 {
    587
}

fn default_subject() -> String {
    "Motion Detected - Video".into()
}

fn default_body() -> String {
    "Motion was detected, and the video is attached.".into()
}

/// Transport settings, loaded from a JSON file.
///
/// Credentials and addresses are configuration inputs; nothing here is
/// baked into the binary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub smtp_host: String,
    #[serde(default = "default_port")]
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_body")]
    pub body: String,
}

impl NotifyConfig {
    /// Load the configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Unable to open notify config {}", path.display()))?;
        serde_json::from_reader(file)
            .with_context(|| format!("Invalid notify config {}", path.display()))
    }
}

/// Emails finished clips to a configured recipient.
pub struct SmtpNotifier {
    config: NotifyConfig,
}

impl SmtpNotifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self { config }
    }

    /// Assemble the outgoing message with the clip attached.
    fn message(&self, clip: &Path) -> Result<Message> {
        let filename = clip
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("clip.mp4")
            .to_string();
        let video = std::fs::read(clip)
            .with_context(|| format!("Unable to read clip {}", clip.display()))?;

        let attachment =
            Attachment::new(filename).body(video, ContentType::parse("video/mp4")?);

        Ok(Message::builder()
            .from(self.config.from.parse()?)
            .to(self.config.to.parse()?)
            .subject(self.config.subject.as_str())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(self.config.body.clone()))
                    .singlepart(attachment),
            )?)
    }
}

impl Notifier for SmtpNotifier {
    fn notify(&mut self, clip: &Path) -> Result<()> {
        let message = self.message(clip)?;

        let mailer = SmtpTransport::starttls_relay(&self.config.smtp_host)?
            .port(self.config.smtp_port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .build();

        mailer
            .send(&message)
            .with_context(|| format!("Unable to send {}", clip.display()))?;

        info!("Email sent with attachment {}", clip.display());
        Ok(())
    }
}
