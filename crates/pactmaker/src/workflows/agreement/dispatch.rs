use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::mailer::{Attachment, DeliveryReceipt, Mailer, MailerError, NotificationMessage};
use super::service::SignedAgreement;
use super::submission::Submission;
use super::templates::{TemplateCache, TemplateError, TemplateName};

const NOTIFICATIONS_METRIC: &str = "pactmaker_notifications_total";

/// Who a notification is addressed to; selects the subject and body templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Signee,
    Internal,
}

impl Audience {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Signee => "signee",
            Self::Internal => "internal",
        }
    }

    fn subject_template(&self) -> TemplateName {
        match self {
            Self::Signee => TemplateName::SigneeSubject,
            Self::Internal => TemplateName::InternalSubject,
        }
    }

    fn body_template(&self) -> TemplateName {
        match self {
            Self::Signee => TemplateName::SigneeEmail,
            Self::Internal => TemplateName::InternalEmail,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("submission has no email address for the signee")]
    MissingRecipient,
    #[error(transparent)]
    Render(#[from] TemplateError),
    #[error(transparent)]
    Mailer(#[from] MailerError),
}

/// Result of one send attempt.
#[derive(Debug)]
pub struct DeliveryOutcome {
    pub audience: Audience,
    pub recipient: String,
    pub result: Result<DeliveryReceipt, DeliveryError>,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// Sends the signed agreement to the signee and every internal recipient.
///
/// Sends are independent: a failure is logged and counted, never retried, and never
/// stops the remaining recipients from being attempted.
pub struct NotificationDispatcher<M> {
    mailer: Arc<M>,
    templates: Arc<TemplateCache>,
    from_address: Arc<str>,
    internal_recipients: Arc<[String]>,
}

impl<M> Clone for NotificationDispatcher<M> {
    fn clone(&self) -> Self {
        Self {
            mailer: Arc::clone(&self.mailer),
            templates: Arc::clone(&self.templates),
            from_address: Arc::clone(&self.from_address),
            internal_recipients: Arc::clone(&self.internal_recipients),
        }
    }
}

impl<M> std::fmt::Debug for NotificationDispatcher<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("from_address", &self.from_address)
            .field("internal_recipients", &self.internal_recipients)
            .finish_non_exhaustive()
    }
}

impl<M> NotificationDispatcher<M>
where
    M: Mailer + 'static,
{
    pub fn new(
        mailer: Arc<M>,
        templates: Arc<TemplateCache>,
        from_address: impl Into<String>,
        internal_recipients: Vec<String>,
    ) -> Self {
        Self {
            mailer,
            templates,
            from_address: Arc::from(from_address.into()),
            internal_recipients: Arc::from(internal_recipients),
        }
    }

    /// Build one message for `to`, sharing the attachment by reference.
    pub fn compose(
        &self,
        audience: Audience,
        to: &str,
        submission: &Submission,
        attachment: &Arc<Attachment>,
    ) -> Result<NotificationMessage, DeliveryError> {
        let subject = self
            .templates
            .render(audience.subject_template(), submission)?;
        let html_body = self.templates.render(audience.body_template(), submission)?;

        Ok(NotificationMessage {
            from: self.from_address.to_string(),
            to: to.to_string(),
            subject,
            html_body,
            attachments: vec![Arc::clone(attachment)],
        })
    }

    /// Attempt every send concurrently and report each outcome.
    pub async fn deliver_all(&self, signed: &SignedAgreement) -> Vec<DeliveryOutcome> {
        let attachment = Arc::new(signed.attachment());
        let submission = &signed.submission;

        let signee = self.deliver(
            Audience::Signee,
            submission.email(),
            submission,
            &attachment,
        );
        let internal = self.internal_recipients.iter().map(|recipient| {
            self.deliver(
                Audience::Internal,
                Some(recipient.as_str()),
                submission,
                &attachment,
            )
        });

        let mut sends = Vec::with_capacity(1 + self.internal_recipients.len());
        sends.push(signee);
        sends.extend(internal);
        join_all(sends).await
    }

    /// Fire-and-forget: the returned handle may be dropped without affecting the sends.
    pub fn spawn(&self, signed: SignedAgreement) -> JoinHandle<Vec<DeliveryOutcome>> {
        let dispatcher = self.clone();
        debug!(
            internal_recipients = dispatcher.internal_recipients.len(),
            "dispatch started"
        );
        tokio::spawn(async move { dispatcher.deliver_all(&signed).await })
    }

    async fn send_to(
        &self,
        audience: Audience,
        to: &str,
        submission: &Submission,
        attachment: &Arc<Attachment>,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let message = self.compose(audience, to, submission, attachment)?;
        Ok(self.mailer.send(&message).await?)
    }

    async fn deliver(
        &self,
        audience: Audience,
        recipient: Option<&str>,
        submission: &Submission,
        attachment: &Arc<Attachment>,
    ) -> DeliveryOutcome {
        let result = match recipient {
            None => Err(DeliveryError::MissingRecipient),
            Some(to) => self.send_to(audience, to, submission, attachment).await,
        };
        let recipient = recipient.unwrap_or_default().to_string();

        match &result {
            Ok(receipt) => {
                info!(
                    audience = audience.label(),
                    recipient = %recipient,
                    message_id = %receipt.message_id,
                    "email sent"
                );
                metrics::counter!(
                    NOTIFICATIONS_METRIC,
                    "audience" => audience.label(),
                    "outcome" => "sent"
                )
                .increment(1);
            }
            Err(err) => {
                error!(
                    audience = audience.label(),
                    recipient = %recipient,
                    error = %err,
                    "email send failed"
                );
                metrics::counter!(
                    NOTIFICATIONS_METRIC,
                    "audience" => audience.label(),
                    "outcome" => "failed"
                )
                .increment(1);
            }
        }

        DeliveryOutcome {
            audience,
            recipient,
            result,
        }
    }
}
