use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::NaiveDate;

use crate::workflows::agreement::mailer::{
    DeliveryReceipt, Mailer, MailerError, NotificationMessage,
};
use crate::workflows::agreement::pdf::{
    MaterializedDocument, PageLayout, PdfError, PdfMaterializer,
};
use crate::workflows::agreement::renderer::RenderedAgreement;
use crate::workflows::agreement::service::{AgreementContext, AgreementService};
use crate::workflows::agreement::submission::{FixedClock, FormSchema, Submission};
use crate::workflows::agreement::templates::{TemplateCache, TemplateSources};

pub(super) const FROM_ADDRESS: &str = "pacts@example.com";
pub(super) const SIGNEE_EMAIL: &str = "jane@acme.test";

/// Records every send and fails for the configured recipients.
#[derive(Default)]
pub(super) struct RecordingMailer {
    sent: Mutex<Vec<NotificationMessage>>,
    failing: Vec<String>,
}

impl RecordingMailer {
    pub(super) fn failing_for(recipients: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: recipients.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub(super) fn messages(&self) -> Vec<NotificationMessage> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }

    pub(super) fn attempts(&self) -> usize {
        self.sent.lock().expect("mailer mutex poisoned").len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &NotificationMessage) -> Result<DeliveryReceipt, MailerError> {
        let attempt = {
            let mut guard = self.sent.lock().expect("mailer mutex poisoned");
            guard.push(message.clone());
            guard.len()
        };

        if self.failing.iter().any(|recipient| recipient == &message.to) {
            return Err(MailerError::Transport("connection reset".to_string()));
        }

        Ok(DeliveryReceipt {
            message_id: format!("msg-{attempt}"),
            to: message.to.clone(),
            submitted_at: None,
        })
    }
}

/// Emits a fake PDF whose body is the rendered HTML, so output tracks input exactly.
#[derive(Default)]
pub(super) struct EchoMaterializer {
    calls: AtomicUsize,
}

impl EchoMaterializer {
    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PdfMaterializer for EchoMaterializer {
    async fn materialize(
        &self,
        html: &RenderedAgreement,
        layout: &PageLayout,
    ) -> Result<MaterializedDocument, PdfError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pdf = format!("%PDF-1.4 margin={}\n{}", layout.margin_top, html.as_str());
        Ok(MaterializedDocument::from_pdf(pdf.into_bytes()))
    }
}

pub(super) struct BrokenMaterializer;

#[async_trait]
impl PdfMaterializer for BrokenMaterializer {
    async fn materialize(
        &self,
        _html: &RenderedAgreement,
        _layout: &PageLayout,
    ) -> Result<MaterializedDocument, PdfError> {
        Err(PdfError::Failed {
            status: "exit status: 1".to_string(),
            stderr: "out of memory".to_string(),
        })
    }
}

pub(super) fn signing_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
}

pub(super) fn templates() -> Arc<TemplateCache> {
    let sources = TemplateSources::embedded("Your {{company}} agreement", "{{company}} signed");
    Arc::new(TemplateCache::compile(&sources).expect("templates compile"))
}

pub(super) fn form_schema() -> FormSchema {
    FormSchema::from_json(include_str!("../../../../data/form.json")).expect("schema parses")
}

pub(super) fn example_submission() -> Submission {
    serde_json::from_str(include_str!("../../../../data/example.json")).expect("example parses")
}

pub(super) fn context(internal_recipients: &[&str]) -> AgreementContext {
    AgreementContext {
        templates: templates(),
        form: form_schema(),
        example: example_submission(),
        title: "Acme Services".to_string(),
        from_address: FROM_ADDRESS.to_string(),
        internal_recipients: internal_recipients.iter().map(|r| r.to_string()).collect(),
    }
}

pub(super) fn submission() -> Submission {
    [
        ("name", "Jane Doe"),
        ("email", SIGNEE_EMAIL),
        ("company", "Acme"),
        ("role", "Director"),
        ("signature", "Jane Doe"),
    ]
    .into_iter()
    .collect()
}

pub(super) fn build_service<P>(
    internal_recipients: &[&str],
    mailer: Arc<RecordingMailer>,
    materializer: Arc<P>,
) -> AgreementService<RecordingMailer, P>
where
    P: PdfMaterializer + 'static,
{
    AgreementService::new(context(internal_recipients), mailer, materializer)
        .with_clock(Arc::new(FixedClock(signing_date())))
}

/// Let spawned dispatch tasks run on the current-thread test runtime.
pub(super) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub(super) async fn read_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 4 * 1024 * 1024)
        .await
        .expect("read body")
        .to_vec()
}
