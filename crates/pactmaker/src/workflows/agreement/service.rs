use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::info;

use super::dispatch::{DeliveryOutcome, NotificationDispatcher};
use super::mailer::{Attachment, Mailer};
use super::pdf::{MaterializedDocument, PageLayout, PdfError, PdfMaterializer};
use super::renderer::DocumentRenderer;
use super::submission::{
    Clock, FormSchema, Submission, SubmissionError, SystemClock, AGREEMENT_FIELD,
};
use super::templates::{
    read_override, TemplateCache, TemplateError, TemplateName, TemplateSources,
};
use crate::config::{AppConfig, ConfigError};

const FORM_SCHEMA_JSON: &str = include_str!("../../../data/form.json");
const EXAMPLE_JSON: &str = include_str!("../../../data/example.json");

/// Immutable state built once at startup and shared by every request.
#[derive(Debug, Clone)]
pub struct AgreementContext {
    pub templates: Arc<TemplateCache>,
    pub form: FormSchema,
    pub example: Submission,
    pub title: String,
    pub from_address: String,
    pub internal_recipients: Vec<String>,
}

impl AgreementContext {
    /// Validate delivery settings, then read and compile every asset.
    ///
    /// Any failure here is fatal: the service cannot run without them.
    pub fn load(config: &AppConfig) -> Result<Self, ContextError> {
        config.validate()?;
        Self::load_assets(config)
    }

    /// Templates, form schema and example dataset only; delivery settings are not checked.
    pub fn load_assets(config: &AppConfig) -> Result<Self, ContextError> {
        let dir = config.site.template_dir.as_deref();

        let sources = TemplateSources::load(
            dir,
            &config.delivery.signee_subject,
            &config.delivery.internal_subject,
        )?;
        let templates = TemplateCache::compile(&sources)?;

        let form = FormSchema::from_json(&read_override(dir, "form.json", FORM_SCHEMA_JSON)?)
            .map_err(|source| ContextError::Data {
                file: source_path(dir, "form.json"),
                source,
            })?;
        let example: Submission =
            serde_json::from_str(&read_override(dir, "example.json", EXAMPLE_JSON)?).map_err(
                |source| ContextError::Data {
                    file: source_path(dir, "example.json"),
                    source,
                },
            )?;

        Ok(Self {
            templates: Arc::new(templates),
            form,
            example,
            title: config.site.title.clone(),
            from_address: config.delivery.from_address.clone().unwrap_or_default(),
            internal_recipients: config.delivery.internal_recipients.clone(),
        })
    }
}

fn source_path(dir: Option<&std::path::Path>, file: &str) -> PathBuf {
    match dir {
        Some(dir) if dir.join(file).exists() => dir.join(file),
        _ => PathBuf::from(format!("<built-in {file}>")),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("invalid data in {}: {source}", .file.display())]
    Data {
        file: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A dated submission together with its materialized agreement.
#[derive(Debug, Clone)]
pub struct SignedAgreement {
    pub submission: Submission,
    pub document: MaterializedDocument,
}

impl SignedAgreement {
    pub fn attachment(&self) -> Attachment {
        Attachment::for_agreement(
            &self.document,
            self.submission.company(),
            self.submission.date(),
        )
    }
}

/// Notifications for a signed agreement that have not been started yet.
#[must_use = "notifications are only sent once the dispatch is fired"]
pub struct PendingDispatch<M> {
    dispatcher: NotificationDispatcher<M>,
    signed: SignedAgreement,
}

impl<M> std::fmt::Debug for PendingDispatch<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingDispatch")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl<M> PendingDispatch<M>
where
    M: Mailer + 'static,
{
    pub fn signed(&self) -> &SignedAgreement {
        &self.signed
    }

    /// Start every send in the background.
    ///
    /// The spawned task may begin before the caller's response reaches the wire; on a
    /// multi-threaded runtime only the `agreement signed` log line is guaranteed to
    /// precede the first send.
    pub fn fire(self) -> JoinHandle<Vec<DeliveryOutcome>> {
        self.dispatcher.spawn(self.signed)
    }
}

/// Confirmation page plus the notifications to start once it has been returned.
pub struct SignResponse<M> {
    pub page: String,
    pub dispatch: PendingDispatch<M>,
}

impl<M> std::fmt::Debug for SignResponse<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignResponse")
            .field("page_len", &self.page.len())
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgreementError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Pdf(#[from] PdfError),
}

/// Stamp, render and materialize a submission; never sends anything.
pub struct AgreementPipeline<P> {
    renderer: DocumentRenderer,
    materializer: Arc<P>,
    clock: Arc<dyn Clock>,
    layout: PageLayout,
}

impl<P> AgreementPipeline<P>
where
    P: PdfMaterializer + 'static,
{
    pub fn new(templates: Arc<TemplateCache>, materializer: Arc<P>) -> Self {
        Self {
            renderer: DocumentRenderer::new(templates),
            materializer,
            clock: Arc::new(SystemClock),
            layout: PageLayout::agreement(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The PDF is attached to the returned submission under `agreement`.
    pub async fn sign(
        &self,
        mut submission: Submission,
    ) -> Result<SignedAgreement, AgreementError> {
        submission.stamp_date(self.clock.today());
        let html = self.renderer.render(&submission)?;
        let document = self.materializer.materialize(&html, &self.layout).await?;
        submission.insert(AGREEMENT_FIELD, document.base64());

        Ok(SignedAgreement {
            submission,
            document,
        })
    }

    pub async fn render_document(
        &self,
        submission: Submission,
    ) -> Result<Vec<u8>, AgreementError> {
        let signed = self.sign(submission).await?;
        Ok(signed.document.into_bytes())
    }
}

impl<P> std::fmt::Debug for AgreementPipeline<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgreementPipeline")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

/// Entry point for form submissions and example documents.
pub struct AgreementService<M, P> {
    context: AgreementContext,
    pipeline: AgreementPipeline<P>,
    dispatcher: NotificationDispatcher<M>,
}

impl<M, P> AgreementService<M, P>
where
    M: Mailer + 'static,
    P: PdfMaterializer + 'static,
{
    pub fn new(context: AgreementContext, mailer: Arc<M>, materializer: Arc<P>) -> Self {
        let pipeline = AgreementPipeline::new(Arc::clone(&context.templates), materializer);
        let dispatcher = NotificationDispatcher::new(
            mailer,
            Arc::clone(&context.templates),
            context.from_address.clone(),
            context.internal_recipients.clone(),
        );

        Self {
            context,
            pipeline,
            dispatcher,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.pipeline = self.pipeline.with_clock(clock);
        self
    }

    pub fn context(&self) -> &AgreementContext {
        &self.context
    }

    /// The signing form with the site title and field schema.
    pub fn form_page(&self) -> Result<String, AgreementError> {
        let view = self.view_data(None);
        Ok(self.context.templates.render(TemplateName::FormPage, &view)?)
    }

    pub async fn sign(&self, submission: Submission) -> Result<SignedAgreement, AgreementError> {
        self.pipeline.sign(submission).await
    }

    /// Produce the confirmation page. Notifications are returned un-started so the
    /// caller can emit its response before any send begins.
    pub async fn handle_sign_request(
        &self,
        submission: Submission,
    ) -> Result<SignResponse<M>, AgreementError> {
        self.context.form.validate(&submission)?;
        let signed = self.sign(submission).await?;

        let view = self.view_data(Some(&signed.submission));
        let page = self
            .context
            .templates
            .render(TemplateName::ConfirmationPage, &view)?;

        info!(
            company = signed.submission.company(),
            date = signed.submission.date(),
            "agreement signed"
        );

        Ok(SignResponse {
            page,
            dispatch: PendingDispatch {
                dispatcher: self.dispatcher.clone(),
                signed,
            },
        })
    }

    /// The example dataset rendered to PDF bytes; nothing is sent.
    pub async fn handle_example_request(&self) -> Result<Vec<u8>, AgreementError> {
        self.pipeline
            .render_document(self.context.example.clone())
            .await
    }

    fn view_data(&self, submission: Option<&Submission>) -> Value {
        let mut view = Map::new();
        view.insert("title".to_string(), Value::String(self.context.title.clone()));
        view.insert(
            "form".to_string(),
            serde_json::to_value(&self.context.form).unwrap_or(Value::Null),
        );
        if let Some(submission) = submission {
            for (key, value) in submission.fields() {
                view.insert(key.clone(), Value::String(value.clone()));
            }
        }
        Value::Object(view)
    }
}

impl<M, P> std::fmt::Debug for AgreementService<M, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgreementService")
            .field("pipeline", &self.pipeline)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
