//! Agreement signing pipeline: render the submitted form into an agreement, turn it
//! into a PDF, answer the signee, then email the document to the signee and the
//! internal team in the background.

pub mod dispatch;
pub mod mailer;
pub mod pdf;
pub mod renderer;
pub mod router;
pub mod service;
pub mod submission;
pub mod templates;

#[cfg(test)]
mod tests;

pub use dispatch::{Audience, DeliveryError, DeliveryOutcome, NotificationDispatcher};
pub use mailer::{
    Attachment, DeliveryReceipt, Mailer, MailerError, NotificationMessage, PostmarkMailer,
};
pub use pdf::{
    MaterializedDocument, PageLayout, PdfError, PdfMaterializer, WkhtmltopdfMaterializer,
};
pub use renderer::{DocumentRenderer, RenderedAgreement};
pub use router::agreement_router;
pub use service::{
    AgreementContext, AgreementError, AgreementPipeline, AgreementService, ContextError,
    PendingDispatch, SignResponse, SignedAgreement,
};
pub use submission::{
    format_agreement_date, Clock, FixedClock, FormField, FormSchema, Submission,
    SubmissionError, SystemClock,
};
pub use templates::{TemplateCache, TemplateError, TemplateName, TemplateSources};
