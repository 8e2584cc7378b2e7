use std::sync::Arc;

use super::submission::Submission;
use super::templates::{TemplateCache, TemplateError, TemplateName};

/// Agreement HTML ready for materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAgreement(String);

impl From<String> for RenderedAgreement {
    fn from(html: String) -> Self {
        Self(html)
    }
}

impl RenderedAgreement {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Fills the agreement template from a submission.
#[derive(Debug, Clone)]
pub struct DocumentRenderer {
    templates: Arc<TemplateCache>,
}

impl DocumentRenderer {
    pub fn new(templates: Arc<TemplateCache>) -> Self {
        Self { templates }
    }

    /// Pure: the same submission always yields the same HTML.
    pub fn render(&self, submission: &Submission) -> Result<RenderedAgreement, TemplateError> {
        self.templates
            .render(TemplateName::Agreement, submission)
            .map(RenderedAgreement)
    }
}
