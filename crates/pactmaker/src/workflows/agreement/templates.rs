use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

const AGREEMENT_HBS: &str = include_str!("../../../templates/agreement.hbs");
const FORM_PAGE_HBS: &str = include_str!("../../../templates/index.hbs");
const CONFIRMATION_PAGE_HBS: &str = include_str!("../../../templates/success.hbs");
const SIGNEE_EMAIL_HBS: &str = include_str!("../../../templates/emails/signee.hbs");
const INTERNAL_EMAIL_HBS: &str = include_str!("../../../templates/emails/internal.hbs");

/// Every template compiled at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateName {
    Agreement,
    FormPage,
    ConfirmationPage,
    SigneeEmail,
    InternalEmail,
    SigneeSubject,
    InternalSubject,
}

impl TemplateName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agreement => "agreement",
            Self::FormPage => "index",
            Self::ConfirmationPage => "success",
            Self::SigneeEmail => "emails/signee",
            Self::InternalEmail => "emails/internal",
            Self::SigneeSubject => "subjects/signee",
            Self::InternalSubject => "subjects/internal",
        }
    }

    fn is_subject(&self) -> bool {
        matches!(self, Self::SigneeSubject | Self::InternalSubject)
    }
}

impl std::fmt::Display for TemplateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw template text prior to compilation.
#[derive(Debug, Clone)]
pub struct TemplateSources {
    pub agreement: String,
    pub form_page: String,
    pub confirmation_page: String,
    pub signee_email: String,
    pub internal_email: String,
    pub signee_subject: String,
    pub internal_subject: String,
}

impl TemplateSources {
    /// Built-in templates with the given subject lines.
    pub fn embedded(signee_subject: &str, internal_subject: &str) -> Self {
        Self {
            agreement: AGREEMENT_HBS.to_string(),
            form_page: FORM_PAGE_HBS.to_string(),
            confirmation_page: CONFIRMATION_PAGE_HBS.to_string(),
            signee_email: SIGNEE_EMAIL_HBS.to_string(),
            internal_email: INTERNAL_EMAIL_HBS.to_string(),
            signee_subject: signee_subject.to_string(),
            internal_subject: internal_subject.to_string(),
        }
    }

    /// Built-in templates, each replaced by `<dir>/<name>.hbs` when that file exists.
    pub fn load(
        dir: Option<&Path>,
        signee_subject: &str,
        internal_subject: &str,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            agreement: read_override(dir, "agreement.hbs", AGREEMENT_HBS)?,
            form_page: read_override(dir, "index.hbs", FORM_PAGE_HBS)?,
            confirmation_page: read_override(dir, "success.hbs", CONFIRMATION_PAGE_HBS)?,
            signee_email: read_override(dir, "emails/signee.hbs", SIGNEE_EMAIL_HBS)?,
            internal_email: read_override(dir, "emails/internal.hbs", INTERNAL_EMAIL_HBS)?,
            signee_subject: signee_subject.to_string(),
            internal_subject: internal_subject.to_string(),
        })
    }

    fn entries(&self) -> [(TemplateName, &str); 7] {
        [
            (TemplateName::Agreement, self.agreement.as_str()),
            (TemplateName::FormPage, self.form_page.as_str()),
            (TemplateName::ConfirmationPage, self.confirmation_page.as_str()),
            (TemplateName::SigneeEmail, self.signee_email.as_str()),
            (TemplateName::InternalEmail, self.internal_email.as_str()),
            (TemplateName::SigneeSubject, self.signee_subject.as_str()),
            (TemplateName::InternalSubject, self.internal_subject.as_str()),
        ]
    }
}

/// Reads `<dir>/<file>` when present, otherwise returns the embedded fallback.
pub fn read_override(
    dir: Option<&Path>,
    file: &str,
    embedded: &'static str,
) -> Result<String, TemplateError> {
    if let Some(dir) = dir {
        let path = dir.join(file);
        if path.exists() {
            debug!(path = %path.display(), "loading template override");
            return std::fs::read_to_string(&path)
                .map_err(|source| TemplateError::Read { path, source });
        }
    }
    Ok(embedded.to_string())
}

/// Compiled templates, read-only after startup.
///
/// HTML templates are escaped; subject lines are plain text and rendered verbatim.
/// Placeholders missing from the data render as empty strings.
pub struct TemplateCache {
    html: Handlebars<'static>,
    plain: Handlebars<'static>,
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache").finish_non_exhaustive()
    }
}

impl TemplateCache {
    pub fn compile(sources: &TemplateSources) -> Result<Self, TemplateError> {
        let mut html = Handlebars::new();
        let mut plain = Handlebars::new();
        plain.register_escape_fn(handlebars::no_escape);

        for (name, source) in sources.entries() {
            let registry = if name.is_subject() {
                &mut plain
            } else {
                &mut html
            };
            registry
                .register_template_string(name.as_str(), source)
                .map_err(|source| TemplateError::Compile {
                    name,
                    source: Box::new(source),
                })?;
        }

        Ok(Self { html, plain })
    }

    pub fn render<T: Serialize>(
        &self,
        name: TemplateName,
        data: &T,
    ) -> Result<String, TemplateError> {
        let registry = if name.is_subject() {
            &self.plain
        } else {
            &self.html
        };
        registry
            .render(name.as_str(), data)
            .map_err(|source| TemplateError::Render {
                name,
                source: Box::new(source),
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("unable to read template {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("template '{name}' failed to compile: {source}")]
    Compile {
        name: TemplateName,
        #[source]
        source: Box<handlebars::TemplateError>,
    },
    #[error("template '{name}' failed to render: {source}")]
    Render {
        name: TemplateName,
        #[source]
        source: Box<handlebars::RenderError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn embedded_templates_compile() {
        TemplateCache::compile(&TemplateSources::embedded("Your agreement", "New signee"))
            .expect("built-in templates compile");
    }

    #[test]
    fn malformed_template_names_the_culprit() {
        let mut sources = TemplateSources::embedded("", "");
        sources.internal_email = "<p>{{#if company}}unclosed</p>".to_string();

        match TemplateCache::compile(&sources) {
            Err(TemplateError::Compile { name, .. }) => {
                assert_eq!(name, TemplateName::InternalEmail)
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn missing_placeholders_render_empty() {
        let mut sources = TemplateSources::embedded("", "");
        sources.agreement = "<p>{{name}} of {{company}}</p>".to_string();
        let cache = TemplateCache::compile(&sources).expect("compiles");

        let rendered = cache
            .render(TemplateName::Agreement, &json!({ "name": "Jane" }))
            .expect("renders");
        assert_eq!(rendered, "<p>Jane of </p>");
    }

    #[test]
    fn subjects_are_not_html_escaped() {
        let sources = TemplateSources::embedded("Agreement for {{company}}", "");
        let cache = TemplateCache::compile(&sources).expect("compiles");

        let subject = cache
            .render(TemplateName::SigneeSubject, &json!({ "company": "Smith & Sons" }))
            .expect("renders");
        assert_eq!(subject, "Agreement for Smith & Sons");

        let empty = cache
            .render(TemplateName::InternalSubject, &json!({ "company": "Acme" }))
            .expect("renders");
        assert_eq!(empty, "");
    }

    #[test]
    fn load_without_directory_uses_embedded_sources() {
        let sources = TemplateSources::load(None, "a", "b").expect("loads");
        assert_eq!(sources.agreement, AGREEMENT_HBS);
        assert_eq!(sources.signee_subject, "a");
        assert_eq!(sources.internal_subject, "b");
    }
}
