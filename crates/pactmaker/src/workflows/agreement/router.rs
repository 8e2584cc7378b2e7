use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use serde_json::json;
use tracing::error;

use super::mailer::Mailer;
use super::pdf::PdfMaterializer;
use super::service::{AgreementError, AgreementService, SignResponse};
use super::submission::Submission;

/// Router exposing the signing form, the sign action and the example document.
pub fn agreement_router<M, P>(service: Arc<AgreementService<M, P>>) -> Router
where
    M: Mailer + 'static,
    P: PdfMaterializer + 'static,
{
    Router::new()
        .route("/", get(form_handler::<M, P>))
        .route("/sign", post(sign_handler::<M, P>))
        .route("/example.pdf", get(example_handler::<M, P>))
        .with_state(service)
}

pub(crate) async fn form_handler<M, P>(
    State(service): State<Arc<AgreementService<M, P>>>,
) -> Response
where
    M: Mailer + 'static,
    P: PdfMaterializer + 'static,
{
    match service.form_page() {
        Ok(page) => Html(page).into_response(),
        Err(err) => failure_response(err),
    }
}

pub(crate) async fn sign_handler<M, P>(
    State(service): State<Arc<AgreementService<M, P>>>,
    Form(fields): Form<BTreeMap<String, String>>,
) -> Response
where
    M: Mailer + 'static,
    P: PdfMaterializer + 'static,
{
    match service.handle_sign_request(Submission::new(fields)).await {
        Ok(SignResponse { page, dispatch }) => {
            let response = Html(page).into_response();
            dispatch.fire();
            response
        }
        Err(err) => failure_response(err),
    }
}

pub(crate) async fn example_handler<M, P>(
    State(service): State<Arc<AgreementService<M, P>>>,
) -> Response
where
    M: Mailer + 'static,
    P: PdfMaterializer + 'static,
{
    match service.handle_example_request().await {
        Ok(pdf) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, mime::APPLICATION_PDF.as_ref())],
            pdf,
        )
            .into_response(),
        Err(err) => failure_response(err),
    }
}

fn failure_response(err: AgreementError) -> Response {
    match err {
        AgreementError::Submission(error) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        other => {
            error!(error = %other, "agreement request failed");
            let payload = json!({
                "error": "unable to generate the agreement",
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
