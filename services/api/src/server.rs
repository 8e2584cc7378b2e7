use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use pactmaker::config::AppConfig;
use pactmaker::error::AppError;
use pactmaker::telemetry;
use pactmaker::workflows::agreement::{
    agreement_router, AgreementContext, AgreementService, PostmarkMailer,
    WkhtmltopdfMaterializer,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let context = AgreementContext::load(&config)?;
    let server_token = config.delivery.server_token.clone().unwrap_or_default();
    let mailer = Arc::new(PostmarkMailer::new(server_token, &config.delivery.api_url)?);
    let materializer = Arc::new(WkhtmltopdfMaterializer::new(config.pdf.binary.clone()));
    let service = Arc::new(AgreementService::new(context, mailer, materializer));

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let app = with_operational_routes(agreement_router(service), &config.site.public_dir)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        internal_recipients = config.delivery.internal_recipients.len(),
        "PactMaker is up and running"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
