use clap::Args;
use pactmaker::config::AppConfig;
use pactmaker::error::AppError;
use pactmaker::telemetry;
use pactmaker::workflows::agreement::{
    AgreementContext, AgreementPipeline, WkhtmltopdfMaterializer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug)]
pub(crate) struct ExampleArgs {
    /// Where to write the rendered example agreement
    #[arg(long, short, default_value = "example.pdf")]
    pub(crate) output: PathBuf,
}

pub(crate) async fn run_example(args: ExampleArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let context = AgreementContext::load_assets(&config)?;
    let materializer = Arc::new(WkhtmltopdfMaterializer::new(config.pdf.binary.clone()));
    let pdf = AgreementPipeline::new(Arc::clone(&context.templates), materializer)
        .render_document(context.example.clone())
        .await?;

    tokio::fs::write(&args.output, &pdf).await?;
    info!(
        path = %args.output.display(),
        bytes = pdf.len(),
        "example agreement written"
    );
    Ok(())
}
