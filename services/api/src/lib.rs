mod cli;
mod example;
mod infra;
mod routes;
mod server;

use pactmaker::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
