use crate::example::{run_example, ExampleArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use pactmaker::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "PactMaker",
    about = "Serve the agreement signing site or render the example agreement",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Render the example agreement to a PDF file without sending anything
    Example(ExampleArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Example(args) => run_example(args).await,
    }
}
