use crate::demo::{run_capacity_report, run_demo, CapacityReportArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use prison_ops::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Prison Operations",
    about = "Run the prison operations service or walk through its workflows from the command line",
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
    /// Print the visit availability heat map for a given booking load
    Capacity(CapacityReportArgs),
    /// Run an end-to-end CLI demo covering transfers, visits, and messaging
    Demo(DemoArgs),
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
        Command::Capacity(args) => run_capacity_report(args),
        Command::Demo(args) => run_demo(args),
    }
}
