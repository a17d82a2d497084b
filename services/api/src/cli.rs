use crate::demo::{print_policy, run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use course_completion::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Course Completion Engine",
    about = "Run the course completion and certification service or walk through a demo",
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
    /// Walk a learner from first lesson to a verified certificate
    Demo(DemoArgs),
    /// Print the effective completion and certification policy as JSON
    Policy,
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
        Command::Demo(args) => run_demo(args),
        Command::Policy => print_policy(),
    }
}
