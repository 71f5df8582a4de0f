use crate::jobs::{self, Job};
use crate::server;
use campus_admin::billing::EntityKind;
use campus_admin::error::AppError;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Campus Admin",
    about = "Run the campus billing service and its maintenance jobs from the command line",
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
    /// Run the daily status transition once for one entity kind
    Transition {
        #[command(subcommand)]
        command: TransitionCommand,
    },
    /// Inspect or extend the payment concept type registry
    ConceptTypes {
        #[command(subcommand)]
        command: ConceptTypesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TransitionCommand {
    /// Activate approved discounts inside their window and expire finished ones
    Discounts(TransitionArgs),
    /// Activate approved price lists inside their window and expire finished ones
    PriceLists(TransitionArgs),
}

#[derive(Subcommand, Debug)]
enum ConceptTypesCommand {
    /// Print every registered type with its index
    List(StoreArgs),
    /// Register a new type label at the next free index
    Append {
        label: String,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Stop offering a type for new concepts; existing rows keep resolving
    Deactivate {
        index: u32,
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    #[command(flatten)]
    pub(crate) store: StoreArgs,
}

#[derive(Args, Debug, Default)]
pub(crate) struct StoreArgs {
    /// SQLite database file; overrides APP_STORAGE and APP_DATABASE_PATH
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct TransitionArgs {
    /// Evaluation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    #[command(flatten)]
    pub(crate) store: StoreArgs,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Transition { command } => {
            let (kind, args) = match command {
                TransitionCommand::Discounts(args) => (EntityKind::Discount, args),
                TransitionCommand::PriceLists(args) => (EntityKind::PriceList, args),
            };
            jobs::run(
                Job::Transition {
                    kind,
                    today: args.today,
                },
                args.store,
            )
        }
        Command::ConceptTypes { command } => match command {
            ConceptTypesCommand::List(store) => jobs::run(Job::ListTypes, store),
            ConceptTypesCommand::Append { label, store } => {
                jobs::run(Job::AppendType(label), store)
            }
            ConceptTypesCommand::Deactivate { index, store } => {
                jobs::run(Job::DeactivateType(index), store)
            }
        },
    }
}
