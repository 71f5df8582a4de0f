mod cli;
mod infra;
mod jobs;
mod routes;
mod scheduler;
mod server;

use campus_admin::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
