mod cli;
mod infra;
mod process;
mod routes;
mod server;

use social_support::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
