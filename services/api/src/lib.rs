mod cli;
mod infra;
mod preview;
mod routes;
mod server;

use tax_revenue::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
