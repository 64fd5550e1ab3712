//! kps-query: run one identity verification and print the result as JSON.
//!
//! Credentials come from the environment (a `.env` file is loaded first) or from
//! a TOML file given with `--config`.
//!
//! ```text
//! kps-query --tcno 99999999999 --first-name JOHN --last-name DOE --birth-year 1990 \
//!           [--birth-month 01] [--birth-day 01] [--config kps.toml]
//! ```

use anyhow::{bail, Context};
use kps_core::{ClientConfig, KpsClient, QueryRequest};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Overall budget for negotiation plus the query call.
const QUERY_DEADLINE: Duration = Duration::from_secs(40);

struct Args {
    request: QueryRequest,
    config_path: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut request = QueryRequest::default();
    let mut config_path = None;

    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        let mut value = || args.next().with_context(|| format!("{a} needs a value"));
        match a.as_str() {
            "--tcno" => request.national_id = value()?,
            "--first-name" => request.first_name = value()?,
            "--last-name" => request.last_name = value()?,
            "--birth-year" => request.birth_year = value()?,
            "--birth-month" => request.birth_month = value()?,
            "--birth-day" => request.birth_day = value()?,
            "--config" => config_path = Some(value()?),
            other => bail!("unknown argument: {other}"),
        }
    }

    for (flag, v) in [
        ("--tcno", &request.national_id),
        ("--first-name", &request.first_name),
        ("--last-name", &request.last_name),
        ("--birth-year", &request.birth_year),
    ] {
        if v.trim().is_empty() {
            bail!("{flag} is required");
        }
    }
    Ok(Args {
        request,
        config_path,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[kps-query] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = parse_args()?;
    let config = match &args.config_path {
        Some(path) => ClientConfig::load(path),
        None => ClientConfig::from_env(),
    }
    .context("loading KPS configuration")?;
    let client = KpsClient::new(config).context("building KPS client")?;

    let deadline = tokio::time::Instant::now() + QUERY_DEADLINE;
    match client.query_until(&args.request, deadline).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(failure) => {
            let (error, partial) = failure.into_parts();
            println!("{}", serde_json::to_string_pretty(&partial)?);
            Err(anyhow::Error::new(error).context("verification query failed"))
        }
    }
}
