use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use cel_overlay::interceptor::Headers;
use cel_overlay::{CelInterceptor, Interceptor, InterceptorConfig, InterceptorError, Request};

#[derive(Parser)]
#[command(name = "cel-overlay")]
#[command(about = "Filter a JSON request with CEL and rewrite its body with overlays")]
#[command(version)]
struct Cli {
    /// Interceptor config (YAML, TOML or JSON)
    #[arg(long = "config")]
    config: PathBuf,

    /// Request body file; stdin when omitted
    #[arg(long = "body")]
    body: Option<PathBuf>,

    /// Request header as 'Name: value' (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request URL exposed as `requestURL`
    #[arg(long = "url", default_value = "")]
    url: String,

    /// Override the config's namespace
    #[arg(long = "namespace")]
    namespace: Option<String>,

    /// Log pipeline stages to stderr
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn parse_headers(raw: &[String]) -> Result<Headers, String> {
    let mut headers = Headers::new();
    for h in raw {
        let (name, value) = h
            .split_once(':')
            .ok_or_else(|| format!("header '{}' is not in 'Name: value' form", h))?;
        headers
            .entry(name.trim().to_string())
            .or_default()
            .push(value.trim().to_string());
    }
    Ok(headers)
}

fn read_request(cli: &Cli, headers: Headers) -> Result<Request, InterceptorError> {
    match &cli.body {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            Request::from_reader(cli.url.as_str(), headers, file)
        }
        None => {
            use std::io::IsTerminal;
            if std::io::stdin().is_terminal() {
                Request::from_reader(cli.url.as_str(), headers, std::io::empty())
            } else {
                Request::from_reader(cli.url.as_str(), headers, std::io::stdin().lock())
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match InterceptorConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };
    if let Some(ns) = &cli.namespace {
        config.namespace = ns.clone();
    }

    let headers = match parse_headers(&cli.headers) {
        Ok(headers) => headers,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };
    let request = match read_request(&cli, headers) {
        Ok(request) => request,
        Err(e) => {
            error!(stage = e.stage(), "{}", e);
            return ExitCode::from(1);
        }
    };
    debug!(bytes = request.body.len(), url = %request.url, "request read");

    match CelInterceptor::new(config).execute(request).await {
        Ok(response) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout
                .write_all(&response.body)
                .and_then(|_| stdout.write_all(b"\n"))
            {
                error!("cannot write output: {}", e);
                return ExitCode::from(1);
            }
            ExitCode::SUCCESS
        }
        Err(e) if e.is_rejection() => {
            eprintln!("{}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            error!(stage = e.stage(), "{}", e);
            ExitCode::from(1)
        }
    }
}
