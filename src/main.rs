use anyhow::Context;
use bytes::{Buf, BytesMut};
use dispatch_engine::config::Config;
use dispatch_engine::http::parser::{ParseError, head_len, parse_request_head};
use dispatch_engine::http::request::Request;
use dispatch_engine::{DispatchDecision, Dispatcher, Transport};
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

/// Default buffer size for stdin reads
const BUFFER_SIZE: usize = 8192;

/// Prints each decision as one JSON line instead of opening a connection.
struct LogTransport;

impl Transport for LogTransport {
    async fn forward(&self, request: &Request, decision: &DispatchDecision) -> anyhow::Result<()> {
        tracing::info!(
            method = request.method.as_str(),
            path = %request.path,
            upstream = decision.target.as_deref().unwrap_or("-"),
            upstream_path = %decision.path,
            "Request dispatched"
        );
        println!("{}", serde_json::to_string(decision)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cfg = Config::load();
    let dispatcher = cfg
        .dispatch_config()?
        .into_dispatcher()
        .with_context(|| format!("Invalid configuration in {}", cfg.config_path.display()))?;

    tokio::select! {
        res = run(&dispatcher) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// Reads request heads from stdin and dispatches them until EOF.
async fn run(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let transport = LogTransport;
    let mut stdin = tokio::io::stdin();
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        loop {
            while buffer.first().is_some_and(|b| *b == b'\r' || *b == b'\n') {
                buffer.advance(1);
            }

            match parse_request_head(&buffer) {
                Ok((request, consumed)) => {
                    buffer.advance(consumed);
                    match dispatcher.forward(&transport, &request).await {
                        Ok(decision) if !decision.proxy => {
                            println!("{}", serde_json::to_string(&decision)?);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(path = %request.path, error = %e, "Dispatch failed");
                        }
                    }
                }
                Err(ParseError::Incomplete) => break,
                Err(e) => {
                    tracing::warn!(error = ?e, "Discarding malformed request head");
                    let skip = head_len(&buffer).unwrap_or(buffer.len());
                    buffer.advance(skip);
                }
            }
        }

        let n = stdin.read_buf(&mut buffer).await?;
        if n == 0 {
            if !buffer.is_empty() {
                tracing::warn!(bytes = buffer.len(), "Incomplete request head at end of input");
            }
            return Ok(());
        }
    }
}
