//! ferry - run messages through an in-process job queue
//!
//! Wires the queue to a local processing function (uppercases the message),
//! waits for every submitted job and prints the records as JSON.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::Parser;
use ferry_core::{
    CallbackError, MessageProcessor, ProcessingError, QueueController, StatusUpdate,
};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::CliArgs;

/// Stand-in for a model call: sleeps, then answers in capitals.
struct ShoutProcessor {
    delay: Duration,
    fail_on: Option<String>,
}

#[async_trait]
impl MessageProcessor for ShoutProcessor {
    async fn process(
        &self,
        correlation_key: &str,
        _submitter_key: &str,
        payload: &str,
    ) -> Result<serde_json::Value, ProcessingError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(word) = &self.fail_on {
            if payload.contains(word.as_str()) {
                return Err(ProcessingError::failed(format!("refusing to answer '{payload}'")));
            }
        }
        Ok(serde_json::json!({
            "conversation": correlation_key,
            "answer": payload.to_uppercase(),
        }))
    }
}

fn log_status(update: &StatusUpdate) -> Result<(), CallbackError> {
    debug!(job = %update.job_id, status = %update.status, "status update");
    Ok(())
}

#[derive(Serialize)]
struct Report {
    jobs: Vec<ferry_core::JobRecord>,
    info: ferry_core::QueueInfo,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let args = CliArgs::parse();
    setup_logging(args.verbose);

    let messages = if args.messages.is_empty() {
        read_stdin().await.context("Failed to read messages from stdin")?
    } else {
        args.messages.clone()
    };
    if messages.is_empty() {
        bail!("no messages given");
    }

    let queue = QueueController::new(args.queue_config()).context("Invalid configuration")?;
    queue.configure(
        Arc::new(ShoutProcessor {
            delay: args.delay(),
            fail_on: args.fail_on.clone(),
        }),
        Arc::new(log_status),
    )?;
    queue.start().await?;

    let mut ids = Vec::with_capacity(messages.len());
    for message in messages {
        let id = queue
            .submit(args.conversation.as_str(), args.session.as_str(), message)
            .await
            .context("Failed to submit message")?;
        ids.push(id);
    }
    info!(submitted = ids.len(), "all messages queued");

    let mut jobs = Vec::with_capacity(ids.len());
    for id in ids {
        let record = queue
            .wait(id, args.wait_timeout())
            .await
            .with_context(|| format!("Waiting for {id}"))?;
        jobs.push(record);
    }

    let report = Report {
        jobs,
        info: queue.info(),
    };
    queue.stop().await;

    let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
    println!("{json}");
    Ok(())
}

async fn read_stdin() -> Result<Vec<String>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut messages = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if !line.is_empty() {
            messages.push(line.to_string());
        }
    }
    Ok(messages)
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("ferry_core=debug,ferry=debug,warn")
        } else {
            EnvFilter::new("ferry_core=info,ferry=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
