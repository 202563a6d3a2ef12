use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use std::io::{stdout, Write};

use crate::error::Result;
use crate::persistence::replay::MAX_PAGE_SIZE;
use crate::services::Pipeline;

#[derive(Parser)]
#[command(name = "loghook")]
#[command(version)]
#[command(about = "Sequenced log ingestion with durable queueing, checkpoints and replay", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml plus the LOGHOOK_ENV overlay)
    #[arg(short, long, default_value = "config", global = true)]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and the persistence worker
    Serve {
        /// Keep everything in process memory instead of PostgreSQL
        #[arg(long)]
        memory: bool,
    },
    /// Apply database migrations
    Migrate,
    /// Persist everything currently queued, then exit
    Drain,
    /// Record a checkpoint at the current high-water mark
    Checkpoint,
    /// Print events after a checkpoint as JSON lines
    Replay {
        /// Checkpoint identifier
        checkpoint_id: String,
        /// Resume after this sequence id
        #[arg(long)]
        after: Option<i64>,
        /// Stop after this many events
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Show queue depth, counters and high-water mark
    Status,
}

/// One worker drain to completion
pub async fn drain_queue(pipeline: &Pipeline) -> Result<()> {
    let report = pipeline.worker.drain().await?;
    println!(
        "Drained {} batches: {} persisted, {} redelivered, {} failed commits",
        report.batches, report.persisted, report.redelivered, report.failures
    );
    Ok(())
}

pub async fn create_checkpoint(pipeline: &Pipeline) -> Result<()> {
    let checkpoint = pipeline.checkpoints.create().await?;
    println!("{}", checkpoint.checkpoint_id);
    eprintln!("last_sequence = {}", checkpoint.last_sequence);
    Ok(())
}

/// Stream the replay to stdout, one JSON object per line
pub async fn replay_checkpoint(
    pipeline: &Pipeline,
    checkpoint_id: &str,
    after: Option<i64>,
    limit: Option<i64>,
) -> Result<()> {
    let mut out = stdout();

    if after.is_none() && limit.is_none() {
        let mut events = pipeline.replay.replay_stream(checkpoint_id).await?;
        while let Some(event) = events.try_next().await? {
            writeln!(out, "{}", serde_json::to_string(&event)?)?;
        }
        out.flush()?;
        return Ok(());
    }

    let page = pipeline
        .replay
        .replay_page(checkpoint_id, after, limit.unwrap_or(MAX_PAGE_SIZE))
        .await?;
    for event in &page.events {
        writeln!(out, "{}", serde_json::to_string(event)?)?;
    }
    out.flush()?;

    if let Some(cursor) = page.next_cursor {
        eprintln!("more events available: --after {}", cursor);
    }
    Ok(())
}

pub async fn show_status(pipeline: &Pipeline) -> Result<()> {
    let queue_depth = pipeline.queue.len().await?;
    let issued = pipeline.sequencer.current().await?;
    let high_water_mark = pipeline.repository.high_water_mark().await?;
    let latest = pipeline.checkpoints.list(Some(1)).await?;

    println!("queue depth:          {}", queue_depth);
    println!("last sequence issued: {}", issued);
    println!("high-water mark:      {}", high_water_mark);
    match latest.first() {
        Some(c) => println!(
            "latest checkpoint:    {} (sequence {}, {})",
            c.checkpoint_id, c.last_sequence, c.created_at
        ),
        None => println!("latest checkpoint:    none"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_replay_arguments() {
        let cli = Cli::parse_from(["loghook", "replay", "abc", "--after", "7", "--limit", "10"]);
        match cli.command {
            Commands::Replay {
                checkpoint_id,
                after,
                limit,
            } => {
                assert_eq!(checkpoint_id, "abc");
                assert_eq!(after, Some(7));
                assert_eq!(limit, Some(10));
            }
            _ => panic!("expected replay"),
        }
        assert_eq!(cli.config, "config");
    }

    #[test]
    fn test_parse_serve_memory() {
        let cli = Cli::parse_from(["loghook", "--config", "/etc/loghook", "serve", "--memory"]);
        assert!(matches!(cli.command, Commands::Serve { memory: true }));
        assert_eq!(cli.config, "/etc/loghook");
    }
}
