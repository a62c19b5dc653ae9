use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use tokio::time::Instant;

use pacer::config::PacerConfig;
use pacer::messenger::Messenger;
use pacer::transport::{ChatId, MemoryTransport, SendOptions, SentMessage};

mod cli;

use cli::Cli;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pacer")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("pacer.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_simulation(cli: &Cli, config: PacerConfig) -> Result<()> {
    let transport = Arc::new(MemoryTransport::with_latency(Duration::from_millis(
        cli.send_latency_ms,
    )));
    let messenger = Arc::new(Messenger::from_config(transport.clone(), &config));
    let pacer = messenger
        .pacer()
        .ok_or_else(|| eyre::eyre!("simulator requires pacing enabled"))?
        .clone();
    pacer.start().await;

    println!(
        "{} {} chats x {} messages (rate {}/s, cooldown {:.2}s, latency {}ms)",
        "Simulating:".cyan(),
        cli.chats,
        cli.messages,
        config.global_rate(),
        config.per_chat_cooldown().as_secs_f64(),
        cli.send_latency_ms,
    );

    let started = Instant::now();
    let mut handles = Vec::with_capacity(cli.chats * cli.messages);
    for chat_index in 0..cli.chats {
        let chat_id = ChatId::Int(chat_index as i64 + 1);
        for message_index in 0..cli.messages {
            let messenger = messenger.clone();
            let chat_id = chat_id.clone();
            let text = format!("chat{}-msg{}", chat_index + 1, message_index + 1);
            handles.push(tokio::spawn(async move {
                let context = serde_json::json!({ "enqueued_by": "simulator" });
                messenger
                    .send_text(chat_id, text, SendOptions::default(), Some(context))
                    .await
            }));
        }
    }

    // Give the queue a moment to fill so the backlog snapshot means something.
    tokio::time::sleep(Duration::from_millis(100)).await;
    if let Some(metrics) = messenger.queue_metrics() {
        println!(
            "{} depth {}, max delay {:.2}s, avg delay {:.2}s",
            "Mid-run backlog:".cyan(),
            metrics.queue_depth,
            metrics.max_delay_sec,
            metrics.avg_delay_sec,
        );
    }

    let mut failures = 0usize;
    for handle in handles {
        match handle.await {
            Ok(Ok(_)) => {}
            _ => failures += 1,
        }
    }
    let elapsed = started.elapsed();
    pacer.stop().await;

    let sent = transport.sent();
    println!(
        "{} {} sends in {:.2}s ({} failures)",
        "Done:".green(),
        sent.len(),
        elapsed.as_secs_f64(),
        failures,
    );

    report(&sent, &config);

    let typing = transport.typing_events().len();
    if typing > 0 {
        println!("Typing indicators fired: {}", typing);
    }

    Ok(())
}

fn report(sent: &[SentMessage], config: &PacerConfig) {
    let mut per_chat: HashMap<&ChatId, Vec<Instant>> = HashMap::new();
    for message in sent {
        per_chat.entry(&message.chat_id).or_default().push(message.at);
    }

    let mut chats: Vec<_> = per_chat.into_iter().collect();
    chats.sort_by_key(|(chat, _)| chat.to_string());

    for (chat, mut times) in chats {
        times.sort();
        let min_gap = times
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]))
            .min();
        match min_gap {
            Some(gap) => println!(
                "  chat {}: {} sends, min gap {:.3}s",
                chat,
                times.len(),
                gap.as_secs_f64()
            ),
            None => println!("  chat {}: {} sends", chat, times.len()),
        }
    }

    let mut all: Vec<Instant> = sent.iter().map(|message| message.at).collect();
    all.sort();
    let peak = max_in_window(&all, Duration::from_secs(1));
    let label = if peak <= config.global_rate() as usize {
        "Global window:".green()
    } else {
        "Global window:".red()
    };
    println!("{} peak {} sends/s (limit {}/s)", label, peak, config.global_rate());
}

/// Largest number of timestamps falling inside any sliding window.
fn max_in_window(times: &[Instant], window: Duration) -> usize {
    let mut best = 0;
    let mut start = 0;
    for end in 0..times.len() {
        while times[end].duration_since(times[start]) >= window {
            start += 1;
        }
        best = best.max(end - start + 1);
    }
    best
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration and apply CLI overrides
    let mut config = PacerConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(rate) = cli.global_rate {
        config.global_rate_per_sec = rate;
    }
    if let Some(cooldown) = cli.cooldown {
        config.per_chat_cooldown_sec = cooldown;
    }
    config.enabled = true;
    config.validate().context("Invalid configuration")?;

    info!("Starting burst simulation with config from: {:?}", cli.config);

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    run_simulation(&cli, config).await.context("Simulation failed")?;

    Ok(())
}
