//! CLI definitions for the burst simulator.
//!
//! The simulator floods the pacer with synthetic sends across several chats
//! and reports how the limiters shaped the traffic, without touching a real
//! messaging platform.

use clap::Parser;
use std::path::PathBuf;

/// Pacer burst simulator - exercise the send queue against a fake transport
#[derive(Parser, Debug)]
#[command(name = "pacer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of chats to flood
    #[arg(long, default_value_t = 3)]
    pub chats: usize,

    /// Messages per chat
    #[arg(long, default_value_t = 10)]
    pub messages: usize,

    /// Simulated transport latency in milliseconds
    #[arg(long, default_value_t = 0)]
    pub send_latency_ms: u64,

    /// Override the configured global sends-per-second limit
    #[arg(long)]
    pub global_rate: Option<u32>,

    /// Override the configured per-chat cooldown in seconds
    #[arg(long)]
    pub cooldown: Option<f64>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["pacer"]);
        assert_eq!(cli.chats, 3);
        assert_eq!(cli.messages, 10);
        assert_eq!(cli.send_latency_ms, 0);
        assert!(cli.global_rate.is_none());
        assert!(!cli.is_verbose());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "pacer",
            "--chats",
            "5",
            "--messages",
            "40",
            "--global-rate",
            "10",
            "--cooldown",
            "0.5",
            "--verbose",
        ]);
        assert_eq!(cli.chats, 5);
        assert_eq!(cli.messages, 40);
        assert_eq!(cli.global_rate, Some(10));
        assert_eq!(cli.cooldown, Some(0.5));
        assert!(cli.is_verbose());
    }
}
