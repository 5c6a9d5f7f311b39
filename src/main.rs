use std::io;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use colored::*;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use rsi_loop::adapters::webhook;
use rsi_loop::cli::{Args, Commands};
use rsi_loop::{Config, Correlation, Fix, FixStatus, Inbox, Pattern, RsiLoop, SimpleOutcome, Trend};

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(args: &Args) -> rsi_loop::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Text output
// ---------------------------------------------------------------------------

fn health_label(score: f64) -> ColoredString {
    let text = format!("{score:.3}");
    if score >= 0.8 {
        text.bright_green()
    } else if score >= 0.5 {
        text.bright_yellow()
    } else {
        text.bright_red()
    }
}

fn print_patterns(patterns: &[Pattern]) {
    if patterns.is_empty() {
        println!("{}", "No patterns in window.".dimmed());
        return;
    }
    for (rank, p) in patterns.iter().enumerate() {
        let trend = match p.trend {
            Trend::Increasing => p.trend.to_string().bright_red(),
            Trend::New => p.trend.to_string().bright_cyan(),
            _ => p.trend.to_string().normal(),
        };
        println!(
            "{:>2}. {} [{}] impact {:.3}  {}{}",
            rank + 1,
            p.id.bold(),
            p.category.to_string().bright_blue(),
            p.impact_score,
            trend,
            if p.recurring { " (recurring)".bright_red().to_string() } else { String::new() },
        );
        println!("    {}", p.description);
        println!("    {} {}", "→".dimmed(), p.suggested_action.dimmed());
    }
}

fn print_correlations(correlations: &[Correlation]) {
    if correlations.is_empty() {
        println!("{}", "No cross-source correlations.".dimmed());
        return;
    }
    for c in correlations {
        println!(
            "{} {}  (sources: {})",
            c.correlation.bold(),
            c.issues.join(" + "),
            c.sources.join(", ")
        );
    }
}

fn print_fixes(fixes: &[Fix]) {
    if fixes.is_empty() {
        println!("{}", "No fix proposals.".dimmed());
        return;
    }
    for fix in fixes {
        let status = match fix.status {
            FixStatus::Applied => fix.status.to_string().bright_green(),
            FixStatus::Rejected => fix.status.to_string().bright_red(),
            _ => fix.status.to_string().bright_yellow(),
        };
        println!("{} [{}] {} → {}", fix.id.bold(), status, fix.pattern_id, fix.target);
        println!("    {}", fix.description);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Commands::Completions { shell } = &args.command {
        clap_complete::generate(*shell, &mut Args::command(), "rsi-loop", &mut io::stdout());
        return Ok(());
    }

    init_tracing();
    let rsi = Arc::new(RsiLoop::new(load_config(&args)?));
    let window = rsi.store().window_days();

    match args.command {
        Commands::Record { task, failed, error, model, duration_ms, quality, source, tags } => {
            let mut simple = SimpleOutcome::new(task)
                .success(!failed)
                .quality(quality)
                .source(source)
                .tags(tags);
            if let Some(error) = error {
                simple = simple.error(error);
            }
            if let Some(model) = model {
                simple = simple.model(model);
            }
            if let Some(ms) = duration_ms {
                simple = simple.duration_ms(ms);
            }
            let outcome = rsi.store().record_simple(simple)?;
            if args.json {
                print_json(&outcome)?;
            } else {
                let issues = if outcome.issues.is_empty() {
                    "none".to_string()
                } else {
                    outcome.issues.join(", ")
                };
                println!(
                    "{} {} (issues: {})",
                    "recorded".bright_green(),
                    outcome.id.bold(),
                    issues
                );
            }
        }

        Commands::Analyze { days } => {
            let patterns = rsi.analyzer().analyze(days.unwrap_or(window))?;
            if args.json {
                print_json(&patterns)?;
            } else {
                print_patterns(&patterns);
            }
        }

        Commands::Health { days } => {
            let score = rsi.analyzer().health_score(days.unwrap_or(window))?;
            if args.json {
                print_json(&serde_json::json!({ "health_score": score }))?;
            } else {
                println!("health {}", health_label(score));
            }
        }

        Commands::Correlations { days } => {
            let correlations = rsi.analyzer().cross_source_correlations(days.unwrap_or(window))?;
            if args.json {
                print_json(&correlations)?;
            } else {
                print_correlations(&correlations);
            }
        }

        Commands::Recurrences { threshold: t } => {
            let counts = rsi.store().recurrences(t.unwrap_or(rsi.store().recurrence_threshold()))?;
            if args.json {
                print_json(&counts)?;
            } else if counts.is_empty() {
                println!("{}", "No recurring issues.".dimmed());
            } else {
                for (issue, count) in &counts {
                    println!("{:>5}  {}", count, issue);
                }
            }
        }

        Commands::Fixes => {
            let fixes = rsi.fixes()?;
            if args.json {
                print_json(&fixes)?;
            } else {
                print_fixes(&fixes);
            }
        }

        Commands::Ingest { dir } => {
            let recorded = Inbox::new(dir).poll(rsi.store())?;
            if args.json {
                print_json(&recorded)?;
            } else {
                println!("{} {} outcome(s)", "ingested".bright_green(), recorded.len());
            }
        }

        Commands::Run { interval: None } => {
            let patterns = rsi.run_cycle()?;
            if args.json {
                print_json(&patterns)?;
            } else {
                print_patterns(&patterns);
            }
        }

        Commands::Run { interval: Some(secs) } => {
            rsi.start_background(Duration::from_secs(secs.max(1)))?;
            eprintln!(
                "{}",
                format!("  cycling every {}s. Press Ctrl+C to stop.", secs.max(1)).bright_blue()
            );
            tokio::signal::ctrl_c().await?;
            rsi.stop_background().await;
        }

        Commands::Serve { host, port } => {
            let addr = format!("{host}:{port}");
            let banner = format!("  Webhook listening on http://{addr}. Press Ctrl+C to stop.");
            eprintln!("{}", banner.bright_green());
            tokio::select! {
                result = webhook::serve(&addr, Arc::clone(&rsi)) => result?,
                _ = tokio::signal::ctrl_c() => {}
            }
        }

        Commands::Completions { .. } => {}
    }

    Ok(())
}
