use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use battlewatch::cli::{Cli, Commands};
use battlewatch::domain::subject::display_tag;
use battlewatch::monitor::{
    event_channel, EventReceiver, MonitorScheduler, MonitorService, RequestBudget, RivalsReply,
};
use battlewatch::{
    AppConfig, JsonFileStore, Result, RoyaleClient, SubjectAggregate, WebhookNotifier,
};

fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,battlewatch=debug"));

    // Optional daily-rotating file output. `tracing_appender` panics if it
    // cannot create the initial log file, so preflight writability first.
    let file_layer = match std::env::var("BATTLEWATCH_LOG_DIR") {
        Ok(log_dir) if std::fs::create_dir_all(&log_dir).is_ok() => {
            let test_path = std::path::Path::new(&log_dir).join(".battlewatch_write_test");
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&test_path)
            {
                Ok(_) => {
                    let _ = std::fs::remove_file(&test_path);

                    let file_appender = tracing_appender::rolling::daily(&log_dir, "battlewatch.log");
                    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                    // Keep the guard alive for the life of the process.
                    Box::leak(Box::new(guard));

                    Some(
                        tracing_subscriber::fmt::layer()
                            .with_writer(non_blocking)
                            .with_ansi(false)
                            .with_target(true),
                    )
                }
                Err(e) => {
                    eprintln!(
                        "Warning: Could not write to log directory {} ({}), file logging disabled",
                        log_dir, e
                    );
                    None
                }
            }
        }
        Ok(log_dir) => {
            eprintln!(
                "Warning: Could not create log directory {}, file logging disabled",
                log_dir
            );
            None
        }
        Err(_) => None,
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let mut config = AppConfig::load_from(&cli.config_dir)?;
    if let Some(data_dir) = &cli.data_dir {
        config.store.data_dir = data_dir.into();
    }
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config: {}", e);
        }
        return Err(battlewatch::WatchError::Internal(format!(
            "invalid configuration ({} errors)",
            errors.len()
        )));
    }

    let store = Arc::new(JsonFileStore::new(&config.store.data_dir)?);
    let client = Arc::new(RoyaleClient::new(&config.api)?);
    let budget = RequestBudget::new(config.monitor.requests_per_sec, config.monitor.burst);
    let (events, event_rx) = event_channel();

    let scheduler = Arc::new(MonitorScheduler::new(
        client,
        store,
        budget,
        events,
        config.monitor.clone(),
    ));
    let service = MonitorService::new(scheduler);
    service.bootstrap().await?;

    match cli.command {
        Commands::Run => run_daemon(&service, event_rx).await,
        Commands::Monitor { tag } => {
            let subject = service.start_monitoring(&tag).await?;
            println!(
                "Now monitoring {} ({})",
                subject.name,
                display_tag(&subject.tag)
            );
            service.shutdown().await;
            Ok(())
        }
        Commands::Unmonitor { tag } => {
            let subject = service.stop_monitoring(&tag).await?;
            println!(
                "Stopped monitoring {} ({}). Battle history is preserved.",
                subject.name,
                display_tag(&subject.tag)
            );
            service.shutdown().await;
            Ok(())
        }
        Commands::List => {
            let subjects = service.list_monitored().await;
            if subjects.is_empty() {
                println!("No players are currently being monitored.");
            } else {
                println!("Monitored players:");
                for (subject, phase) in subjects {
                    let stats = service.get_stats(&subject.tag).await?;
                    println!(
                        "  {} ({}) [{} | {}] - {} games, {:.1}% WR",
                        subject.name,
                        display_tag(&subject.tag),
                        subject.status,
                        phase,
                        stats.totals.battles,
                        stats.overall_win_rate() * 100.0,
                    );
                }
            }
            service.shutdown().await;
            Ok(())
        }
        Commands::Stats { tag } => {
            let stats = service.get_stats(&tag).await?;
            print_stats(&tag, &stats);
            service.shutdown().await;
            Ok(())
        }
        Commands::Rivals { tag, opponent } => {
            let reply = service.get_rivals(&tag, opponent.as_deref()).await?;
            print_rivals(&reply);
            service.shutdown().await;
            Ok(())
        }
        Commands::Forget { tag } => {
            service.forget_subject(&tag).await?;
            println!("Deleted all recorded history for {}", tag);
            service.shutdown().await;
            Ok(())
        }
        Commands::Poll { tag } => {
            let report = service.poll_now(&tag).await?;
            println!(
                "Cycle #{} complete: {} new battle(s){}",
                report.fetch_seq,
                report.new_battles,
                if report.discontinuity {
                    " (log discontinuity detected)"
                } else {
                    ""
                }
            );
            service.shutdown().await;
            Ok(())
        }
    }
}

async fn run_daemon(service: &MonitorService, mut event_rx: EventReceiver) -> Result<()> {
    let webhook = WebhookNotifier::from_env();

    // Notification fan-out: log every event, forward to the webhook if one
    // is configured.
    let consumer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!(subject = event.subject_tag(), "{}", event.describe());
            if let Some(webhook) = &webhook {
                webhook.notify_event(&event).await;
            }
        }
    });

    info!("battlewatch daemon running, press Ctrl-C to stop");
    if let Err(e) = signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
    }

    info!("shutting down");
    service.shutdown().await;
    consumer.abort();
    Ok(())
}

fn print_stats(tag: &str, stats: &SubjectAggregate) {
    if stats.totals.battles == 0 {
        println!("No battle statistics recorded for {}", tag);
        return;
    }

    let total = &stats.totals;
    println!("Battle statistics for {}", tag);
    println!("========================================");
    println!("Total: {}W / {}L / {}D", total.wins, total.losses, total.draws);
    println!("Games played: {}", total.battles);
    println!("Win rate: {:.1}%", total.win_rate() * 100.0);
    println!();
    println!("BY GAME MODE:");

    let mut modes: Vec<_> = stats.by_mode.iter().collect();
    modes.sort_by(|a, b| b.1.battles.cmp(&a.1.battles));
    for (mode, bucket) in modes {
        println!("{}:", mode);
        println!(
            "  Record: {}W / {}L / {}D",
            bucket.wins, bucket.losses, bucket.draws
        );
        println!(
            "  Games: {} | Win rate: {:.1}%",
            bucket.battles,
            bucket.win_rate() * 100.0
        );
    }
}

fn print_rivals(reply: &RivalsReply) {
    match reply {
        RivalsReply::List(rivals) => {
            if rivals.is_empty() {
                println!("No repeat opponents found. Keep playing to track rivalries!");
                return;
            }
            println!("Repeat opponents:");
            for (i, rival) in rivals.iter().enumerate() {
                println!(
                    "{}. {} ({}) - {} matches, {}W/{}L/{}D, {:.1}% WR",
                    i + 1,
                    rival.name,
                    display_tag(&rival.tag),
                    rival.battles,
                    rival.wins,
                    rival.losses,
                    rival.draws,
                    rival.win_rate * 100.0,
                );
            }
        }
        RivalsReply::HeadToHead(rival) => {
            println!(
                "Head-to-head vs {} ({}): {} matches, {}W/{}L/{}D, {:.1}% WR, last seen {}",
                rival.name,
                display_tag(&rival.tag),
                rival.battles,
                rival.wins,
                rival.losses,
                rival.draws,
                rival.win_rate * 100.0,
                rival.last_seen.format("%Y-%m-%d %H:%M UTC"),
            );
        }
    }
}
