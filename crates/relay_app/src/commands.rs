use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use relay_core::{compare as compare_lists, parse_reference_list, ItemRange, KindTable, Reference};
use relay_engine::{EngineEvent, EngineHandle, ItemOutcome, ItemProgress, SessionOptions};
use relay_logging::{relay_info, relay_warn};
use tokio::sync::oneshot;

use crate::config::AppConfig;
use crate::destination::{DestinationStore, DEFAULT_STORE};
use crate::sink::DirectoryTransport;
use crate::{DestinationCommand, RunArgs};

pub const DEFAULT_USER: &str = "default";
pub const DEFAULT_DEST: &str = "./delivered";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn read_list(path: &Path, kinds: &KindTable) -> anyhow::Result<Vec<Reference>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading list {}", path.display()))?;
    let references = parse_reference_list(&text, kinds);
    relay_info!("{}: {} items accepted", path.display(), references.len());
    Ok(references)
}

fn store(config: &AppConfig) -> DestinationStore {
    DestinationStore::new(
        config
            .destinations_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE)),
    )
}

pub fn compare(config: &AppConfig, old: &Path, new: &Path) -> anyhow::Result<()> {
    let kinds = config.engine_config().kinds;
    let old = read_list(old, &kinds)?;
    let new = read_list(new, &kinds)?;
    let (mut items, stats) = compare_lists(&old, &new).context("comparison rejected")?;
    items.sort_by_key(|r| r.ordinal);

    println!(
        "old={} new={} common={} new_only={} old_only={} duplicates_old={} duplicates_new={}",
        stats.old_count,
        stats.new_count,
        stats.common_count,
        stats.new_only_count,
        stats.old_only_count,
        stats.duplicate_in_old,
        stats.duplicate_in_new
    );
    for item in &items {
        println!("{}. [{}] {}: {}", item.ordinal, item.kind, item.title, item.url);
    }
    Ok(())
}

pub fn destination(config: &AppConfig, command: DestinationCommand) -> anyhow::Result<()> {
    let store = store(config);
    match command {
        DestinationCommand::Set { dir, name, user } => {
            let sink_id = dir.display().to_string();
            let sink_name = name.unwrap_or_else(|| sink_id.clone());
            let record = store.save(&user, &sink_id, &sink_name)?;
            println!("{user}: {} ({}) since {}", record.sink_name, record.sink_id, record.timestamp);
        }
        DestinationCommand::Show { user } => match store.get(&user) {
            Some(record) => {
                println!("{user}: {} ({}) since {}", record.sink_name, record.sink_id, record.timestamp)
            }
            None => println!("{user}: no destination stored, using {DEFAULT_DEST}"),
        },
        DestinationCommand::Clear { user } => {
            if store.clear(&user)? {
                println!("{user}: destination cleared");
            } else {
                println!("{user}: nothing to clear");
            }
        }
    }
    Ok(())
}

pub async fn run(config: &AppConfig, args: RunArgs) -> anyhow::Result<()> {
    let engine_config = config.engine_config();
    let range = ItemRange::parse(&args.range).context("invalid --range")?;
    let quality = args.quality.or_else(|| config.default_quality.clone());
    if let Some(label) = &quality {
        if engine_config.qualities.get(label).is_none() {
            let known: Vec<&str> = engine_config.qualities.labels().collect();
            bail!("unknown quality '{label}', expected one of {}", known.join(", "));
        }
    }
    let dest = match args.dest {
        Some(dir) => dir,
        None => store(config)
            .get(&args.user)
            .map(|record| PathBuf::from(record.sink_id))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DEST)),
    };

    let new = read_list(&args.list, &engine_config.kinds)?;
    let handle = EngineHandle::new(
        engine_config.clone(),
        Arc::new(DirectoryTransport::new(&dest, engine_config.fetch.chunk_size)),
        Arc::new(config.toolchain()),
    )
    .context("starting engine")?;

    let session = match &args.old {
        Some(old_path) => {
            let old = read_list(old_path, &engine_config.kinds)?;
            let (session, stats) = handle
                .registry()
                .open_compared(&old, &new)
                .context("comparison rejected")?;
            println!(
                "{} new of {} ({} already processed)",
                stats.new_only_count, stats.new_count, stats.common_count
            );
            match session {
                Some(session) => session,
                None => {
                    println!("Nothing new to process");
                    return Ok(());
                }
            }
        }
        None => {
            if new.is_empty() {
                println!("No usable links in {}", args.list.display());
                return Ok(());
            }
            handle.registry().open(new)
        }
    };

    handle.registry().configure(
        session,
        SessionOptions {
            range,
            quality,
            custom_caption: args.caption,
            watermark: args.watermark,
        },
    );
    println!("Delivering to {}", dest.display());
    handle.run_batch(session);

    let (stop_tx, mut stop_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(());
        }
    });

    let mut stopping = false;
    loop {
        if !stopping && stop_rx.try_recv().is_ok() {
            relay_warn!("Stop requested, finishing the current step");
            handle.cancel(session);
            stopping = true;
        }
        while let Some(event) = handle.try_recv() {
            match event {
                EngineEvent::Progress(progress) => print_progress(&progress),
                EngineEvent::ItemFinished(report) => {
                    let outcome = match &report.outcome {
                        ItemOutcome::Delivered { parts } => format!("delivered in {parts} part(s)"),
                        ItemOutcome::Failed { kind, message } => format!("failed: {kind} ({message})"),
                        ItemOutcome::Skipped { platform } => format!("skipped, {platform} needs manual handling"),
                    };
                    println!("{}. {}: {outcome}", report.ordinal, report.title);
                    for warning in &report.warnings {
                        println!("   warning: {warning}");
                    }
                }
                EngineEvent::BatchFinished { summary, .. } => {
                    println!("{summary}");
                    return Ok(());
                }
                EngineEvent::BatchRejected { reason, .. } => bail!("batch rejected: {reason}"),
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn print_progress(progress: &ItemProgress) {
    let mut line = format!("#{} {:?}", progress.ordinal, progress.stage);
    if let Some(percent) = progress.percent {
        line.push_str(&format!(" {percent:.0}%"));
    } else if progress.bytes > 0 {
        line.push_str(&format!(" {} bytes", progress.bytes));
    }
    if let Some(workers) = progress.workers {
        line.push_str(&format!(" ({workers} workers)"));
    }
    println!("{line}");
}
