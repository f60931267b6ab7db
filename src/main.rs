//! taskseq command line runner
//!
//! Loads a sequence definition (first argument, else `TASKSEQ_SEQUENCE_FILE`,
//! else a small built-in demo), runs it with Ctrl-C wired to cancellation,
//! and prints the recorded results.

use std::{path::PathBuf, sync::Arc};
use taskseq::{
    runtime::{builtin, StateChange},
    workflow::source,
    CancellationToken, EngineConfig, SequenceConfig, TaskSequence, TypeRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::default();

    let level = config.log_level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .with_max_level(level)
        .init();

    let sequence_file = std::env::args_os().nth(1).map(PathBuf::from).or_else(|| config.sequence_file.clone());
    let definition = match sequence_file {
        Some(path) => source::from_path(&path).await?,
        None => {
            tracing::info!("No sequence file given, running the demo sequence");
            demo_sequence()
        }
    };

    let registry = Arc::new(TypeRegistry::new());
    let mut sequence = TaskSequence::with_config(&config, registry);
    sequence.set_state_listener(|change: &StateChange| -> anyhow::Result<()> {
        tracing::info!("🔄 {:?}", change);
        Ok(())
    });

    if let Err(e) = sequence.load(&definition) {
        print!("{}", sequence.results().to_log());
        anyhow::bail!("Sequence failed to load ({}): {}", e.code(), e);
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Ctrl-C received, cancelling sequence");
            on_ctrl_c.cancel();
        }
    });

    let outcome = sequence.execute(&cancel).await;
    print!("{}", sequence.results().to_log());
    println!("Outcome: {:?} ({})", outcome, outcome.code());

    if !outcome.is_completed() {
        std::process::exit(1);
    }
    Ok(())
}

/// Start, a short delay, then a terminal no-op
fn demo_sequence() -> SequenceConfig {
    let mut config = SequenceConfig::new("demo");
    let start = config.add_step(builtin::SEQUENCE_START).named("Start").id;
    let wait = config
        .add_step(builtin::DELAY)
        .named("Wait")
        .with_parameter(builtin::DELAY_TIME_PARAM, "500")
        .id;
    let done = config.add_step(builtin::NO_ACTION).named("Done").terminal(true).id;
    config.add_transition(builtin::ALWAYS_TRUE, start, wait);
    config.add_transition(builtin::ALWAYS_TRUE, wait, done);
    config
}
