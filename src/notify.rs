//! Best-effort background delivery for observers and listeners
//!
//! Producers push into an unbounded channel and never wait on the consumer.
//! A single worker drains the channel in order and hands each item to the
//! handler. Handler errors and panics are logged and swallowed: delivery
//! failures are never visible to the producer.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;

/// Spawn a delivery worker and return the sending half of its queue
///
/// The worker is a dedicated OS thread, so a slow or blocking handler never
/// occupies an async runtime worker. It exits once every sender is dropped.
pub(crate) fn spawn_dispatcher<T, F>(name: &'static str, mut handler: F) -> mpsc::UnboundedSender<T>
where
    T: Send + 'static,
    F: FnMut(T) -> anyhow::Result<()> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<T>();

    let mut deliver = move |item: T| match catch_unwind(AssertUnwindSafe(|| handler(item))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!("Notification handler '{}' failed: {}", name, e),
        Err(_) => tracing::warn!("⚠️ Notification handler '{}' panicked, ignoring", name),
    };

    let spawned = std::thread::Builder::new()
        .name(format!("taskseq-{}", name))
        .spawn(move || {
            while let Some(item) = rx.blocking_recv() {
                deliver(item);
            }
            tracing::debug!("Dispatcher '{}' stopped", name);
        });
    if let Err(e) = spawned {
        tracing::warn!("⚠️ Could not start dispatcher thread '{}': {}", name, e);
    }

    tx
}
