use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::oneshot;

use engine_platform::foreground::{self, ForegroundSink};
use engine_platform::platform::{self, EnginePlatform, GlobalPlatform};
use engine_platform::{ContextId, ExpectedRuntime, ForegroundQueues, PlatformConfig, task};

/// Stand-in for the engine's main isolate.
const MAIN_CONTEXT: ContextId = ContextId::from_raw(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PlatformConfig::from_env().context("Invalid ENGINE_PLATFORM_* settings")?;

    eprintln!("Engine Platform v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Worker: {}", config.worker_name);
    eprintln!("   Shutdown policy: {}", config.shutdown_policy);

    let queues = ForegroundQueues::new();
    platform::create_with_config(Arc::clone(&queues) as Arc<dyn ForegroundSink>, config)?;

    let engine = GlobalPlatform;

    // ── Background work ────────────────────────────────────────────────
    let (sum_tx, sum_rx) = oneshot::channel();
    engine.post_background_task(
        task(move || {
            let sum: u64 = (1..=1_000_000u64).sum();
            let _ = sum_tx.send(sum);
        }),
        ExpectedRuntime::Long,
    );

    // ── Foreground work on the main context ────────────────────────────
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let started = engine.monotonic_time_ms();
    engine.post_delayed_foreground_task(
        MAIN_CONTEXT,
        task(move || {
            let waited = platform::monotonic_time_ms() - started;
            eprintln!("   Delayed task ran after {waited:.1}ms");
            let _ = done_tx.send(());
        }),
        0.25,
    );
    engine.post_foreground_task(
        MAIN_CONTEXT,
        task(|| eprintln!("   Immediate task ran")),
    );

    let driver = tokio::spawn(foreground::drive(Arc::clone(&queues), MAIN_CONTEXT, async {
        let _ = done_rx.await;
    }));

    let sum = tokio::time::timeout(Duration::from_secs(10), sum_rx)
        .await
        .context("Background task timed out")?
        .context("Background task dropped")?;
    eprintln!("   Background sum: {sum}");

    let ran = driver.await.context("Foreground driver failed")?;
    eprintln!("   Foreground tasks run: {ran}");

    if let Some(stats) = platform::stats() {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    // Joins the worker thread; keep it off the async workers.
    tokio::task::spawn_blocking(platform::shutdown)
        .await
        .context("Shutdown failed")?;

    Ok(())
}
