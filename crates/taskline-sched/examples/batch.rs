//! Bounded-concurrency executor demo: submit a batch of simulated jobs,
//! cancel one mid-flight, and print the aggregate logs.
//!
//! Run with: cargo run -p taskline-sched --example batch

use std::time::Duration;

use taskline_sched::{Executor, ExecutorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("taskline_sched=debug")
        .init();

    let executor = Executor::new(
        |job: u32, token| async move {
            tokio::select! {
                _ = token.cancelled() => anyhow::bail!("job {job} observed cancellation"),
                _ = tokio::time::sleep(Duration::from_millis(50 * job as u64)) => {}
            }
            Ok(job * 10)
        },
        ExecutorConfig::default()
            .with_concurrency(3)
            .with_timeout(Duration::from_secs(1))
            .with_retries(1),
    );

    let handles: Vec<_> = (1..=6).map(|job| executor.submit(job)).collect();

    let victim = handles[4].id().clone();
    executor.cancel(&victim);

    for handle in handles {
        match handle.await {
            Ok(value) => println!("job finished: {value}"),
            Err(err) => println!("job skipped: {err}"),
        }
    }

    println!(
        "{} succeeded, {} failed",
        executor.results().len(),
        executor.errors().len()
    );
    Ok(())
}
