// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cancellable periodic tasks owned by a session or by the engine.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// What a tick callback wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    /// Keep ticking.
    Continue,
    /// End the task after this tick.
    Stop,
}

/// Owner handle of a periodic task. Stopping is idempotent.
#[derive(Debug)]
pub struct TickerHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl TickerHandle {
    /// A handle with no task behind it.
    pub fn detached(token: CancellationToken) -> Self {
        Self { token, join: None }
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop and wait for the task to exit.
    pub async fn join(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

/// Run `on_tick` every `period`, first after one full period.
///
/// The task ends when `parent` or the returned handle is cancelled, or
/// when `on_tick` returns [`TickControl::Stop`]. A slow tick delays the
/// next one instead of bursting.
pub fn spawn_ticker<F, Fut>(parent: &CancellationToken, period: Duration, mut on_tick: F) -> TickerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = TickControl> + Send + 'static,
{
    let token = parent.child_token();
    let task_token = token.clone();
    let join = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => break,
                _ = interval.tick() => {
                    if on_tick().await == TickControl::Stop {
                        task_token.cancel();
                        break;
                    }
                }
            }
        }
    });
    TickerHandle {
        token,
        join: Some(join),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: Arc<AtomicUsize>, stop_after: usize) -> impl FnMut() -> std::future::Ready<TickControl> + Send + 'static {
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if n >= stop_after {
                TickControl::Stop
            } else {
                TickControl::Continue
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_after_each_period() {
        let parent = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = spawn_ticker(&parent, Duration::from_secs(30), counting(count.clone(), usize::MAX));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_from_callback_ends_task() {
        let parent = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = spawn_ticker(&parent, Duration::from_secs(1), counting(count.clone(), 2));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(handle.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_stops_child() {
        let parent = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = spawn_ticker(&parent, Duration::from_secs(1), counting(count.clone(), usize::MAX));

        parent.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(handle.is_stopped());
        handle.join().await;
    }
}
