//! Keyed debounce scheduling.
//!
//! [`DebounceScheduler`] delays an action until a key has been quiet for the
//! requested delay. Scheduling the same key again replaces the pending action
//! and restarts its timer, so a burst of writes to one file results in a
//! single run of the last scheduled action.
//!
//! # Architecture
//!
//! A background task owns a map of pending actions keyed by `K`:
//!
//! 1. `schedule` replaces any pending action for the key and resets its deadline
//! 2. `cancel` drops the pending action without running it
//! 3. When a deadline passes, the action is spawned onto the runtime
//!
//! When every handle to the scheduler is dropped the input channel closes and
//! all remaining actions are run immediately.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use deltascope_engine::utils::debounce::DebounceScheduler;
//!
//! #[tokio::main]
//! async fn main() {
//!     let scheduler = DebounceScheduler::new();
//!
//!     for i in 0..3 {
//!         scheduler
//!             .schedule("src/lib.rs".to_string(), Duration::from_millis(150), async move {
//!                 println!("write {i} settled");
//!             })
//!             .await
//!             .unwrap();
//!     }
//!     // Only "write 2 settled" is printed.
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default debounce delay in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 150;

/// Boxed action run when a key's timer expires.
pub type Action = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Error type for scheduler operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebouncerError {
    /// The scheduler's background task has terminated.
    ChannelClosed,
}

impl fmt::Display for DebouncerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelClosed => write!(f, "debouncer channel closed"),
        }
    }
}

impl std::error::Error for DebouncerError {}

enum Command<K> {
    Schedule {
        key: K,
        delay: Duration,
        action: Action,
    },
    Cancel(K),
}

/// An action waiting for its timer to expire.
struct Pending {
    action: Action,
    deadline: Instant,
}

/// Keyed scheduler that runs only the most recent action per key.
///
/// Cloning is cheap; all clones feed the same background task.
pub struct DebounceScheduler<K>
where
    K: Clone + Eq + Hash + Send + fmt::Debug + 'static,
{
    input_tx: mpsc::Sender<Command<K>>,
}

impl<K> Clone for DebounceScheduler<K>
where
    K: Clone + Eq + Hash + Send + fmt::Debug + 'static,
{
    fn clone(&self) -> Self {
        Self {
            input_tx: self.input_tx.clone(),
        }
    }
}

impl<K> fmt::Debug for DebounceScheduler<K>
where
    K: Clone + Eq + Hash + Send + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceScheduler")
            .field("closed", &self.input_tx.is_closed())
            .finish()
    }
}

impl<K> Default for DebounceScheduler<K>
where
    K: Clone + Eq + Hash + Send + fmt::Debug + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> DebounceScheduler<K>
where
    K: Clone + Eq + Hash + Send + fmt::Debug + 'static,
{
    /// Creates a scheduler and spawns its background task.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let (input_tx, input_rx) = mpsc::channel(1000);

        tokio::spawn(async move {
            run_schedule_loop(input_rx).await;
        });

        Self { input_tx }
    }

    /// Schedules `action` to run once `key` has been quiet for `delay`.
    ///
    /// Any action already pending for `key` is dropped without running.
    ///
    /// # Errors
    ///
    /// Returns [`DebouncerError::ChannelClosed`] if the background task has
    /// terminated.
    pub async fn schedule<F>(&self, key: K, delay: Duration, action: F) -> Result<(), DebouncerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.input_tx
            .send(Command::Schedule {
                key,
                delay,
                action: Box::pin(action),
            })
            .await
            .map_err(|_| DebouncerError::ChannelClosed)
    }

    /// Attempts to schedule without waiting for channel capacity.
    ///
    /// Returns `true` if the request was queued.
    pub fn try_schedule<F>(&self, key: K, delay: Duration, action: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.input_tx
            .try_send(Command::Schedule {
                key,
                delay,
                action: Box::pin(action),
            })
            .is_ok()
    }

    /// Drops the pending action for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DebouncerError::ChannelClosed`] if the background task has
    /// terminated.
    pub async fn cancel(&self, key: K) -> Result<(), DebouncerError> {
        self.input_tx
            .send(Command::Cancel(key))
            .await
            .map_err(|_| DebouncerError::ChannelClosed)
    }
}

async fn run_schedule_loop<K>(mut input_rx: mpsc::Receiver<Command<K>>)
where
    K: Clone + Eq + Hash + fmt::Debug,
{
    let mut pending: HashMap<K, Pending> = HashMap::new();

    debug!("Starting debounce loop");

    loop {
        let next_deadline = pending.values().map(|p| p.deadline).min();

        tokio::select! {
            command = input_rx.recv() => {
                match command {
                    Some(Command::Schedule { key, delay, action }) => {
                        trace!(key = ?key, delay_ms = delay.as_millis(), "Scheduling action");
                        let deadline = Instant::now() + delay;
                        pending.insert(key, Pending { action, deadline });
                    }
                    Some(Command::Cancel(key)) => {
                        if pending.remove(&key).is_some() {
                            trace!(key = ?key, "Cancelled pending action");
                        }
                    }
                    None => {
                        debug!(pending = pending.len(), "Input channel closed, flushing pending actions");
                        for (key, entry) in pending.drain() {
                            trace!(key = ?key, "Flushing pending action");
                            tokio::spawn(entry.action);
                        }
                        break;
                    }
                }
            }

            () = async {
                match next_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                run_expired(&mut pending);
            }
        }
    }

    debug!("Debounce loop terminated");
}

/// Spawns every action whose deadline has passed.
fn run_expired<K>(pending: &mut HashMap<K, Pending>)
where
    K: Clone + Eq + Hash + fmt::Debug,
{
    let now = Instant::now();

    let expired: Vec<K> = pending
        .iter()
        .filter(|(_, entry)| entry.deadline <= now)
        .map(|(key, _)| key.clone())
        .collect();

    for key in expired {
        if let Some(entry) = pending.remove(&key) {
            trace!(key = ?key, "Running debounced action");
            tokio::spawn(entry.action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    fn recorder() -> (mpsc::Sender<i32>, mpsc::Receiver<i32>) {
        mpsc::channel(100)
    }

    async fn schedule_send(
        scheduler: &DebounceScheduler<String>,
        key: &str,
        delay_ms: u64,
        tx: &mpsc::Sender<i32>,
        value: i32,
    ) {
        let tx = tx.clone();
        scheduler
            .schedule(key.to_string(), Duration::from_millis(delay_ms), async move {
                let _ = tx.send(value).await;
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_action_runs_after_delay() {
        let scheduler = DebounceScheduler::new();
        let (tx, mut rx) = recorder();

        schedule_send(&scheduler, "a", 50, &tx, 42).await;

        let result = timeout(Duration::from_millis(300), rx.recv()).await;
        assert_eq!(result.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_reschedule_replaces_pending_action() {
        let scheduler = DebounceScheduler::new();
        let (tx, mut rx) = recorder();

        schedule_send(&scheduler, "a", 50, &tx, 1).await;
        schedule_send(&scheduler, "a", 50, &tx, 2).await;
        schedule_send(&scheduler, "a", 50, &tx, 3).await;

        let result = timeout(Duration::from_millis(300), rx.recv()).await;
        assert_eq!(result.unwrap(), Some(3), "only the last action runs");

        let more = timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(more.is_err(), "replaced actions must not run");
    }

    #[tokio::test]
    async fn test_timer_reset_on_reschedule() {
        let scheduler = DebounceScheduler::new();
        let (tx, mut rx) = recorder();

        schedule_send(&scheduler, "a", 100, &tx, 1).await;
        sleep(Duration::from_millis(60)).await;
        schedule_send(&scheduler, "a", 100, &tx, 2).await;

        // 60ms after the reschedule the original deadline has passed but the
        // new one has not.
        let early = timeout(Duration::from_millis(60), rx.recv()).await;
        assert!(early.is_err(), "timer should have been reset");

        let result = timeout(Duration::from_millis(300), rx.recv()).await;
        assert_eq!(result.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let scheduler = DebounceScheduler::new();
        let (tx, mut rx) = recorder();

        schedule_send(&scheduler, "a", 50, &tx, 1).await;
        schedule_send(&scheduler, "b", 50, &tx, 10).await;
        schedule_send(&scheduler, "a", 50, &tx, 2).await;
        schedule_send(&scheduler, "b", 50, &tx, 20).await;

        let mut received = Vec::new();
        for _ in 0..2 {
            if let Ok(Some(v)) = timeout(Duration::from_millis(300), rx.recv()).await {
                received.push(v);
            }
        }
        received.sort_unstable();
        assert_eq!(received, vec![2, 20]);
    }

    #[tokio::test]
    async fn test_cancel_drops_pending_action() {
        let scheduler = DebounceScheduler::new();
        let (tx, mut rx) = recorder();

        schedule_send(&scheduler, "a", 50, &tx, 1).await;
        scheduler.cancel("a".to_string()).await.unwrap();

        let result = timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(result.is_err(), "cancelled action must not run");
    }

    #[tokio::test]
    async fn test_cancel_unknown_key_is_noop() {
        let scheduler: DebounceScheduler<String> = DebounceScheduler::new();
        assert!(scheduler.cancel("missing".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_action_not_run_before_delay() {
        let scheduler = DebounceScheduler::new();
        let (tx, mut rx) = recorder();

        schedule_send(&scheduler, "a", 150, &tx, 7).await;

        let early = timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(early.is_err());

        let result = timeout(Duration::from_millis(300), rx.recv()).await;
        assert_eq!(result.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_flush_on_drop() {
        let scheduler = DebounceScheduler::new();
        let (tx, mut rx) = recorder();

        schedule_send(&scheduler, "a", 10_000, &tx, 5).await;
        drop(scheduler);

        let result = timeout(Duration::from_millis(300), rx.recv()).await;
        assert_eq!(result.unwrap(), Some(5), "pending actions flush on close");
    }

    #[tokio::test]
    async fn test_try_schedule() {
        let scheduler = DebounceScheduler::new();
        let (tx, mut rx) = recorder();

        let queued = scheduler.try_schedule("a".to_string(), Duration::from_millis(20), async move {
            let _ = tx.send(9).await;
        });
        assert!(queued);

        let result = timeout(Duration::from_millis(300), rx.recv()).await;
        assert_eq!(result.unwrap(), Some(9));
    }

    #[tokio::test]
    async fn test_sequential_runs_for_same_key() {
        let scheduler = DebounceScheduler::new();
        let (tx, mut rx) = recorder();

        schedule_send(&scheduler, "a", 30, &tx, 1).await;
        assert_eq!(timeout(Duration::from_millis(300), rx.recv()).await.unwrap(), Some(1));

        schedule_send(&scheduler, "a", 30, &tx, 2).await;
        assert_eq!(timeout(Duration::from_millis(300), rx.recv()).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_zero_delay_runs_promptly() {
        let scheduler = DebounceScheduler::new();
        let (tx, mut rx) = recorder();

        schedule_send(&scheduler, "a", 0, &tx, 3).await;

        let result = timeout(Duration::from_millis(100), rx.recv()).await;
        assert_eq!(result.unwrap(), Some(3));
    }

    #[test]
    fn test_debouncer_error_display() {
        assert_eq!(DebouncerError::ChannelClosed.to_string(), "debouncer channel closed");
    }
}
