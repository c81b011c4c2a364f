//! Time-based machinery: the duel countdown and the idle watcher that
//! eventually evicts cached card art.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use log::debug;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, sleep_until, Instant},
};

/// A cancellable countdown that ticks once per second.
///
/// `start` arms it, `cancel` disarms it, and [`Countdown::expired`] resolves
/// when it reaches zero. Starting with `None` means "no timer": `remaining`
/// reports nothing and `expired` never resolves.
pub struct Countdown {
    running: Option<Running>,
}

struct Running {
    remaining: Arc<AtomicU64>,
    expired_rx: watch::Receiver<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Countdown {
    /// A countdown that has not been started.
    pub fn idle() -> Countdown {
        Countdown { running: None }
    }

    /// Arm the countdown for `secs` seconds, cancelling any previous run.
    /// `None` disables the timer entirely.
    pub fn start(&mut self, secs: Option<u64>) {
        self.cancel();
        let Some(secs) = secs else { return };

        let remaining = Arc::new(AtomicU64::new(secs));
        let (expired_tx, expired_rx) = watch::channel(false);
        let handle = if secs == 0 {
            let _ = expired_tx.send(true);
            None
        } else {
            let remaining = remaining.clone();
            Some(tokio::spawn(async move {
                let mut ticks = interval(Duration::from_secs(1));
                // The first tick completes immediately.
                ticks.tick().await;
                loop {
                    ticks.tick().await;
                    let left = remaining.load(Ordering::SeqCst).saturating_sub(1);
                    remaining.store(left, Ordering::SeqCst);
                    if left == 0 {
                        debug!("countdown expired");
                        let _ = expired_tx.send(true);
                        return;
                    }
                }
            }))
        };
        self.running = Some(Running {
            remaining,
            expired_rx,
            handle,
        });
    }

    /// Stop ticking. Submitting an answer and ending a duel both land here.
    pub fn cancel(&mut self) {
        if let Some(running) = self.running.take() {
            if let Some(handle) = running.handle {
                handle.abort();
            }
        }
    }

    /// Seconds left, or `None` when no timer is armed.
    pub fn remaining(&self) -> Option<u64> {
        self.running
            .as_ref()
            .map(|r| r.remaining.load(Ordering::SeqCst))
    }

    /// Resolves when the countdown reaches zero. Never resolves while
    /// disarmed or in no-timer mode.
    pub async fn expired(&mut self) {
        match &mut self.running {
            None => std::future::pending().await,
            Some(running) => {
                if *running.expired_rx.borrow() {
                    return;
                }
                loop {
                    if running.expired_rx.changed().await.is_err() {
                        // Sender gone without expiring: treat as cancelled.
                        std::future::pending::<()>().await;
                    }
                    if *running.expired_rx.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Watches for user inactivity and fires once per idle period.
///
/// Any user input should call [`IdleWatcher::touch`]; after `timeout`
/// without one, [`IdleWatcher::idle`] resolves (and the caller clears the
/// art cache). Activity re-arms it for the next period.
pub struct IdleWatcher {
    timeout: Duration,
    deadline_tx: watch::Sender<Instant>,
    deadline_rx: watch::Receiver<Instant>,
}

impl IdleWatcher {
    /// Start watching, with the deadline one full period away.
    pub fn new(timeout: Duration) -> IdleWatcher {
        let (deadline_tx, deadline_rx) = watch::channel(Instant::now() + timeout);
        IdleWatcher {
            timeout,
            deadline_tx,
            deadline_rx,
        }
    }

    /// Record user activity, pushing the deadline back.
    pub fn touch(&self) {
        let _ = self.deadline_tx.send(Instant::now() + self.timeout);
    }

    /// Resolves once the timeout elapses with no intervening activity.
    pub async fn idle(&mut self) {
        loop {
            let deadline = *self.deadline_rx.borrow_and_update();
            tokio::select! {
                _ = sleep_until(deadline) => return,
                changed = self.deadline_rx.changed() => {
                    if changed.is_err() {
                        std::future::pending::<()>().await;
                    }
                    // New deadline; go around again.
                }
            }
        }
    }
}
