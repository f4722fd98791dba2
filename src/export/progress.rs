//! Progress display for long-running pipeline stages
//!
//! A [`ProgressReporter`] draws a single spinner line. `start()` spawns one
//! ticker task scoped by a [`CancellationToken`]; `stop()` cancels it, waits
//! for it to finish and clears the line. Dropping a running reporter cancels
//! the ticker and clears the line as well, so the display is restored on
//! every exit path.
//!
//! The ticker only redraws. It never reads or writes pipeline data.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Spinner frames, cycled in order
pub const SPINNER_FRAMES: &str = "⠧⠦⠤⠠⠡⠃⠇";

/// Default frame interval
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(150);

/// Where the spinner is drawn
#[derive(Clone)]
pub enum DisplayTarget {
    Stderr,
    Hidden,
    #[cfg(test)]
    Memory(indicatif::InMemoryTerm),
}

impl DisplayTarget {
    fn draw_target(&self) -> ProgressDrawTarget {
        match self {
            DisplayTarget::Stderr => ProgressDrawTarget::stderr(),
            DisplayTarget::Hidden => ProgressDrawTarget::hidden(),
            #[cfg(test)]
            DisplayTarget::Memory(term) => ProgressDrawTarget::term_like(Box::new(term.clone())),
        }
    }
}

struct Ticker {
    bar: ProgressBar,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Background spinner with scoped start/stop
pub struct ProgressReporter {
    target: DisplayTarget,
    tick_interval: Duration,
    ticker: Option<Ticker>,
    /// Ticker tasks currently alive
    active: Arc<AtomicUsize>,
}

/// Decrements the live-task count when the ticker ends, however it ends
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ProgressReporter {
    /// Create a reporter
    ///
    /// # Arguments
    /// * `target` - Where to draw
    /// * `tick_interval` - Time between spinner frames
    pub fn new(target: DisplayTarget, tick_interval: Duration) -> Self {
        Self {
            target,
            tick_interval,
            ticker: None,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A reporter that never draws anything
    pub fn hidden() -> Self {
        Self::new(DisplayTarget::Hidden, DEFAULT_TICK_INTERVAL)
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Number of ticker tasks alive right now
    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Start the spinner with `message`
    ///
    /// Does nothing if the spinner is already running. Must be called from
    /// within a Tokio runtime.
    pub fn start(&mut self, message: impl Into<Cow<'static, str>>) {
        if self.ticker.is_some() {
            return;
        }

        let bar = ProgressBar::with_draw_target(None, self.target.draw_target());
        bar.set_style(spinner_style());
        bar.set_message(message);

        let cancel = CancellationToken::new();
        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active));

        let handle = tokio::spawn(tick(
            bar.clone(),
            cancel.clone(),
            self.tick_interval,
            guard,
        ));

        self.ticker = Some(Ticker {
            bar,
            cancel,
            handle,
        });
    }

    /// Replace the message of a running spinner
    pub fn set_message(&self, message: impl Into<Cow<'static, str>>) {
        if let Some(ref ticker) = self.ticker {
            ticker.bar.set_message(message);
        }
    }

    /// Run `f` with the spinner line hidden, so `f` can print safely
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        match self.ticker {
            Some(ref ticker) => ticker.bar.suspend(f),
            None => f(),
        }
    }

    /// Stop the spinner, wait for the ticker task and clear the line
    ///
    /// Safe to call when not running.
    pub async fn stop(&mut self) {
        let Some(ticker) = self.ticker.take() else {
            return;
        };
        ticker.cancel.cancel();
        if let Err(e) = ticker.handle.await {
            debug!("Progress ticker ended abnormally: {}", e);
        }
        ticker.bar.finish_and_clear();
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel.cancel();
            ticker.handle.abort();
            ticker.bar.finish_and_clear();
        }
    }
}

async fn tick(bar: ProgressBar, cancel: CancellationToken, interval: Duration, _guard: ActiveGuard) {
    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => bar.tick(),
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}...")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(&format!("{SPINNER_FRAMES} "))
}
