//! Application UI. For now, this is mostly progress bars.

use std::{sync::Arc, time::Duration};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// How to label a progress bar or spinner for one kind of operation.
pub struct ProgressConfig<'a> {
    /// An emoji to display next to the bar.
    pub emoji: &'a str,
    /// A message to display while running.
    pub msg: &'a str,
    /// A message to display when done.
    pub done_msg: &'a str,
}

/// Application UI state.
#[derive(Clone)]
pub struct Ui {
    /// Our progress bars. I'm not actually sure that this `Arc` is useful,
    /// but I'm playing it safe until I understand `MultiProgress` and
    /// `tokio` interactions better.
    multi_progress: Arc<MultiProgress>,
}

impl Ui {
    /// Create a new UI. This sets up logging and progress bars.
    pub fn init() -> Ui {
        // We'd like to wrap our logger so that it works well with our
        // progress bars. Unfortunately, the obvious approach does not work
        // and the crate `indicatif-log-bridge` just supresses all messages.
        env_logger::init();

        let multi_progress = Arc::new(MultiProgress::new());
        Ui { multi_progress }
    }

    /// Create a UI for use in tests. Logging goes through the test harness
    /// and progress bars are hidden.
    pub fn init_for_tests() -> Ui {
        let _ = env_logger::builder().is_test(true).try_init();
        let multi_progress =
            Arc::new(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()));
        Ui { multi_progress }
    }

    /// Get a reference to our progress bars.
    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi_progress
    }

    /// Create a new progress bar with the given labels and length.
    pub fn new_progress_bar(&self, config: &ProgressConfig<'_>, len: u64) -> ProgressBar {
        let pb = ProgressBar::new(len).with_style(default_progress_style());
        pb.set_prefix(config.emoji.to_owned());
        pb.set_message(config.msg.to_owned());
        self.multi_progress.add(pb)
    }

    /// Create a new spinner with the given labels.
    pub fn new_spinner(&self, config: &ProgressConfig<'_>) -> ProgressBar {
        let sp = ProgressBar::new_spinner().with_style(default_spinner_style());
        sp.set_prefix(config.emoji.to_owned());
        sp.set_message(config.msg.to_owned());
        sp.enable_steady_tick(Duration::from_millis(250));
        self.multi_progress.add(sp)
    }

    /// Mark a progress bar as done and display the final message.
    pub fn finish(&self, config: &ProgressConfig<'_>, pb: ProgressBar) {
        pb.set_message(config.done_msg.to_owned());
        pb.finish();
    }
}

pub(crate) fn default_progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {prefix:3}{msg:25} {pos:>4}/{len:4} {elapsed_precise} {wide_bar:.cyan/blue} {eta_precise}")
        .expect("bad progress bar template")
}

pub(crate) fn default_spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner} {prefix:3}{msg}")
        .expect("bad progress bar template")
}
