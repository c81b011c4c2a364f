//! The card-art generation queue.
//!
//! Art requests are strictly serialized: one image at a time, in admission
//! order. The queue dedups by card name, keeps a running total for progress
//! display, and treats individual failures as retryable rather than fatal.

use std::collections::VecDeque;

use log::{debug, warn};

use crate::{
    cards::Card,
    errors::is_credential_failure,
    services::ContentBackend,
    session::SessionState,
    ui::{ProgressConfig, Ui},
    Result,
};

const PROGRESS: ProgressConfig<'static> = ProgressConfig {
    emoji: "🎨",
    msg: "Forging card art",
    done_msg: "Forged card art",
};

/// One admitted art job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// The card the art is for.
    pub name: String,
    /// The prompt to render.
    pub image_prompt: String,
}

impl QueueEntry {
    fn for_card(card: &Card) -> QueueEntry {
        QueueEntry {
            name: card.name.clone(),
            image_prompt: card.image_prompt.clone(),
        }
    }
}

/// FIFO art queue with name-keyed admission control.
///
/// `total` counts everything admitted since the queue was last idle, so
/// progress reads "3 of 7" instead of resetting as items drain.
#[derive(Debug, Default)]
pub struct GenerationQueue {
    pending: VecDeque<QueueEntry>,
    processing: Option<QueueEntry>,
    total: usize,
}

impl GenerationQueue {
    /// A fresh, idle queue.
    pub fn new() -> GenerationQueue {
        GenerationQueue::default()
    }

    /// Is nothing queued or in flight?
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.processing.is_none()
    }

    /// Jobs not yet finished, including the one in flight.
    pub fn items_left(&self) -> usize {
        self.pending.len() + usize::from(self.processing.is_some())
    }

    /// Jobs finished since the queue last went idle.
    pub fn items_processed(&self) -> usize {
        self.total - self.items_left()
    }

    /// Everything admitted since the queue last went idle.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Admit cards that still need art and aren't already queued or in
    /// flight. Returns how many were admitted. A no-op in manual-art mode.
    pub fn enqueue<'a, I>(&mut self, cards: I, state: &mut SessionState) -> usize
    where
        I: IntoIterator<Item = &'a Card>,
    {
        if state.settings.manual_art_mode {
            debug!("manual art mode, skipping art queue admission");
            return 0;
        }
        // A fresh burst of work restarts the progress total.
        if self.is_idle() {
            self.total = 0;
        }
        let mut admitted = 0;
        for card in cards {
            if !card.needs_art() {
                continue;
            }
            let already_queued = self.pending.iter().any(|e| e.name == card.name)
                || self
                    .processing
                    .as_ref()
                    .map(|e| e.name == card.name)
                    .unwrap_or(false);
            if already_queued {
                continue;
            }
            state.mark_loading(&card.name);
            self.pending.push_back(QueueEntry::for_card(card));
            admitted += 1;
        }
        self.total += admitted;
        admitted
    }

    fn take_next(&mut self) -> Option<&QueueEntry> {
        self.processing = self.pending.pop_front();
        self.processing.as_ref()
    }

    fn finish_current(&mut self) {
        self.processing = None;
        if self.is_idle() {
            self.total = 0;
        }
    }
}

/// Drain the queue, generating art one card at a time.
///
/// Each completion fans out to every deck holding the card. A failed job
/// clears the card's loading flag and moves on; only credential failures
/// abort the drain, since every remaining job would fail the same way.
pub async fn process(
    queue: &mut GenerationQueue,
    state: &mut SessionState,
    backend: &dyn ContentBackend,
    ui: &Ui,
) -> Result<()> {
    if queue.is_idle() {
        return Ok(());
    }
    let pb = ui.new_progress_bar(&PROGRESS, queue.total() as u64);
    pb.set_position(queue.items_processed() as u64);
    let result = loop {
        let Some(entry) = queue.take_next() else {
            break Ok(());
        };
        let entry = entry.clone();
        debug!("generating art for {:?}", entry.name);
        match backend.generate_art(&entry.image_prompt).await {
            Ok(image_url) => {
                state.apply_art(&entry.name, &image_url);
            }
            Err(e) if is_credential_failure(&e) => {
                state.clear_art_loading(&entry.name);
                queue.finish_current();
                break Err(e);
            }
            Err(e) => {
                warn!("could not generate art for {:?}: {:?}", entry.name, e);
                state.clear_art_loading(&entry.name);
            }
        }
        queue.finish_current();
        pb.inc(1);
    };
    ui.finish(&PROGRESS, pb);
    result
}

/// Throw a card's art away and regenerate it from scratch, bypassing the
/// art cache.
pub async fn delete_art(
    queue: &mut GenerationQueue,
    state: &mut SessionState,
    backend: &dyn ContentBackend,
    name: &str,
) -> Result<usize> {
    let Some(card) = state.find_card(name).cloned() else {
        return Ok(0);
    };
    backend.invalidate_art(&card.image_prompt).await?;
    state.reset_art(name);
    let card = state
        .find_card(name)
        .cloned()
        .unwrap_or(card);
    Ok(queue.enqueue([&card], state))
}

/// Re-queue a card whose previous art attempt failed. Cached art, if any,
/// is reused.
pub fn retry_art(
    queue: &mut GenerationQueue,
    state: &mut SessionState,
    name: &str,
) -> usize {
    let Some(card) = state.find_card(name).cloned() else {
        return 0;
    };
    if !card.needs_art() {
        return 0;
    }
    queue.enqueue([&card], state)
}
