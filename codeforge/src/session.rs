//! The session state container: everything one sitting of the game holds,
//! and the validated snapshot format it round-trips through on disk.
//!
//! Art completions from the generation queue are applied here as an explicit
//! fan-out: every collection that can display a card by `name` gets the
//! update, so there is no hidden propagation between decks.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    cards::{sort_by_name, Card, RawCard, SkillLevel, Tier},
    Error, Result,
};

/// Whether a session is about a programming library or a creative theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    /// Libraries and their functions.
    Code,
    /// Arbitrary creative themes and their concepts.
    Creative,
}

impl Default for AppMode {
    fn default() -> Self {
        AppMode::Code
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppMode::Code => write!(f, "code"),
            AppMode::Creative => write!(f, "creative"),
        }
    }
}

/// What the current decks were generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Code or creative mode.
    pub mode: AppMode,
    /// The library or theme name, as refined by topic analysis.
    pub name: String,
    /// The programming language, absent in creative mode.
    pub language: Option<String>,
}

impl Subject {
    /// A code-mode subject.
    pub fn library(name: &str, language: &str) -> Subject {
        Subject {
            mode: AppMode::Code,
            name: name.to_owned(),
            language: Some(language.to_owned()),
        }
    }

    /// A creative-mode subject.
    pub fn theme(name: &str) -> Subject {
        Subject {
            mode: AppMode::Creative,
            name: name.to_owned(),
            language: None,
        }
    }
}

/// The visual style cards are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardTheme {
    /// Our own card frame.
    Default,
    /// The classic trading-card look.
    Official,
}

impl Default for CardTheme {
    fn default() -> Self {
        CardTheme::Default
    }
}

/// User-settable preferences, saved with the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Decides which kind of duel challenge the player gets.
    pub skill_level: SkillLevel,
    /// Card rendering style.
    pub card_theme: CardTheme,
    /// When true, no art is ever auto-generated; the player assigns images
    /// by hand and the generation queue refuses new work.
    pub manual_art_mode: bool,
    /// How many ready-made cards a search produces, 0 to 6.
    pub presentation_cards: usize,
    /// How many cards to request per custom-deck batch.
    pub batch_size: usize,
    /// Seconds to wait between consecutive batches.
    pub cooldown_secs: u64,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            skill_level: SkillLevel::default(),
            card_theme: CardTheme::default(),
            manual_art_mode: false,
            presentation_cards: 6,
            batch_size: 10,
            cooldown_secs: 5,
        }
    }
}

/// Everything one sitting of the game holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// What the decks were generated from, if a search has happened.
    pub subject: Option<Subject>,
    /// The curated deck a search produces for immediate display.
    pub presentation_deck: Vec<Card>,
    /// The deck built from the player's catalogue picks. Kept sorted by name.
    pub custom_deck: Vec<Card>,
    /// Every enumerable item for the subject, sorted.
    pub catalogue: Vec<String>,
    /// Tier classification per catalogue item.
    pub tiers: BTreeMap<String, Tier>,
    /// The catalogue items selected for generation.
    pub selected: BTreeSet<String>,
    /// Manually assigned art, name to image reference. Only consulted in
    /// manual-art mode.
    pub manual_art: BTreeMap<String, String>,
    /// User preferences.
    pub settings: Settings,
}

impl SessionState {
    /// Look up a card by name across both decks, presentation deck first.
    pub fn find_card(&self, name: &str) -> Option<&Card> {
        self.presentation_deck
            .iter()
            .chain(self.custom_deck.iter())
            .find(|c| c.name == name)
    }

    /// Apply a successful art generation to every collection holding a card
    /// with this name.
    pub fn apply_art(&mut self, name: &str, image_url: &str) {
        self.for_each_named(name, |card| {
            card.image_url = Some(image_url.to_owned());
            card.image_loading = false;
        });
    }

    /// Clear the loading flag after a failed art generation, leaving the
    /// card in a visibly-failed, retryable state.
    pub fn clear_art_loading(&mut self, name: &str) {
        self.for_each_named(name, |card| {
            card.image_loading = false;
        });
    }

    /// Mark a card as waiting for art again, dropping any art it had.
    pub fn reset_art(&mut self, name: &str) {
        self.for_each_named(name, |card| card.reset_art());
    }

    /// Mark a card as loading without touching its current art.
    pub fn mark_loading(&mut self, name: &str) {
        self.for_each_named(name, |card| {
            card.image_loading = true;
        });
    }

    /// Append freshly generated cards to the custom deck, keeping it sorted.
    pub fn commit_to_custom_deck(&mut self, cards: Vec<Card>) {
        self.custom_deck.extend(cards);
        sort_by_name(&mut self.custom_deck);
    }

    fn for_each_named<F>(&mut self, name: &str, mut update: F)
    where
        F: FnMut(&mut Card),
    {
        for card in self
            .presentation_deck
            .iter_mut()
            .chain(self.custom_deck.iter_mut())
        {
            if card.name == name {
                update(card);
            }
        }
    }
}

/// A named session snapshot, as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSession {
    /// Store-assigned identifier.
    pub id: u64,
    /// The name the player saved it under.
    pub name: String,
    /// The subject name at save time, for gallery display.
    pub subject_name: String,
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
    /// The session itself.
    pub state: SessionState,
}

/// A snapshot as found in an untrusted file, before validation.
///
/// Import files come from anywhere, so every field is optional and every
/// collection is re-checked element by element, the same way backend
/// payloads are.
#[derive(Debug, Default, Deserialize)]
pub struct RawSavedSession {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    subject_name: Option<String>,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    state: Option<RawSessionState>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSessionState {
    #[serde(default)]
    subject: Option<RawSubject>,
    #[serde(default)]
    presentation_deck: Option<Vec<RawStoredCard>>,
    #[serde(default)]
    custom_deck: Option<Vec<RawStoredCard>>,
    #[serde(default)]
    catalogue: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    tiers: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    selected: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    manual_art: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    settings: Option<Settings>,
}

#[derive(Debug, Deserialize)]
struct RawSubject {
    #[serde(default)]
    mode: Option<AppMode>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

/// A card as stored in a snapshot: the backend shape plus its art fields.
#[derive(Debug, Default, Deserialize)]
struct RawStoredCard {
    #[serde(flatten)]
    base: RawCard,
    #[serde(default)]
    image_url: Option<String>,
}

impl RawStoredCard {
    fn clean(self) -> Option<Card> {
        let mut card = self.base.clean()?;
        card.image_url = self.image_url.filter(|u| !u.is_empty());
        // Nothing is in flight when a snapshot is restored.
        card.image_loading = false;
        Some(card)
    }
}

impl RawSavedSession {
    /// Validate this snapshot, coercing every field to a safe value.
    /// Returns an error only when there is nothing usable at all.
    pub fn clean(self) -> Result<SavedSession> {
        let name = self
            .name
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::msg("snapshot has no name"))?;
        let state = self.state.map(RawSessionState::clean).unwrap_or_default();
        Ok(SavedSession {
            id: self.id.unwrap_or(0),
            subject_name: self.subject_name.unwrap_or_default(),
            saved_at: self.saved_at.unwrap_or_else(Utc::now),
            name,
            state,
        })
    }
}

impl RawSessionState {
    fn clean(self) -> SessionState {
        let subject = self.subject.and_then(|s| {
            let name = s.name.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty())?;
            Some(Subject {
                mode: s.mode.unwrap_or_default(),
                name,
                language: s.language.filter(|l| !l.trim().is_empty()),
            })
        });

        let clean_deck = |deck: Option<Vec<RawStoredCard>>| -> Vec<Card> {
            deck.unwrap_or_default()
                .into_iter()
                .filter_map(RawStoredCard::clean)
                .collect()
        };
        let presentation_deck = clean_deck(self.presentation_deck);
        let mut custom_deck = clean_deck(self.custom_deck);
        sort_by_name(&mut custom_deck);

        let strings_only = |values: Option<Vec<serde_json::Value>>| -> Vec<String> {
            values
                .unwrap_or_default()
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    other => {
                        warn!("dropping non-string snapshot entry: {}", other);
                        None
                    }
                })
                .collect()
        };
        let catalogue = strings_only(self.catalogue);
        let selected: BTreeSet<String> = strings_only(self.selected).into_iter().collect();

        let tiers: BTreeMap<String, Tier> = self
            .tiers
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(name, value)| {
                let tier = value.as_str().and_then(|s| s.parse::<Tier>().ok())?;
                Some((name, tier))
            })
            .collect();

        let manual_art: BTreeMap<String, String> = self
            .manual_art
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(name, value)| match value {
                serde_json::Value::String(s) if !s.is_empty() => Some((name, s)),
                _ => None,
            })
            .collect();

        SessionState {
            subject,
            presentation_deck,
            custom_deck,
            catalogue,
            tiers,
            selected,
            manual_art,
            settings: self.settings.unwrap_or_default(),
        }
    }
}

/// Decode an untrusted snapshot from JSON, validating every field.
pub fn decode_snapshot(json: &str) -> Result<SavedSession> {
    let raw: RawSavedSession = serde_json::from_str(json)
        .map_err(|e| anyhow!("could not parse session snapshot: {}", e))?;
    raw.clean()
}
