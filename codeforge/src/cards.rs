//! The card entity model: what the backend forges and what every other
//! component passes around.
//!
//! Cards are identified by `name`. Two cards with the same name are the same
//! card, everywhere: deduplication, art queue admission, duel hand matching
//! and cache lookups all key on it. Only the art fields (`image_url`,
//! `image_loading`) change after creation.

use std::{fmt, str::FromStr};

use anyhow::anyhow;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Card level bounds, inclusive.
const LEVEL_RANGE: (u8, u8) = (1, 12);

/// Upper bound for `impact` and `ease_of_use`.
const STAT_MAX: u32 = 5000;

/// The four great regions a card can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Attribute {
    /// State, structure, classes and modules.
    Structure,
    /// Side effects, events and asynchronous behavior.
    Effect,
    /// Helpers, transformations and pure functions.
    Utility,
    /// Output, display and formatting.
    Render,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Attribute::Structure => "STRUCTURE",
            Attribute::Effect => "EFFECT",
            Attribute::Utility => "UTILITY",
            Attribute::Render => "RENDER",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Attribute {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "STRUCTURE" => Ok(Attribute::Structure),
            "EFFECT" => Ok(Attribute::Effect),
            "UTILITY" => Ok(Attribute::Utility),
            "RENDER" => Ok(Attribute::Render),
            _ => Err(anyhow!("unknown attribute: {}", s)),
        }
    }
}

/// How central an item is to its library or theme.
///
/// Variant order doubles as display order: `Core` sorts before `Niche`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Tier {
    /// Essential, defining features.
    Core,
    /// Extremely common, used in most projects.
    Staple,
    /// Useful in specific but common scenarios.
    Situational,
    /// Rarely used, specialized or legacy.
    Niche,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Core => "Core",
            Tier::Staple => "Staple",
            Tier::Situational => "Situational",
            Tier::Niche => "Niche",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "core" => Ok(Tier::Core),
            "staple" => Ok(Tier::Staple),
            "situational" => Ok(Tier::Situational),
            "niche" => Ok(Tier::Niche),
            _ => Err(anyhow!("unknown tier: {}", s)),
        }
    }
}

/// How experienced the player claims to be. Decides which kind of challenge
/// a duel turn asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    /// Gets syntax exercises.
    Beginner,
    /// Gets implementation challenges.
    Intermediate,
    /// Gets implementation challenges.
    Advanced,
}

impl Default for SkillLevel {
    fn default() -> Self {
        SkillLevel::Beginner
    }
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkillLevel::Beginner => "beginner",
            SkillLevel::Intermediate => "intermediate",
            SkillLevel::Advanced => "advanced",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SkillLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "beginner" => Ok(SkillLevel::Beginner),
            "intermediate" => Ok(SkillLevel::Intermediate),
            "advanced" => Ok(SkillLevel::Advanced),
            _ => Err(anyhow!("unknown skill level: {}", s)),
        }
    }
}

/// The rules text of a card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDescription {
    /// What the function does, in card-lore voice.
    pub effect: String,
    /// The parameters it takes.
    pub parameters: String,
    /// What it returns.
    pub returns: String,
}

/// One collectible card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// The function, method or concept name. Unique within a deck and
    /// immutable after creation.
    pub name: String,
    /// The card's region theme.
    pub attribute: Attribute,
    /// Complexity and power, 1 to 12.
    pub level: u8,
    /// The kind of construct, e.g. `[Hook]` or `[Method]`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Lore category, e.g. "Effect Monster" or "Spell Card".
    pub card_category: String,
    /// The great region the card belongs to, per the lore.
    pub region: String,
    /// The clan within the region.
    pub clan: String,
    /// Rules text.
    pub description: CardDescription,
    /// Attack-style stat, 0 to 5000.
    pub impact: u32,
    /// Defense-style stat, 0 to 5000.
    pub ease_of_use: u32,
    /// Stable input to the art generator.
    pub image_prompt: String,
    /// Art, as a data URL. Populated asynchronously.
    #[serde(default)]
    pub image_url: Option<String>,
    /// True while an art fetch is pending or in flight.
    #[serde(default)]
    pub image_loading: bool,
    /// Programming language, absent for creative concepts.
    #[serde(default)]
    pub language: Option<String>,
    /// The tier this card was classified into.
    #[serde(default)]
    pub category: Option<Tier>,
}

impl Card {
    /// Mark this card as waiting for art.
    pub fn reset_art(&mut self) {
        self.image_url = None;
        self.image_loading = true;
    }

    /// Does this card still need art generated for it?
    pub fn needs_art(&self) -> bool {
        self.image_url.is_none()
    }
}

/// The sentinel card produced when a topic is rejected.
///
/// Invalid input still gets a themed, art-bearing response instead of a bare
/// error banner, so the rejection reason travels in the card's rules text
/// and the card goes through the art queue like any other.
pub fn error_card(reason: &str) -> Card {
    Card {
        name: "Forbidden Summon".to_owned(),
        attribute: Attribute::Effect,
        level: 1,
        kind: "[Omen]".to_owned(),
        card_category: "Trap Card".to_owned(),
        region: "The Void Beyond the Catalogue".to_owned(),
        clan: "Clan of the Unwritten".to_owned(),
        description: CardDescription {
            effect: reason.to_owned(),
            parameters: "A topic the forge could not recognize.".to_owned(),
            returns: "Nothing. Try a real library or a richer theme.".to_owned(),
        },
        impact: 0,
        ease_of_use: 0,
        image_prompt: "A sealed spellbook wrapped in chains, crackling with \
                       refused magic, on an empty summoning circle"
            .to_owned(),
        image_url: None,
        image_loading: true,
        language: None,
        category: None,
    }
}

/// Sort a deck by card name, the order custom decks are kept in.
pub fn sort_by_name(cards: &mut [Card]) {
    cards.sort_by(|a, b| a.name.cmp(&b.name));
}

/// Drop later duplicates of any name, preserving first-seen order.
pub fn dedup_by_name(cards: Vec<Card>) -> Vec<Card> {
    let mut seen = std::collections::BTreeSet::new();
    cards
        .into_iter()
        .filter(|card| seen.insert(card.name.clone()))
        .collect()
}

/// A card as the backend reports it, before validation.
///
/// Backend payloads are arbitrary JSON as far as we're concerned, so every
/// field is optional here and [`RawCard::clean`] decides what survives.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawCard {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub card_category: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub clan: Option<String>,
    #[serde(default)]
    pub description: Option<CardDescription>,
    #[serde(default)]
    pub impact: Option<i64>,
    #[serde(default)]
    pub ease_of_use: Option<i64>,
    #[serde(default)]
    pub image_prompt: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl RawCard {
    /// Validate this card, coercing bad fields to safe defaults. Returns
    /// `None` if the card has no usable name.
    pub fn clean(self) -> Option<Card> {
        let name = self.name.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty())?;
        let attribute = self
            .attribute
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Attribute::Utility);
        let level = clamp_i64(self.level.unwrap_or(1), LEVEL_RANGE.0 as i64, LEVEL_RANGE.1 as i64) as u8;
        let image_prompt = self
            .image_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| format!("A mysterious hooded figure holding a glowing sigil labeled {}", name));
        Some(Card {
            name,
            attribute,
            level,
            kind: self.kind.unwrap_or_else(|| "[Function]".to_owned()),
            card_category: self.card_category.unwrap_or_else(|| "Effect Monster".to_owned()),
            region: self.region.unwrap_or_default(),
            clan: self.clan.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            impact: clamp_i64(self.impact.unwrap_or(0), 0, STAT_MAX as i64) as u32,
            ease_of_use: clamp_i64(self.ease_of_use.unwrap_or(0), 0, STAT_MAX as i64) as u32,
            image_prompt,
            image_url: None,
            image_loading: true,
            language: self.language.filter(|l| !l.trim().is_empty()),
            category: self.category.as_deref().and_then(|s| s.parse().ok()),
        })
    }
}

/// Validate a batch of raw cards, logging and dropping the unusable ones.
pub fn clean_cards(raw: Vec<RawCard>) -> Vec<Card> {
    let total = raw.len();
    let cards: Vec<Card> = raw.into_iter().filter_map(RawCard::clean).collect();
    if cards.len() < total {
        warn!(
            "dropped {} of {} cards from the backend for missing names",
            total - cards.len(),
            total
        );
    }
    cards
}

fn clamp_i64(value: i64, min: i64, max: i64) -> i64 {
    value.max(min).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str) -> RawCard {
        RawCard {
            name: Some(name.to_owned()),
            attribute: Some("EFFECT".to_owned()),
            level: Some(4),
            kind: Some("[Hook]".to_owned()),
            card_category: Some("Effect Monster".to_owned()),
            region: Some("The Ethereal Plane".to_owned()),
            clan: Some("Clan of the Asynchronous Phantoms".to_owned()),
            description: Some(CardDescription {
                effect: "Declares a state cell.".to_owned(),
                parameters: "initial value".to_owned(),
                returns: "a value and its setter".to_owned(),
            }),
            impact: Some(3200),
            ease_of_use: Some(4100),
            image_prompt: Some("a phantom juggling glowing orbs".to_owned()),
            language: Some("JavaScript".to_owned()),
            category: Some("Core".to_owned()),
        }
    }

    #[test]
    fn clean_keeps_valid_cards() {
        let card = raw("useState").clean().unwrap();
        assert_eq!(card.name, "useState");
        assert_eq!(card.attribute, Attribute::Effect);
        assert_eq!(card.category, Some(Tier::Core));
        assert!(card.image_loading);
        assert!(card.image_url.is_none());
    }

    #[test]
    fn clean_drops_nameless_and_clamps_stats() {
        let mut nameless = raw("ok");
        nameless.name = Some("   ".to_owned());
        assert!(nameless.clean().is_none());

        let mut wild = raw("wild");
        wild.level = Some(99);
        wild.impact = Some(-5);
        wild.ease_of_use = Some(1_000_000);
        wild.attribute = Some("CHAOS".to_owned());
        wild.category = Some("Legendary".to_owned());
        let card = wild.clean().unwrap();
        assert_eq!(card.level, 12);
        assert_eq!(card.impact, 0);
        assert_eq!(card.ease_of_use, 5000);
        assert_eq!(card.attribute, Attribute::Utility);
        assert_eq!(card.category, None);
    }

    #[test]
    fn clean_cards_reports_drops() {
        let batch = vec![raw("a"), RawCard::default(), raw("b")];
        let cards = clean_cards(batch);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].name, "a");
        assert_eq!(cards[1].name, "b");
    }

    #[test]
    fn error_card_embeds_reason() {
        let card = error_card("Not a recognizable library");
        assert_eq!(card.name, "Forbidden Summon");
        assert_eq!(card.description.effect, "Not a recognizable library");
        assert!(card.image_loading);
    }

    #[test]
    fn sorting_and_dedup() {
        let mut cards = vec![
            raw("zip").clean().unwrap(),
            raw("apply").clean().unwrap(),
            raw("map").clean().unwrap(),
        ];
        sort_by_name(&mut cards);
        let names: Vec<_> = cards.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["apply", "map", "zip"]);

        let cards = dedup_by_name(vec![
            raw("map").clean().unwrap(),
            raw("map").clean().unwrap(),
            raw("zip").clean().unwrap(),
        ]);
        assert_eq!(cards.len(), 2);
    }

    #[test]
    fn tier_order_matches_display_order() {
        assert!(Tier::Core < Tier::Staple);
        assert!(Tier::Staple < Tier::Situational);
        assert!(Tier::Situational < Tier::Niche);
        assert_eq!("staple".parse::<Tier>().unwrap(), Tier::Staple);
    }
}
