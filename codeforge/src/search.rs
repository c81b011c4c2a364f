//! Searching for a subject and forging decks from it.
//!
//! A search vets the topic, enumerates its catalogue, classifies tiers and
//! forges a small presentation deck. Custom decks are forged later from the
//! player's catalogue picks, in rate-limited batches that reuse any card
//! already forged.

use anyhow::{anyhow, Context as _};
use log::{debug, warn};
use tokio::time::{sleep, Duration};

use crate::{
    cards::{dedup_by_name, error_card, Card, Tier},
    errors::{is_credential_failure, CredentialError},
    queue::GenerationQueue,
    services::{require_credential, CataloguePick, ContentBackend},
    session::{AppMode, SessionState, Subject},
    Error, Result,
};

/// What a search produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// False when the topic was rejected and a sentinel card was dealt.
    pub valid: bool,
    /// The rejection reason, when there is one.
    pub rejection: Option<String>,
}

/// Promote backend errors that smell like authentication problems to a
/// typed [`CredentialError`], so the UI re-prompts instead of dumping a
/// stack of context.
fn promote_credential(e: Error) -> Error {
    if e.downcast_ref::<CredentialError>().is_none() && is_credential_failure(&e) {
        e.context(CredentialError::Invalid)
    } else {
        e
    }
}

/// Search for a subject, replacing the session's decks and catalogue.
///
/// In code mode the query is vetted first; a rejected topic deals a single
/// sentinel card (which still gets art) instead of failing. Creative mode
/// takes the query as given.
pub async fn run_search(
    state: &mut SessionState,
    queue: &mut GenerationQueue,
    backend: &dyn ContentBackend,
    mode: AppMode,
    query: &str,
    language: &str,
) -> Result<SearchOutcome> {
    require_credential(backend)?;
    let query = query.trim();
    if query.is_empty() {
        return Err(anyhow!("nothing to search for"));
    }

    state.presentation_deck.clear();
    state.custom_deck.clear();
    state.catalogue.clear();
    state.tiers.clear();
    state.selected.clear();
    state.subject = None;

    let subject = match mode {
        AppMode::Code => {
            let analysis = backend
                .analyze_topic(query, language)
                .await
                .map_err(promote_credential)
                .context("could not analyze the search topic")?;
            if !analysis.is_valid {
                let reason = analysis.reason.unwrap_or_else(|| {
                    format!("\"{}\" is not a library the forge recognizes.", query)
                });
                let sentinel = error_card(&reason);
                queue.enqueue([&sentinel], state);
                state.presentation_deck.push(sentinel);
                return Ok(SearchOutcome {
                    valid: false,
                    rejection: Some(reason),
                });
            }
            let name = if analysis.refined_name.trim().is_empty() {
                query.to_owned()
            } else {
                analysis.refined_name
            };
            let language = analysis
                .refined_language
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| language.to_owned());
            Subject::library(&name, &language)
        }
        AppMode::Creative => Subject::theme(query),
    };
    debug!("searching subject {:?}", subject);

    let mut catalogue = backend
        .list_catalogue(&subject)
        .await
        .map_err(promote_credential)
        .context("could not list the catalogue")?;
    catalogue.sort();
    catalogue.dedup();

    // Tier classification is decorative enough to degrade: if it fails for
    // any reason short of a bad key, everything lands in the middle tier.
    let tiers = match backend.classify_tiers(&subject, &catalogue).await {
        Ok(tiers) => tiers,
        Err(e) if is_credential_failure(&e) => return Err(promote_credential(e)),
        Err(e) => {
            warn!("tier classification failed, defaulting everything: {:?}", e);
            catalogue
                .iter()
                .map(|name| (name.clone(), Tier::Situational))
                .collect()
        }
    };

    let count = state.settings.presentation_cards;
    let mut deck = if count > 0 {
        dedup_by_name(
            backend
                .presentation_cards(&subject, count)
                .await
                .map_err(promote_credential)
                .context("could not forge the presentation deck")?,
        )
    } else {
        Vec::new()
    };
    deck.truncate(count);
    for card in &mut deck {
        if card.category.is_none() {
            card.category = tiers.get(&card.name).copied();
        }
    }

    queue.enqueue(&deck, state);
    state.subject = Some(subject);
    state.catalogue = catalogue;
    state.tiers = tiers;
    state.presentation_deck = deck;
    Ok(SearchOutcome {
        valid: true,
        rejection: None,
    })
}

/// Forge cards for the player's catalogue picks into the custom deck.
///
/// Cards already forged are reused rather than regenerated; the remainder is
/// requested in batches with a cooldown between them, so a big selection
/// doesn't hammer the backend. Returns how many cards the deck gained.
pub async fn generate_selected(
    state: &mut SessionState,
    queue: &mut GenerationQueue,
    backend: &dyn ContentBackend,
) -> Result<usize> {
    require_credential(backend)?;
    let subject = state
        .subject
        .clone()
        .ok_or_else(|| anyhow!("search for a subject before forging a deck"))?;
    let selected: Vec<String> = state.selected.iter().cloned().collect();
    if selected.is_empty() {
        return Ok(0);
    }

    let mut reused = Vec::new();
    let mut to_forge = Vec::new();
    for name in &selected {
        if state.custom_deck.iter().any(|c| &c.name == name) {
            // Already in the deck; nothing to do.
        } else if let Some(card) = state
            .presentation_deck
            .iter()
            .find(|c| &c.name == name)
            .cloned()
        {
            reused.push(card);
        } else {
            to_forge.push(CataloguePick {
                name: name.clone(),
                tier: state
                    .tiers
                    .get(name)
                    .copied()
                    .unwrap_or(Tier::Situational),
            });
        }
    }

    // Reused cards keep their art; the ones that never got any rejoin the
    // queue. Commit before enqueueing so the loading flag lands on the
    // copies in the deck.
    let art_pending: Vec<Card> = reused.iter().filter(|c| c.needs_art()).cloned().collect();
    let mut gained = reused.len();
    state.commit_to_custom_deck(reused);
    queue.enqueue(&art_pending, state);

    let batch_size = state.settings.batch_size.max(1);
    let cooldown = Duration::from_secs(state.settings.cooldown_secs);
    for (i, picks) in to_forge.chunks(batch_size).enumerate() {
        if i > 0 {
            debug!("cooling down {:?} before the next batch", cooldown);
            sleep(cooldown).await;
        }
        let mut cards = dedup_by_name(
            backend
                .cards_for_selection(&subject, picks)
                .await
                .map_err(promote_credential)
                .context("could not forge the selected cards")?,
        );
        cards.retain(|card| !state.custom_deck.iter().any(|c| c.name == card.name));
        for card in &mut cards {
            if card.category.is_none() {
                card.category = state.tiers.get(&card.name).copied();
            }
        }
        let art_pending = cards.clone();
        gained += cards.len();
        state.commit_to_custom_deck(cards);
        queue.enqueue(&art_pending, state);
    }

    state.selected.clear();
    Ok(gained)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::{
        cards::RawCard,
        services::{testing::ScriptedBackend, TopicAnalysis},
    };

    fn card(name: &str) -> Card {
        RawCard {
            name: Some(name.to_owned()),
            image_prompt: Some(format!("art of {}", name)),
            ..Default::default()
        }
        .clean()
        .unwrap()
    }

    fn valid_analysis(name: &str, language: &str) -> TopicAnalysis {
        TopicAnalysis {
            is_valid: true,
            reason: None,
            refined_name: name.to_owned(),
            refined_language: Some(language.to_owned()),
        }
    }

    #[tokio::test]
    async fn successful_search_fills_the_session() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .analyses
            .lock()
            .unwrap()
            .push_back(valid_analysis("React", "JavaScript"));
        backend.catalogues.lock().unwrap().push_back(vec![
            "useState".to_owned(),
            "useEffect".to_owned(),
            "useState".to_owned(),
        ]);
        let mut tiers = BTreeMap::new();
        tiers.insert("useState".to_owned(), Tier::Core);
        tiers.insert("useEffect".to_owned(), Tier::Staple);
        backend.tier_maps.lock().unwrap().push_back(Ok(tiers));
        backend
            .presentation_batches
            .lock()
            .unwrap()
            .push_back(vec![card("useState"), card("useEffect")]);

        let mut state = SessionState::default();
        state.settings.presentation_cards = 2;
        let mut queue = GenerationQueue::new();
        let outcome = run_search(
            &mut state,
            &mut queue,
            backend.as_ref(),
            AppMode::Code,
            "recat",
            "javascript",
        )
        .await
        .unwrap();

        assert!(outcome.valid);
        let subject = state.subject.as_ref().unwrap();
        assert_eq!(subject.name, "React");
        assert_eq!(subject.language.as_deref(), Some("JavaScript"));
        assert_eq!(state.catalogue, vec!["useEffect", "useState"]);
        assert_eq!(state.presentation_deck.len(), 2);
        assert_eq!(
            state.presentation_deck[0].category,
            Some(Tier::Core),
            "tier classification is copied onto the forged card"
        );
        assert_eq!(queue.items_left(), 2);
    }

    #[tokio::test]
    async fn rejected_topic_deals_a_sentinel_card() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.analyses.lock().unwrap().push_back(TopicAnalysis {
            is_valid: false,
            reason: Some("That is a sandwich, not a library.".to_owned()),
            refined_name: String::new(),
            refined_language: None,
        });

        let mut state = SessionState::default();
        let mut queue = GenerationQueue::new();
        let outcome = run_search(
            &mut state,
            &mut queue,
            backend.as_ref(),
            AppMode::Code,
            "blt on rye",
            "javascript",
        )
        .await
        .unwrap();

        assert!(!outcome.valid);
        assert_eq!(
            outcome.rejection.as_deref(),
            Some("That is a sandwich, not a library.")
        );
        assert!(state.subject.is_none());
        assert_eq!(state.presentation_deck.len(), 1);
        assert_eq!(state.presentation_deck[0].name, "Forbidden Summon");
        // The sentinel goes through the art queue like any other card.
        assert_eq!(queue.items_left(), 1);
    }

    #[tokio::test]
    async fn tier_failure_defaults_everything_to_situational() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .analyses
            .lock()
            .unwrap()
            .push_back(valid_analysis("React", "JavaScript"));
        backend
            .catalogues
            .lock()
            .unwrap()
            .push_back(vec!["useState".to_owned(), "useEffect".to_owned()]);
        backend
            .tier_maps
            .lock()
            .unwrap()
            .push_back(Err("model overloaded".to_owned()));
        backend
            .presentation_batches
            .lock()
            .unwrap()
            .push_back(vec![]);

        let mut state = SessionState::default();
        let mut queue = GenerationQueue::new();
        run_search(
            &mut state,
            &mut queue,
            backend.as_ref(),
            AppMode::Code,
            "react",
            "javascript",
        )
        .await
        .unwrap();
        assert_eq!(state.tiers["useState"], Tier::Situational);
        assert_eq!(state.tiers["useEffect"], Tier::Situational);
    }

    #[tokio::test]
    async fn credential_marker_in_tier_failure_is_fatal() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .analyses
            .lock()
            .unwrap()
            .push_back(valid_analysis("React", "JavaScript"));
        backend
            .catalogues
            .lock()
            .unwrap()
            .push_back(vec!["useState".to_owned()]);
        backend
            .tier_maps
            .lock()
            .unwrap()
            .push_back(Err("Incorrect API key provided".to_owned()));

        let mut state = SessionState::default();
        let mut queue = GenerationQueue::new();
        let err = run_search(
            &mut state,
            &mut queue,
            backend.as_ref(),
            AppMode::Code,
            "react",
            "javascript",
        )
        .await
        .unwrap_err();
        assert!(is_credential_failure(&err));
        assert_eq!(
            err.downcast_ref::<CredentialError>(),
            Some(&CredentialError::Invalid)
        );
    }

    #[tokio::test]
    async fn creative_mode_skips_topic_analysis() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .catalogues
            .lock()
            .unwrap()
            .push_back(vec!["Dragon".to_owned(), "Phoenix".to_owned()]);
        backend
            .tier_maps
            .lock()
            .unwrap()
            .push_back(Ok(BTreeMap::new()));
        backend
            .presentation_batches
            .lock()
            .unwrap()
            .push_back(vec![card("Dragon")]);

        let mut state = SessionState::default();
        let mut queue = GenerationQueue::new();
        run_search(
            &mut state,
            &mut queue,
            backend.as_ref(),
            AppMode::Creative,
            "mythical beasts",
            "",
        )
        .await
        .unwrap();
        let subject = state.subject.as_ref().unwrap();
        assert_eq!(subject.name, "mythical beasts");
        assert!(subject.language.is_none());
        assert!(backend.analyses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_request() {
        let mut backend = ScriptedBackend::new();
        backend.missing_credential = true;
        let mut state = SessionState::default();
        let mut queue = GenerationQueue::new();
        let err = run_search(
            &mut state,
            &mut queue,
            &backend,
            AppMode::Code,
            "react",
            "javascript",
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<CredentialError>(),
            Some(&CredentialError::Missing)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn selection_reuses_forged_cards_and_batches_the_rest() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .selection_batches
            .lock()
            .unwrap()
            .push_back(vec![card("zip"), card("fold")]);
        backend
            .selection_batches
            .lock()
            .unwrap()
            .push_back(vec![card("scan")]);

        let mut state = SessionState::default();
        state.subject = Some(Subject::library("Lodash", "JavaScript"));
        state.settings.batch_size = 2;
        let mut presented = card("map");
        presented.image_url = Some("data:done".to_owned());
        presented.image_loading = false;
        state.presentation_deck.push(presented);
        state.tiers.insert("zip".to_owned(), Tier::Core);
        for name in ["map", "zip", "fold", "scan"] {
            state.selected.insert(name.to_owned());
        }

        let mut queue = GenerationQueue::new();
        let gained = generate_selected(&mut state, &mut queue, backend.as_ref())
            .await
            .unwrap();

        assert_eq!(gained, 4);
        let names: Vec<_> = state.custom_deck.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["fold", "map", "scan", "zip"]);
        // The reused card kept its art, so only the three new ones queue up.
        assert_eq!(queue.items_left(), 3);
        assert!(state.selected.is_empty());
        // Two batches of two and one, with the already-forged name omitted.
        let calls = backend.selection_calls.lock().unwrap();
        assert_eq!(*calls, vec![vec!["fold", "scan"], vec!["zip"]]);
        assert_eq!(
            state
                .custom_deck
                .iter()
                .find(|c| c.name == "zip")
                .unwrap()
                .category,
            Some(Tier::Core)
        );
    }

    #[tokio::test]
    async fn committed_cards_awaiting_art_are_marked_loading() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .selection_batches
            .lock()
            .unwrap()
            .push_back(vec![card("zip")]);

        let mut state = SessionState::default();
        state.subject = Some(Subject::library("Lodash", "JavaScript"));
        // An art-less presentation card, ripe for reuse.
        state.presentation_deck.push(card("map"));
        state.selected.insert("map".to_owned());
        state.selected.insert("zip".to_owned());

        let mut queue = GenerationQueue::new();
        generate_selected(&mut state, &mut queue, backend.as_ref())
            .await
            .unwrap();

        assert_eq!(queue.items_left(), 2);
        // The copies in the custom deck carry the pending-fetch flag, not
        // just the originals the queue saw.
        for name in ["map", "zip"] {
            let committed = state.custom_deck.iter().find(|c| c.name == name).unwrap();
            assert!(committed.image_loading, "{} should be loading", name);
            assert!(committed.image_url.is_none());
        }
    }
}
