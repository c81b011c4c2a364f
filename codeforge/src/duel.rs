//! The duel arena: a turn-based battle against the trickster.
//!
//! A duel builds a 12-card mini-deck around one target card, deals a hand of
//! four, and poses one challenge per turn. The player answers by playing the
//! right card and then typing the blank's answer; wrong plays and retreats
//! both cost strikes, and an optional per-turn countdown ends the whole duel
//! when it runs out. Card art for the mini-deck is prefetched in the
//! background so the arena fills in as the duel goes on.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, warn};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    cards::{dedup_by_name, Card, SkillLevel},
    services::{ContentBackend, ImplementationChallenge, SyntaxExercise},
    session::Subject,
    timer::Countdown,
    trial::ExerciseContext,
    Result,
};

/// Cards beyond the target in a duel mini-deck.
const PEER_COUNT: usize = 11;

/// Cards dealt at the start of a duel.
const OPENING_HAND: usize = 4;

/// A hand never grows beyond this.
const HAND_CAP: usize = 7;

/// Strikes before the duel is lost, from wrong plays and retreats alike.
const MAX_STRIKES: u8 = 3;

/// How much time the player gets for each turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    /// 90 seconds.
    Easy,
    /// 60 seconds.
    Medium,
    /// 30 seconds.
    Hard,
    /// A custom number of minutes.
    Custom(u64),
    /// No timer at all.
    Untimed,
}

impl Difficulty {
    /// Seconds on the clock, or `None` for an untimed duel.
    pub fn seconds(&self) -> Option<u64> {
        match self {
            Difficulty::Easy => Some(90),
            Difficulty::Medium => Some(60),
            Difficulty::Hard => Some(30),
            Difficulty::Custom(minutes) => Some(minutes * 60),
            Difficulty::Untimed => None,
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        // Five minutes, the custom-duel default.
        Difficulty::Custom(5)
    }
}

/// The challenge a turn poses.
#[derive(Debug, Clone)]
pub enum DuelChallenge {
    /// Fill in the blank; the right card to play is the turn's target.
    Syntax(SyntaxExercise),
    /// First work out which card solves the problem, then fill in the call.
    Implementation(ImplementationChallenge),
}

impl DuelChallenge {
    /// The code shown to the player.
    pub fn snippet(&self) -> &str {
        match self {
            DuelChallenge::Syntax(e) => &e.snippet,
            DuelChallenge::Implementation(c) => &c.snippet,
        }
    }

    fn blank_answer(&self) -> &str {
        match self {
            DuelChallenge::Syntax(e) => &e.blank_answer,
            DuelChallenge::Implementation(c) => &c.blank_answer,
        }
    }

    fn explanation(&self) -> &str {
        match self {
            DuelChallenge::Syntax(e) => &e.explanation,
            DuelChallenge::Implementation(c) => &c.explanation,
        }
    }
}

/// How a duel ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuelResult {
    /// Did the player win?
    pub victory: bool,
    /// The closing line.
    pub message: String,
}

/// Where a duel currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuelPhase {
    /// Waiting for the player to play a card from their hand.
    Choosing,
    /// The right card was played; waiting for the typed answer.
    Answering,
    /// The duel is over.
    Over(DuelResult),
}

/// What playing a card did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Implementation challenges turn a card face-up on its first play; a
    /// second play of the same card commits.
    Revealed,
    /// The right card. Type the answer now.
    Accepted,
    /// The wrong card.
    Strike {
        /// What to tell the player.
        message: String,
    },
    /// That play ended the duel.
    Over(DuelResult),
    /// No such card in hand.
    NotInHand,
}

/// Normalize a typed duel answer.
///
/// The arena is stricter about identity and looser about layout than solo
/// trials: all whitespace is stripped before the lowercase compare, so
/// `strcpy(dest, src)` and `strcpy( dest,src )` are the same answer.
pub fn normalize_answer(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// One duel against the trickster.
pub struct Duel {
    backend: Arc<dyn ContentBackend>,
    subject: Subject,
    skill: SkillLevel,
    difficulty: Difficulty,
    rng: StdRng,

    /// The whole mini-deck; targets are drawn from here, not just the hand.
    all_cards: Vec<Card>,
    hand: Vec<Card>,
    library: Vec<Card>,
    target: Option<Card>,
    challenge: Option<DuelChallenge>,
    /// Implementation challenges: cards turned face-up this turn.
    revealed: BTreeSet<String>,
    phase: DuelPhase,
    strikes: u8,
    /// The typed answer that ended the duel, for the follow-up chat.
    last_guess: Option<String>,
    /// A line to show the player, e.g. after a failed challenge fetch.
    notice: Option<String>,

    countdown: Countdown,
    art_rx: mpsc::UnboundedReceiver<(String, String)>,
    art_task: Option<JoinHandle<()>>,
}

impl Duel {
    /// Start a duel around `base`, dealing the opening hand and posing the
    /// first challenge.
    pub async fn begin(
        backend: Arc<dyn ContentBackend>,
        base: Card,
        subject: Subject,
        skill: SkillLevel,
        difficulty: Difficulty,
    ) -> Result<Duel> {
        Duel::begin_seeded(backend, base, subject, skill, difficulty, rand::random()).await
    }

    /// Like [`Duel::begin`], with a fixed shuffle seed.
    pub async fn begin_seeded(
        backend: Arc<dyn ContentBackend>,
        base: Card,
        subject: Subject,
        skill: SkillLevel,
        difficulty: Difficulty,
        seed: u64,
    ) -> Result<Duel> {
        let peers = backend.duel_deck(&base, &subject).await?;
        let mut all_cards = Vec::with_capacity(PEER_COUNT + 1);
        all_cards.push(base);
        all_cards.extend(peers);
        let mut all_cards = dedup_by_name(all_cards);
        all_cards.truncate(PEER_COUNT + 1);

        let mut rng = StdRng::seed_from_u64(seed);
        all_cards.shuffle(&mut rng);
        let hand: Vec<Card> = all_cards
            .iter()
            .take(OPENING_HAND)
            .cloned()
            .collect();
        let library: Vec<Card> = all_cards
            .iter()
            .skip(OPENING_HAND)
            .cloned()
            .collect();

        let (art_rx, art_task) = spawn_art_prefetch(backend.clone(), all_cards.iter());

        let mut duel = Duel {
            backend,
            subject,
            skill,
            difficulty,
            rng,
            all_cards,
            hand,
            library,
            target: None,
            challenge: None,
            revealed: BTreeSet::new(),
            phase: DuelPhase::Choosing,
            strikes: 0,
            last_guess: None,
            notice: None,
            countdown: Countdown::idle(),
            art_rx,
            art_task: Some(art_task),
        };
        duel.start_turn().await;
        Ok(duel)
    }

    /// Pick a new target from the mini-deck, fetch its challenge, and rewind
    /// the clock. A failed fetch leaves the turn skippable instead of ending
    /// the duel.
    async fn start_turn(&mut self) {
        self.revealed.clear();
        self.phase = DuelPhase::Choosing;
        let index = self.rng.gen_range(0..self.all_cards.len().max(1));
        let Some(target) = self.all_cards.get(index).cloned() else {
            // An empty mini-deck cannot happen; the base card is always in it.
            self.finish(DuelResult {
                victory: false,
                message: "The arena is empty. The duel is lost.".to_owned(),
            });
            return;
        };
        debug!("duel target: {:?}", target.name);
        let challenge = match self.skill {
            SkillLevel::Beginner => self
                .backend
                .syntax_exercise(&target, self.subject.language.as_deref())
                .await
                .map(DuelChallenge::Syntax),
            SkillLevel::Intermediate | SkillLevel::Advanced => self
                .backend
                .implementation_challenge(&target, self.skill)
                .await
                .map(DuelChallenge::Implementation),
        };
        match challenge {
            Ok(challenge) => {
                self.target = Some(target);
                self.challenge = Some(challenge);
            }
            Err(e) => {
                warn!("could not fetch a duel challenge: {:?}", e);
                self.target = Some(target);
                self.challenge = None;
                self.notice =
                    Some("The spirits are silent. Try skipping this turn.".to_owned());
            }
        }
        // Every turn gets a fresh clock.
        self.countdown.start(self.difficulty.seconds());
    }

    /// The current phase.
    pub fn phase(&self) -> &DuelPhase {
        &self.phase
    }

    /// The cards in hand.
    pub fn hand(&self) -> &[Card] {
        &self.hand
    }

    /// Cards left in the library.
    pub fn library_len(&self) -> usize {
        self.library.len()
    }

    /// The challenge on the table, if one was fetched.
    pub fn challenge(&self) -> Option<&DuelChallenge> {
        self.challenge.as_ref()
    }

    /// Strikes so far.
    pub fn strikes(&self) -> u8 {
        self.strikes
    }

    /// Seconds on the clock, `None` when untimed.
    pub fn remaining_secs(&self) -> Option<u64> {
        self.countdown.remaining()
    }

    /// Take the pending notice line, if any.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    /// The name a correct play must match.
    fn required_name(&self) -> Option<String> {
        match (&self.challenge, &self.target) {
            (Some(DuelChallenge::Implementation(c)), target) => {
                if c.target_function.trim().is_empty() {
                    target.as_ref().map(|t| t.name.clone())
                } else {
                    Some(c.target_function.clone())
                }
            }
            (Some(DuelChallenge::Syntax(_)), Some(target)) => Some(target.name.clone()),
            _ => None,
        }
    }

    /// Play a card from the hand.
    ///
    /// Syntax challenges commit immediately. Implementation challenges turn
    /// the card face-up on its first play, free of charge; playing a card
    /// that is already face-up commits it. Revealed cards stay face-up for
    /// the rest of the turn.
    pub fn play_card(&mut self, name: &str) -> PlayOutcome {
        if !matches!(self.phase, DuelPhase::Choosing) {
            return PlayOutcome::NotInHand;
        }
        if !self.hand.iter().any(|c| c.name == name) {
            return PlayOutcome::NotInHand;
        }
        let Some(required) = self.required_name() else {
            return PlayOutcome::Strike {
                message: "There is no challenge to answer. Skip this turn.".to_owned(),
            };
        };
        if matches!(self.challenge, Some(DuelChallenge::Implementation(_)))
            && !self.revealed.contains(name)
        {
            self.revealed.insert(name.to_owned());
            return PlayOutcome::Revealed;
        }
        if name == required {
            self.phase = DuelPhase::Answering;
            PlayOutcome::Accepted
        } else {
            match self.add_strike("Three incorrect plays! The duel is lost.") {
                Some(result) => PlayOutcome::Over(result),
                None => PlayOutcome::Strike {
                    message: "That's not the right function! Strike!".to_owned(),
                },
            }
        }
    }

    /// Register a strike. Returns the result when it was the third, with
    /// `terminal_message` as the closing line.
    fn add_strike(&mut self, terminal_message: &str) -> Option<DuelResult> {
        self.strikes += 1;
        if self.strikes >= MAX_STRIKES {
            let result = DuelResult {
                victory: false,
                message: terminal_message.to_owned(),
            };
            self.finish(result.clone());
            Some(result)
        } else {
            None
        }
    }

    /// Submit the typed answer. This ends the duel either way.
    pub fn submit_answer(&mut self, guess: &str) -> DuelResult {
        if let DuelPhase::Over(result) = &self.phase {
            return result.clone();
        }
        self.last_guess = Some(guess.to_owned());
        let (expected, explanation) = match &self.challenge {
            Some(challenge) => (
                challenge.blank_answer().to_owned(),
                challenge.explanation().to_owned(),
            ),
            None => (String::new(), String::new()),
        };
        let victory = !expected.is_empty()
            && normalize_answer(&expected) == normalize_answer(guess);
        let result = DuelResult {
            victory,
            message: if victory {
                "Victory!".to_owned()
            } else {
                format!(
                    "Incorrect. The correct answer was: {}. {}",
                    expected, explanation
                )
            },
        };
        self.finish(result.clone());
        result
    }

    /// Retreat from the current challenge. This costs a strike; if the duel
    /// survives, a brand-new turn starts with a fresh clock.
    pub async fn skip(&mut self) -> Option<DuelResult> {
        if !matches!(self.phase, DuelPhase::Choosing | DuelPhase::Answering) {
            return None;
        }
        if let Some(result) =
            self.add_strike("You have retreated too many times. The duel is lost.")
        {
            return Some(result);
        }
        self.start_turn().await;
        None
    }

    /// Draw the top card of the library into the hand. Returns a line for
    /// the player when nothing was drawn. Not allowed while an answer is
    /// being typed.
    pub fn draw(&mut self) -> Option<String> {
        if matches!(self.phase, DuelPhase::Answering) {
            return Some("Finish your incantation first.".to_owned());
        }
        if self.hand.len() >= HAND_CAP {
            return Some("Your hand is full.".to_owned());
        }
        if self.library.is_empty() {
            return Some("The library is empty.".to_owned());
        }
        let card = self.library.remove(0);
        debug!("drew {:?}", card.name);
        self.hand.push(card);
        None
    }

    /// End the duel because the clock ran out.
    pub fn timed_out(&mut self) -> DuelResult {
        let result = DuelResult {
            victory: false,
            message: "Time ran out! The sands of the arena have claimed another."
                .to_owned(),
        };
        self.finish(result.clone());
        result
    }

    /// Resolves when the turn clock hits zero. Never resolves when untimed
    /// or already over.
    pub async fn expired(&mut self) {
        if matches!(self.phase, DuelPhase::Over(_)) {
            std::future::pending::<()>().await;
        }
        self.countdown.expired().await
    }

    /// The finished challenge as tutor-chat context. Only available once the
    /// duel is over and only when a challenge was actually on the table.
    pub fn exercise_context(&self) -> Option<ExerciseContext> {
        let DuelPhase::Over(result) = &self.phase else {
            return None;
        };
        let challenge = self.challenge.as_ref()?;
        let target = self.target.as_ref()?;
        Some(ExerciseContext {
            kind: "duel".to_owned(),
            card_name: target.name.clone(),
            snippet: challenge.snippet().to_owned(),
            answer: challenge.blank_answer().to_owned(),
            explanation: challenge.explanation().to_owned(),
            user_answer: self.last_guess.clone().unwrap_or_default(),
            correct: result.victory,
        })
    }

    /// Apply any art the background prefetch has finished since the last
    /// call. Returns how many completions were applied.
    pub fn poll_art(&mut self) -> usize {
        let mut applied = 0;
        while let Ok((name, url)) = self.art_rx.try_recv() {
            for card in self
                .hand
                .iter_mut()
                .chain(self.library.iter_mut())
                .chain(self.all_cards.iter_mut())
                .chain(self.target.iter_mut())
            {
                if card.name == name {
                    card.image_url = Some(url.clone());
                    card.image_loading = false;
                }
            }
            applied += 1;
        }
        applied
    }

    fn finish(&mut self, result: DuelResult) {
        self.countdown.cancel();
        self.phase = DuelPhase::Over(result);
    }
}

impl Drop for Duel {
    fn drop(&mut self) {
        if let Some(task) = self.art_task.take() {
            task.abort();
        }
    }
}

/// Prefetch art for the mini-deck, one card at a time, off the duel's
/// critical path. The duel applies completions via [`Duel::poll_art`].
fn spawn_art_prefetch<'a, I>(
    backend: Arc<dyn ContentBackend>,
    cards: I,
) -> (mpsc::UnboundedReceiver<(String, String)>, JoinHandle<()>)
where
    I: IntoIterator<Item = &'a Card>,
{
    let jobs: Vec<(String, String)> = cards
        .into_iter()
        .filter(|c| c.needs_art())
        .map(|c| (c.name.clone(), c.image_prompt.clone()))
        .collect();
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        for (name, prompt) in jobs {
            match backend.generate_art(&prompt).await {
                Ok(url) => {
                    if tx.send((name, url)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("duel art prefetch failed for {:?}: {:?}", name, e);
                }
            }
        }
    });
    (rx, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cards::RawCard, services::testing::ScriptedBackend};

    fn card(name: &str) -> Card {
        RawCard {
            name: Some(name.to_owned()),
            image_prompt: Some(format!("art of {}", name)),
            ..Default::default()
        }
        .clean()
        .unwrap()
    }

    fn syntax(answer: &str) -> SyntaxExercise {
        SyntaxExercise {
            snippet: format!("const [n, setN] = ___(0); // {}", answer),
            blank_answer: answer.to_owned(),
            explanation: "As any apprentice knows.".to_owned(),
        }
    }

    fn script_syntax(backend: &ScriptedBackend, answer: &str, times: usize) {
        let mut queue = backend.syntax_exercises.lock().unwrap();
        for _ in 0..times {
            queue.push_back(Ok(syntax(answer)));
        }
    }

    /// A duel whose mini-deck is just the base card, so the target is
    /// always known.
    async fn solo_duel(
        backend: Arc<ScriptedBackend>,
        skill: SkillLevel,
        difficulty: Difficulty,
    ) -> Duel {
        backend.duel_decks.lock().unwrap().push_back(vec![]);
        Duel::begin_seeded(
            backend,
            card("useState"),
            Subject::library("React", "JavaScript"),
            skill,
            difficulty,
            7,
        )
        .await
        .unwrap()
    }

    /// A duel with three peers, plus a way to find a wrong card in hand.
    async fn peered_duel(backend: Arc<ScriptedBackend>, skill: SkillLevel) -> Duel {
        backend
            .duel_decks
            .lock()
            .unwrap()
            .push_back(vec![card("useEffect"), card("useMemo"), card("useRef")]);
        Duel::begin_seeded(
            backend,
            card("useState"),
            Subject::library("React", "JavaScript"),
            skill,
            Difficulty::Untimed,
            7,
        )
        .await
        .unwrap()
    }

    fn wrong_card_in_hand(duel: &Duel) -> String {
        let required = duel.required_name().unwrap();
        duel.hand()
            .iter()
            .find(|c| c.name != required)
            .map(|c| c.name.clone())
            .unwrap()
    }

    #[test]
    fn answer_normalization_strips_all_whitespace() {
        assert_eq!(normalize_answer("strcpy( dest, src )"), "strcpy(dest,src)");
        assert_eq!(
            normalize_answer("STRCPY(dest,src)"),
            normalize_answer("strcpy(dest, src)")
        );
        assert_eq!(
            normalize_answer("strcpy(dest, src);"),
            normalize_answer("strcpy( dest , src ) ;")
        );
        assert_ne!(normalize_answer("use_state()"), normalize_answer("useState()"));
    }

    #[test]
    fn answer_normalization_is_idempotent() {
        for answer in ["strcpy( dest , src ) ;", "UseState", "  a\tb\nc  "] {
            let once = normalize_answer(answer);
            assert_eq!(normalize_answer(&once), once);
        }
    }

    #[tokio::test]
    async fn correct_play_and_answer_wins() {
        let backend = Arc::new(ScriptedBackend::new());
        script_syntax(&backend, "useState", 1);
        let mut duel = solo_duel(backend, SkillLevel::Beginner, Difficulty::Untimed).await;

        assert_eq!(duel.play_card("useState"), PlayOutcome::Accepted);
        assert_eq!(*duel.phase(), DuelPhase::Answering);
        let result = duel.submit_answer(" UseState ");
        assert!(result.victory);
        assert_eq!(result.message, "Victory!");

        let context = duel.exercise_context().unwrap();
        assert_eq!(context.kind, "duel");
        assert_eq!(context.card_name, "useState");
        assert!(context.correct);
        assert_eq!(context.user_answer, " UseState ");
    }

    #[tokio::test]
    async fn wrong_answer_is_an_immediate_defeat() {
        let backend = Arc::new(ScriptedBackend::new());
        script_syntax(&backend, "useState", 1);
        let mut duel = solo_duel(backend, SkillLevel::Beginner, Difficulty::Untimed).await;

        duel.play_card("useState");
        let result = duel.submit_answer("useReducer");
        assert!(!result.victory);
        assert_eq!(
            result.message,
            "Incorrect. The correct answer was: useState. As any apprentice knows."
        );
        assert!(matches!(duel.phase(), DuelPhase::Over(_)));
    }

    #[tokio::test]
    async fn three_wrong_plays_lose_the_duel() {
        let backend = Arc::new(ScriptedBackend::new());
        script_syntax(&backend, "whatever", 1);
        let mut duel = peered_duel(backend, SkillLevel::Beginner).await;
        let wrong = wrong_card_in_hand(&duel);

        for strike in 1..=2 {
            match duel.play_card(&wrong) {
                PlayOutcome::Strike { message } => {
                    assert_eq!(message, "That's not the right function! Strike!");
                    assert_eq!(duel.strikes(), strike);
                }
                other => panic!("expected a strike, got {:?}", other),
            }
        }
        match duel.play_card(&wrong) {
            PlayOutcome::Over(result) => {
                assert!(!result.victory);
                assert_eq!(result.message, "Three incorrect plays! The duel is lost.");
            }
            other => panic!("expected the duel to end, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn three_retreats_lose_the_duel() {
        let backend = Arc::new(ScriptedBackend::new());
        // The first turn plus one per survived retreat.
        script_syntax(&backend, "useState", 3);
        let mut duel = solo_duel(backend, SkillLevel::Beginner, Difficulty::Untimed).await;

        assert!(duel.skip().await.is_none());
        assert!(duel.skip().await.is_none());
        assert_eq!(duel.strikes(), 2);
        let result = duel.skip().await.unwrap();
        assert!(!result.victory);
        assert_eq!(
            result.message,
            "You have retreated too many times. The duel is lost."
        );
    }

    #[tokio::test]
    async fn retreats_and_wrong_plays_share_the_strike_counter() {
        let backend = Arc::new(ScriptedBackend::new());
        // The first turn plus one per survived retreat.
        script_syntax(&backend, "whatever", 3);
        let mut duel = peered_duel(backend, SkillLevel::Beginner).await;

        assert!(duel.skip().await.is_none());
        assert!(duel.skip().await.is_none());
        let wrong = wrong_card_in_hand(&duel);
        match duel.play_card(&wrong) {
            PlayOutcome::Over(result) => {
                assert_eq!(result.message, "Three incorrect plays! The duel is lost.");
            }
            other => panic!("expected the duel to end, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn implementation_challenges_reveal_before_committing() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .duel_decks
            .lock()
            .unwrap()
            .push_back(vec![card("useEffect")]);
        backend
            .implementation_challenges
            .lock()
            .unwrap()
            .push_back(Ok(ImplementationChallenge {
                snippet: "___(() => subscribe(), []);".to_owned(),
                target_function: "useEffect".to_owned(),
                blank_answer: "useEffect".to_owned(),
                explanation: "Effects live in useEffect.".to_owned(),
            }));
        let mut duel = Duel::begin_seeded(
            backend,
            card("useState"),
            Subject::library("React", "JavaScript"),
            SkillLevel::Intermediate,
            Difficulty::Untimed,
            7,
        )
        .await
        .unwrap();

        // First play only reveals, even for the right card.
        assert_eq!(duel.play_card("useEffect"), PlayOutcome::Revealed);
        assert_eq!(duel.strikes(), 0);
        // Peeking at another card does not turn the first back face-down.
        assert_eq!(duel.play_card("useState"), PlayOutcome::Revealed);
        assert_eq!(duel.play_card("useEffect"), PlayOutcome::Accepted);
    }

    #[tokio::test]
    async fn drawing_respects_the_hand_cap() {
        let backend = Arc::new(ScriptedBackend::new());
        let peers: Vec<Card> = (0..11).map(|i| card(&format!("fn{}", i))).collect();
        backend.duel_decks.lock().unwrap().push_back(peers);
        script_syntax(&backend, "whatever", 1);
        let mut duel = Duel::begin_seeded(
            backend,
            card("useState"),
            Subject::library("React", "JavaScript"),
            SkillLevel::Beginner,
            Difficulty::Untimed,
            7,
        )
        .await
        .unwrap();

        assert_eq!(duel.hand().len(), 4);
        assert_eq!(duel.library_len(), 8);
        for _ in 0..3 {
            assert!(duel.draw().is_none());
        }
        assert_eq!(duel.hand().len(), 7);
        assert_eq!(duel.draw().as_deref(), Some("Your hand is full."));
        assert_eq!(duel.library_len(), 5);
    }

    #[tokio::test]
    async fn drawing_takes_from_the_top_of_the_library() {
        let backend = Arc::new(ScriptedBackend::new());
        let peers: Vec<Card> = (0..11).map(|i| card(&format!("fn{}", i))).collect();
        backend.duel_decks.lock().unwrap().push_back(peers.clone());
        script_syntax(&backend, "whatever", 1);
        let mut duel = Duel::begin_seeded(
            backend,
            card("useState"),
            Subject::library("React", "JavaScript"),
            SkillLevel::Beginner,
            Difficulty::Untimed,
            7,
        )
        .await
        .unwrap();

        // Replay the deal to learn the library order.
        let mut expected =
            dedup_by_name(std::iter::once(card("useState")).chain(peers).collect());
        expected.truncate(PEER_COUNT + 1);
        expected.shuffle(&mut StdRng::seed_from_u64(7));

        for top in expected.iter().skip(OPENING_HAND).take(3) {
            assert!(duel.draw().is_none());
            assert_eq!(duel.hand().last().unwrap().name, top.name);
        }
    }

    #[tokio::test]
    async fn drawing_is_blocked_while_answering() {
        let backend = Arc::new(ScriptedBackend::new());
        script_syntax(&backend, "whatever", 1);
        let mut duel = peered_duel(backend, SkillLevel::Beginner).await;

        let required = duel.required_name().unwrap();
        assert_eq!(duel.play_card(&required), PlayOutcome::Accepted);
        assert_eq!(duel.draw().as_deref(), Some("Finish your incantation first."));
        assert_eq!(duel.hand().len(), 4);
    }

    #[tokio::test]
    async fn timer_expiry_ends_the_duel() {
        let backend = Arc::new(ScriptedBackend::new());
        script_syntax(&backend, "useState", 1);
        let mut duel = solo_duel(backend, SkillLevel::Beginner, Difficulty::Hard).await;
        assert!(duel.remaining_secs().unwrap() <= 30);

        let result = duel.timed_out();
        assert!(!result.victory);
        assert_eq!(
            result.message,
            "Time ran out! The sands of the arena have claimed another."
        );
        assert_eq!(duel.remaining_secs(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn retreating_rewinds_the_clock() {
        let backend = Arc::new(ScriptedBackend::new());
        script_syntax(&backend, "useState", 2);
        let mut duel = solo_duel(backend, SkillLevel::Beginner, Difficulty::Hard).await;

        assert!(duel.skip().await.is_none());
        assert_eq!(duel.remaining_secs(), Some(30));
    }

    #[tokio::test]
    async fn failed_challenge_fetch_leaves_the_turn_skippable() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .syntax_exercises
            .lock()
            .unwrap()
            .push_back(Err("model overloaded".to_owned()));
        script_syntax(&backend, "useState", 1);
        let mut duel = solo_duel(backend, SkillLevel::Beginner, Difficulty::Untimed).await;

        assert!(duel.challenge().is_none());
        assert_eq!(
            duel.take_notice().as_deref(),
            Some("The spirits are silent. Try skipping this turn.")
        );
        assert!(duel.skip().await.is_none());
        assert!(duel.challenge().is_some());
    }

    #[tokio::test]
    async fn art_prefetch_fills_the_mini_deck() {
        let backend = Arc::new(ScriptedBackend::new());
        script_syntax(&backend, "useState", 1);
        let mut duel = solo_duel(backend.clone(), SkillLevel::Beginner, Difficulty::Untimed)
            .await;

        let mut applied = 0;
        for _ in 0..100 {
            tokio::task::yield_now().await;
            applied += duel.poll_art();
            if applied > 0 {
                break;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(
            duel.hand()[0].image_url.as_deref(),
            Some("data:image/png;base64,fake-art-for:art of useState")
        );
        assert_eq!(
            *backend.art_calls.lock().unwrap(),
            vec!["art of useState".to_owned()]
        );
    }
}
