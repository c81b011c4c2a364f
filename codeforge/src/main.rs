//! Turn programming libraries into collectible card decks, then duel with
//! them.

#![warn(missing_docs)]

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::anyhow;
pub use anyhow::{Error, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    cards::{SkillLevel, Tier},
    duel::{Difficulty, Duel, DuelPhase, PlayOutcome},
    queue::GenerationQueue,
    services::{oai::OpenAiBackend, ContentBackend},
    session::{AppMode, CardTheme, SessionState},
    store::SessionStore,
    timer::IdleWatcher,
    trial::{ChatMessage, Trial, TrialExercise},
    ui::Ui,
};

pub(crate) mod ai;
pub(crate) mod cache;
pub mod cards;
pub mod duel;
pub mod errors;
pub mod queue;
pub mod search;
pub mod services;
pub mod session;
pub mod store;
pub mod timer;
pub mod trial;
pub mod ui;

/// How long a duel or trial may sit untouched before cached card art is
/// evicted.
const ART_IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Parser)]
/// Forge collectible trading cards from programming libraries (or creative
/// themes), then study them through duels and solo trials. Requires an
/// OpenAI API key in OPENAI_API_KEY or a .env file.
#[command(name = "codeforge", version)]
enum Args {
    /// Search for a library and forge its first cards.
    #[command(name = "search")]
    Search {
        /// The library (or theme) to forge cards for.
        query: String,

        /// The programming language the library belongs to.
        #[arg(long, default_value = "JavaScript")]
        language: String,

        /// Treat the query as a creative theme instead of a library.
        #[arg(long)]
        creative: bool,
    },

    /// Forge cards for specific catalogue items.
    #[command(name = "forge")]
    Forge {
        /// Catalogue items to forge, as printed by `search`.
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Manage card art.
    #[command(name = "art")]
    Art {
        #[command(subcommand)]
        action: ArtAction,
    },

    /// Save, load and share sessions.
    #[command(name = "sessions")]
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Show or change settings.
    #[command(name = "settings")]
    Settings {
        /// Skill level: beginner, intermediate or advanced.
        #[arg(long)]
        skill: Option<String>,

        /// Card theme: default or official.
        #[arg(long)]
        theme: Option<String>,

        /// Turn manual art mode on or off.
        #[arg(long)]
        manual_art: Option<bool>,

        /// How many cards a search deals immediately (0 to 6).
        #[arg(long)]
        presentation_cards: Option<usize>,

        /// Cards per forge batch.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Seconds between forge batches.
        #[arg(long)]
        cooldown: Option<u64>,
    },

    /// Duel the trickster over a card from your decks.
    #[command(name = "duel")]
    Duel {
        /// The card to duel with.
        card: String,

        /// Difficulty: easy, medium, hard, untimed, or a number of minutes.
        #[arg(long, default_value = "5")]
        difficulty: String,
    },

    /// Take a solo trial on a card, with a tutor chat afterwards.
    #[command(name = "trial")]
    Trial {
        /// The card to be tested on.
        card: String,

        /// Ask a multiple-choice quiz instead of a syntax puzzle.
        #[arg(long)]
        quiz: bool,
    },
}

/// Card art maintenance.
#[derive(Debug, Subcommand)]
enum ArtAction {
    /// Retry art for a card whose last attempt failed.
    #[command(name = "retry")]
    Retry {
        /// The card to retry.
        card: String,
    },

    /// Throw away a card's art and forge new art from scratch.
    #[command(name = "refresh")]
    Refresh {
        /// The card to refresh.
        card: String,
    },

    /// Assign an image to a card by hand (manual art mode).
    #[command(name = "assign")]
    Assign {
        /// The card to assign art to.
        card: String,

        /// Path to the image file.
        image: PathBuf,
    },

    /// Evict all cached card art.
    #[command(name = "clear")]
    Clear,
}

/// Session gallery operations.
#[derive(Debug, Subcommand)]
enum SessionAction {
    /// List saved sessions.
    #[command(name = "list")]
    List,

    /// Save the current session under a name.
    #[command(name = "save")]
    Save {
        /// A name for the save.
        name: String,
    },

    /// Load a saved session, replacing the current one.
    #[command(name = "load")]
    Load {
        /// The id shown by `sessions list`.
        id: u64,
    },

    /// Delete a saved session.
    #[command(name = "delete")]
    Delete {
        /// The id shown by `sessions list`.
        id: u64,
    },

    /// Export a saved session to a file for sharing.
    #[command(name = "export")]
    Export {
        /// The id shown by `sessions list`.
        id: u64,

        /// Where to write the file.
        path: PathBuf,
    },

    /// Import a shared session file.
    #[command(name = "import")]
    Import {
        /// The file to import.
        path: PathBuf,
    },
}

// Choose and run the appropriate command.
#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let ui = Ui::init();

    let args: Args = Args::parse();
    match args {
        Args::Search {
            query,
            language,
            creative,
        } => cmd_search(&ui, &query, &language, creative).await,
        Args::Forge { names } => cmd_forge(&ui, names).await,
        Args::Art { action } => cmd_art(&ui, action).await,
        Args::Sessions { action } => cmd_sessions(action),
        Args::Settings {
            skill,
            theme,
            manual_art,
            presentation_cards,
            batch_size,
            cooldown,
        } => cmd_settings(
            skill,
            theme,
            manual_art,
            presentation_cards,
            batch_size,
            cooldown,
        ),
        Args::Duel { card, difficulty } => cmd_duel(&ui, &card, &difficulty).await,
        Args::Trial { card, quiz } => cmd_trial(&ui, &card, quiz).await,
    }
}

/// The working session from the last invocation, or a fresh one.
fn load_state(store: &SessionStore) -> Result<SessionState> {
    Ok(store.load_current()?.unwrap_or_default())
}

fn print_card(card: &crate::cards::Card) {
    let art = if card.image_url.is_some() {
        "🖼"
    } else if card.image_loading {
        "⏳"
    } else {
        "✗"
    };
    println!(
        "  {} {} [{}] lv{} {}  {}/{}",
        art, card.name, card.attribute, card.level, card.kind, card.impact,
        card.ease_of_use,
    );
    if !card.description.effect.is_empty() {
        println!("      {}", card.description.effect);
    }
}

async fn cmd_search(ui: &Ui, query: &str, language: &str, creative: bool) -> Result<()> {
    let store = SessionStore::open()?;
    let mut state = load_state(&store)?;
    let backend = OpenAiBackend::new(ui.clone());
    let mut queue = GenerationQueue::new();
    let mode = if creative {
        AppMode::Creative
    } else {
        AppMode::Code
    };

    let outcome =
        search::run_search(&mut state, &mut queue, &backend, mode, query, language)
            .await?;
    if !outcome.valid {
        if let Some(reason) = &outcome.rejection {
            println!("The forge refuses: {}", reason);
        }
    }
    queue::process(&mut queue, &mut state, &backend, ui).await?;
    store.save_current(&state)?;

    if let Some(subject) = &state.subject {
        println!("Subject: {}", subject.name);
    }
    if !state.presentation_deck.is_empty() {
        println!("Presentation deck:");
        for card in &state.presentation_deck {
            print_card(card);
        }
    }
    if !state.catalogue.is_empty() {
        println!("Catalogue ({} items):", state.catalogue.len());
        for tier in [Tier::Core, Tier::Staple, Tier::Situational, Tier::Niche] {
            let items: Vec<&str> = state
                .catalogue
                .iter()
                .filter(|name| state.tiers.get(*name) == Some(&tier))
                .map(String::as_str)
                .collect();
            if !items.is_empty() {
                println!("  {}: {}", tier, items.join(", "));
            }
        }
        println!("Forge more with `codeforge forge <name>...`");
    }
    Ok(())
}

async fn cmd_forge(ui: &Ui, names: Vec<String>) -> Result<()> {
    let store = SessionStore::open()?;
    let mut state = load_state(&store)?;
    let backend = OpenAiBackend::new(ui.clone());
    let mut queue = GenerationQueue::new();

    for name in names {
        if !state.catalogue.contains(&name) {
            return Err(anyhow!(
                "{:?} is not in the catalogue; run `codeforge search` first",
                name
            ));
        }
        state.selected.insert(name);
    }
    let gained = search::generate_selected(&mut state, &mut queue, &backend).await?;
    queue::process(&mut queue, &mut state, &backend, ui).await?;
    store.save_current(&state)?;

    println!("Forged {} new cards. Custom deck:", gained);
    for card in &state.custom_deck {
        print_card(card);
    }
    Ok(())
}

async fn cmd_art(ui: &Ui, action: ArtAction) -> Result<()> {
    let store = SessionStore::open()?;
    let mut state = load_state(&store)?;
    let backend = OpenAiBackend::new(ui.clone());
    let mut queue = GenerationQueue::new();

    match action {
        ArtAction::Retry { card } => {
            if queue::retry_art(&mut queue, &mut state, &card) == 0 {
                println!("{:?} has art already, or is not in your decks.", card);
            }
        }
        ArtAction::Refresh { card } => {
            if queue::delete_art(&mut queue, &mut state, &backend, &card).await? == 0 {
                println!("{:?} is not in your decks.", card);
            }
        }
        ArtAction::Assign { card, image } => {
            if !state.settings.manual_art_mode {
                return Err(anyhow!(
                    "manual art assignment needs manual art mode; run \
                     `codeforge settings --manual-art true`"
                ));
            }
            if state.find_card(&card).is_none() {
                return Err(anyhow!("{:?} is not in your decks", card));
            }
            let reference = image.display().to_string();
            state.manual_art.insert(card.clone(), reference.clone());
            state.apply_art(&card, &reference);
            println!("Assigned {} to {:?}.", reference, card);
        }
        ArtAction::Clear => {
            let removed = backend.clear_art().await?;
            println!("Evicted {} cached art entries.", removed);
        }
    }
    queue::process(&mut queue, &mut state, &backend, ui).await?;
    store.save_current(&state)?;
    Ok(())
}

fn cmd_sessions(action: SessionAction) -> Result<()> {
    let store = SessionStore::open()?;
    match action {
        SessionAction::List => {
            let sessions = store.list()?;
            if sessions.is_empty() {
                println!("No saved sessions.");
            }
            for session in sessions {
                println!(
                    "{:>4}  {}  {:20}  {}",
                    session.id,
                    session.saved_at.format("%Y-%m-%d %H:%M"),
                    session.name,
                    session.subject_name,
                );
            }
        }
        SessionAction::Save { name } => {
            let state = load_state(&store)?;
            let saved = store.save(&name, &state)?;
            println!("Saved session {} as {:?}.", saved.id, saved.name);
        }
        SessionAction::Load { id } => {
            let session = store.load(id)?;
            store.save_current(&session.state)?;
            println!("Loaded {:?}.", session.name);
        }
        SessionAction::Delete { id } => {
            store.delete(id)?;
            println!("Deleted session {}.", id);
        }
        SessionAction::Export { id, path } => {
            store.export(id, &path)?;
            println!("Exported session {} to {}.", id, path.display());
        }
        SessionAction::Import { path } => {
            let session = store.import(&path)?;
            println!("Imported {:?} as session {}.", session.name, session.id);
        }
    }
    Ok(())
}

fn cmd_settings(
    skill: Option<String>,
    theme: Option<String>,
    manual_art: Option<bool>,
    presentation_cards: Option<usize>,
    batch_size: Option<usize>,
    cooldown: Option<u64>,
) -> Result<()> {
    let store = SessionStore::open()?;
    let mut state = load_state(&store)?;
    let settings = &mut state.settings;

    if let Some(skill) = skill {
        settings.skill_level = skill.parse::<SkillLevel>()?;
    }
    if let Some(theme) = theme {
        settings.card_theme = match theme.to_lowercase().as_str() {
            "default" => CardTheme::Default,
            "official" => CardTheme::Official,
            other => return Err(anyhow!("unknown card theme: {}", other)),
        };
    }
    if let Some(manual_art) = manual_art {
        settings.manual_art_mode = manual_art;
    }
    if let Some(count) = presentation_cards {
        if count > 6 {
            return Err(anyhow!("presentation cards must be 0 to 6"));
        }
        settings.presentation_cards = count;
    }
    if let Some(batch_size) = batch_size {
        if batch_size == 0 {
            return Err(anyhow!("batch size must be at least 1"));
        }
        settings.batch_size = batch_size;
    }
    if let Some(cooldown) = cooldown {
        settings.cooldown_secs = cooldown;
    }

    println!("skill level:        {}", settings.skill_level);
    println!(
        "card theme:         {}",
        match settings.card_theme {
            CardTheme::Default => "default",
            CardTheme::Official => "official",
        }
    );
    println!("manual art mode:    {}", settings.manual_art_mode);
    println!("presentation cards: {}", settings.presentation_cards);
    println!("batch size:         {}", settings.batch_size);
    println!("batch cooldown:     {}s", settings.cooldown_secs);

    store.save_current(&state)?;
    Ok(())
}

/// Parse the `--difficulty` flag.
fn parse_difficulty(s: &str) -> Result<Difficulty> {
    match s.to_lowercase().as_str() {
        "easy" => Ok(Difficulty::Easy),
        "medium" => Ok(Difficulty::Medium),
        "hard" => Ok(Difficulty::Hard),
        "none" | "untimed" => Ok(Difficulty::Untimed),
        other => {
            let minutes = other
                .parse::<u64>()
                .map_err(|_| anyhow!("unknown difficulty: {}", other))?;
            Ok(Difficulty::Custom(minutes))
        }
    }
}

async fn cmd_duel(ui: &Ui, card_name: &str, difficulty: &str) -> Result<()> {
    let store = SessionStore::open()?;
    let state = load_state(&store)?;
    let difficulty = parse_difficulty(difficulty)?;
    let card = state
        .find_card(card_name)
        .cloned()
        .ok_or_else(|| anyhow!("{:?} is not in your decks", card_name))?;
    let subject = state
        .subject
        .clone()
        .ok_or_else(|| anyhow!("run a search before dueling"))?;

    let backend: Arc<dyn ContentBackend> = Arc::new(OpenAiBackend::new(ui.clone()));
    let mut duel = Duel::begin(
        backend.clone(),
        card,
        subject,
        state.settings.skill_level,
        difficulty,
    )
    .await?;

    println!("The trickster shuffles a deck of twelve and deals you four.");
    print_duel_turn(&mut duel);

    let mut idle = IdleWatcher::new(ART_IDLE_TIMEOUT);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let result = loop {
        print!("> ");
        use std::io::Write as _;
        std::io::stdout().flush()?;
        tokio::select! {
            _ = duel.expired() => {
                break duel.timed_out();
            }
            _ = idle.idle() => {
                let removed = backend.clear_art().await?;
                println!("(The arena grew cold; {} cached art entries faded.)", removed);
                continue;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    println!("The duel is abandoned.");
                    return Ok(());
                };
                idle.touch();
                duel.poll_art();
                if let Some(result) = duel_command(&mut duel, line.trim()).await? {
                    break result;
                }
            }
        }
    };
    println!("{}", result.message);

    if let Some(context) = duel.exercise_context() {
        if result.victory {
            println!("{}", context.explanation);
        }
        let mut history: Vec<ChatMessage> = Vec::new();
        println!("Ask the tutor about it, or press enter to finish.");
        loop {
            tokio::select! {
                _ = idle.idle() => {
                    let removed = backend.clear_art().await?;
                    println!("({} cached art entries faded.)", removed);
                }
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    let question = line.trim().to_owned();
                    if question.is_empty() {
                        break;
                    }
                    idle.touch();
                    history.push(ChatMessage::user(&question));
                    let reply = backend.follow_up(&context, &history).await?;
                    history.push(ChatMessage::tutor(&reply));
                    println!("{}", reply);
                }
            }
        }
    }
    Ok(())
}

/// Handle one duel command line. Returns the result once the duel ends.
async fn duel_command(
    duel: &mut Duel,
    line: &str,
) -> Result<Option<crate::duel::DuelResult>> {
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    match command {
        "play" => match duel.play_card(rest) {
            PlayOutcome::Revealed => {
                if let Some(card) = duel.hand().iter().find(|c| c.name == rest) {
                    print_card(card);
                }
                println!("Play it again to commit.");
            }
            PlayOutcome::Accepted => {
                println!("A worthy play. Now `answer` the blank.");
            }
            PlayOutcome::Strike { message } => {
                println!("{} ({} of 3)", message, duel.strikes());
            }
            PlayOutcome::Over(result) => return Ok(Some(result)),
            PlayOutcome::NotInHand => println!("That card is not in your hand."),
        },
        "answer" => {
            if matches!(duel.phase(), DuelPhase::Answering) {
                return Ok(Some(duel.submit_answer(rest)));
            }
            println!("Play the right card before answering.");
        }
        "draw" => {
            if let Some(message) = duel.draw() {
                println!("{}", message);
            } else {
                print_duel_hand(duel);
            }
        }
        "skip" => {
            if let Some(result) = duel.skip().await {
                return Ok(Some(result));
            }
            print_duel_turn(duel);
        }
        "hand" => print_duel_hand(duel),
        "time" => match duel.remaining_secs() {
            Some(secs) => println!("{}s on the clock.", secs),
            None => println!("This duel is untimed."),
        },
        "quit" => {
            return Ok(Some(crate::duel::DuelResult {
                victory: false,
                message: "The duel is abandoned.".to_owned(),
            }))
        }
        _ => println!(
            "Commands: play <card>, answer <text>, draw, skip, hand, time, quit"
        ),
    }
    Ok(None)
}

fn print_duel_turn(duel: &mut Duel) {
    if let Some(notice) = duel.take_notice() {
        println!("{}", notice);
    }
    if let Some(challenge) = duel.challenge() {
        println!("The trickster poses:\n{}", challenge.snippet());
    }
    print_duel_hand(duel);
}

fn print_duel_hand(duel: &Duel) {
    println!("Your hand ({} in the library):", duel.library_len());
    for card in duel.hand() {
        print_card(card);
    }
}

async fn cmd_trial(ui: &Ui, card_name: &str, quiz: bool) -> Result<()> {
    let store = SessionStore::open()?;
    let state = load_state(&store)?;
    let card = state
        .find_card(card_name)
        .cloned()
        .ok_or_else(|| anyhow!("{:?} is not in your decks", card_name))?;
    let backend: Arc<dyn ContentBackend> = Arc::new(OpenAiBackend::new(ui.clone()));

    let mut trial = if quiz {
        Trial::quiz(backend.clone(), card).await?
    } else {
        Trial::syntax(backend.clone(), card).await?
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let exercise = trial.exercise().clone();
    let outcome = match &exercise {
        TrialExercise::Quiz(quiz) => {
            println!("{}", quiz.question);
            for (i, option) in quiz.options.iter().enumerate() {
                println!("  {}) {}", i + 1, option);
            }
            println!("Answer with a number:");
            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };
            let index = line
                .trim()
                .parse::<usize>()
                .map_err(|_| anyhow!("answer with an option number"))?;
            trial.answer_quiz(index.saturating_sub(1))
        }
        TrialExercise::Syntax(exercise) => {
            println!("Fill in the blank:\n{}", exercise.snippet);
            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };
            trial.answer_syntax(line.trim())
        }
    };
    println!("{}", outcome.message);

    let mut idle = IdleWatcher::new(ART_IDLE_TIMEOUT);
    println!("Ask the tutor about it, or press enter to finish.");
    loop {
        tokio::select! {
            _ = idle.idle() => {
                let removed = backend.clear_art().await?;
                println!("({} cached art entries faded.)", removed);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let question = line.trim().to_owned();
                if question.is_empty() {
                    break;
                }
                idle.touch();
                let reply = trial.ask(&question).await?;
                println!("{}", reply);
            }
        }
    }
    Ok(())
}
