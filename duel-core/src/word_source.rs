use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use duel_types::{AssistKind, BattleId};
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WordSourceError {
    #[error("word source unavailable: {0}")]
    Unavailable(String),
    #[error("word source returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("no words available")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedWord {
    pub word: String,
    pub hint_text: Option<String>,
    pub clue_text: Option<String>,
}

/// Supplies the word for each round and, on demand, assist text for it.
#[async_trait]
pub trait WordSource: Send + Sync {
    async fn round_word(
        &self,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<GeneratedWord, WordSourceError>;

    async fn assist_text(&self, word: &str, kind: AssistKind) -> Result<String, WordSourceError>;
}

pub fn fallback_assist_text(kind: AssistKind) -> String {
    match kind {
        AssistKind::Hint => "No hint available for this word".to_string(),
        AssistKind::Clue => "No clue available for this word".to_string(),
        AssistKind::InviteFriend => "Ask a friend for a suggestion".to_string(),
    }
}

const FALLBACK_WORDS: &[&str] = &["ocean", "planet", "garden", "bridge", "candle", "forest"];

/// Last-resort word when no source can answer. Deterministic per round.
pub fn fallback_round_word(battle_id: BattleId, round_index: u32) -> GeneratedWord {
    let index = pick_index(battle_id, round_index, FALLBACK_WORDS.len());
    GeneratedWord {
        word: FALLBACK_WORDS[index].to_string(),
        hint_text: None,
        clue_text: None,
    }
}

fn pick_index(battle_id: BattleId, round_index: u32, len: usize) -> usize {
    let mut hasher = Sha256::new();
    hasher.update(battle_id.as_bytes());
    hasher.update(round_index.to_be_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % len.max(1) as u64) as usize
}

/// Word list loaded from `word|hint|clue` lines.
///
/// The pick for a round depends only on `(battle_id, round_index)`, so every
/// server process agrees on the word.
#[derive(Debug, Clone)]
pub struct WordListSource {
    entries: Vec<GeneratedWord>,
}

impl WordListSource {
    pub fn from_word_list(word_list: &str) -> Self {
        let entries = word_list
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let mut parts = line.split('|').map(str::trim);
                let word = parts.next()?.to_lowercase();
                if word.is_empty() || !Self::is_alphabetic(&word) {
                    tracing::debug!("Skipping word list entry {:?}", line);
                    return None;
                }
                let non_empty = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_string);
                Some(GeneratedWord {
                    word,
                    hint_text: non_empty(parts.next()),
                    clue_text: non_empty(parts.next()),
                })
            })
            .collect();

        Self { entries }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read word list {}", path.display()))?;
        let source = Self::from_word_list(&contents);
        if source.is_empty() {
            return Err(anyhow!("word list {} has no usable words", path.display()));
        }
        tracing::info!("Loaded {} words from {}", source.len(), path.display());
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pick(&self, battle_id: BattleId, round_index: u32) -> Option<&GeneratedWord> {
        if self.entries.is_empty() {
            return None;
        }
        self.entries
            .get(pick_index(battle_id, round_index, self.entries.len()))
    }

    /// Check if word contains only alphabetic characters
    pub fn is_alphabetic(word: &str) -> bool {
        word.chars().all(|c| c.is_alphabetic())
    }
}

#[async_trait]
impl WordSource for WordListSource {
    async fn round_word(
        &self,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<GeneratedWord, WordSourceError> {
        self.pick(battle_id, round_index)
            .cloned()
            .ok_or(WordSourceError::Empty)
    }

    async fn assist_text(&self, word: &str, kind: AssistKind) -> Result<String, WordSourceError> {
        let word = word.trim().to_lowercase();
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.word == word)
            .ok_or_else(|| WordSourceError::InvalidResponse(format!("unknown word {word}")))?;

        let text = match kind {
            AssistKind::Hint => entry.hint_text.clone(),
            AssistKind::Clue => entry.clue_text.clone(),
            AssistKind::InviteFriend => None,
        };
        text.ok_or_else(|| WordSourceError::Unavailable(format!("no {kind} text for {word}")))
    }
}
