use std::time::Duration;

use async_trait::async_trait;
use duel_core::{GeneratedWord, WordListSource, WordSource, WordSourceError};
use duel_types::{AssistKind, BattleId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct RoundWordRequest {
    battle_id: BattleId,
    round_index: u32,
}

#[derive(Deserialize)]
struct RoundWordResponse {
    word: String,
    hint_text: Option<String>,
    clue_text: Option<String>,
}

#[derive(Serialize)]
struct AssistRequest<'a> {
    word: &'a str,
    kind: AssistKind,
}

#[derive(Deserialize)]
struct AssistResponse {
    text: String,
}

/// Word generation service reached over HTTP, backed by a local word list
/// when the service is down or returns something unusable.
pub struct HttpWordSource {
    client: reqwest::Client,
    base_url: String,
    fallback: WordListSource,
}

impl HttpWordSource {
    pub fn new(base_url: impl Into<String>, fallback: WordListSource) -> Result<Self, WordSourceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WordSourceError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fallback,
        })
    }

    async fn fetch_round_word(
        &self,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<GeneratedWord, WordSourceError> {
        let response = self
            .client
            .post(format!("{}/round-word", self.base_url))
            .json(&RoundWordRequest {
                battle_id,
                round_index,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WordSourceError::Unavailable(e.to_string()))?;

        let body: RoundWordResponse = response
            .json()
            .await
            .map_err(|e| WordSourceError::InvalidResponse(e.to_string()))?;

        let word = body.word.trim().to_lowercase();
        if word.is_empty() {
            return Err(WordSourceError::Empty);
        }
        if !WordListSource::is_alphabetic(&word) {
            return Err(WordSourceError::InvalidResponse(format!(
                "not a playable word: {word}"
            )));
        }

        Ok(GeneratedWord {
            word,
            hint_text: body.hint_text.filter(|t| !t.trim().is_empty()),
            clue_text: body.clue_text.filter(|t| !t.trim().is_empty()),
        })
    }
}

#[async_trait]
impl WordSource for HttpWordSource {
    async fn round_word(
        &self,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<GeneratedWord, WordSourceError> {
        match self.fetch_round_word(battle_id, round_index).await {
            Ok(word) => {
                debug!("Word service picked a word for battle {} round {}", battle_id, round_index);
                Ok(word)
            }
            Err(e) => {
                warn!("Word service failed ({}), using local word list", e);
                self.fallback.round_word(battle_id, round_index).await
            }
        }
    }

    async fn assist_text(&self, word: &str, kind: AssistKind) -> Result<String, WordSourceError> {
        let response = self
            .client
            .post(format!("{}/assist", self.base_url))
            .json(&AssistRequest { word, kind })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WordSourceError::Unavailable(e.to_string()))?;

        let body: AssistResponse = response
            .json()
            .await
            .map_err(|e| WordSourceError::InvalidResponse(e.to_string()))?;

        if body.text.trim().is_empty() {
            return Err(WordSourceError::Empty);
        }
        Ok(body.text)
    }
}
