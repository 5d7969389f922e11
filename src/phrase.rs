use crate::encoder::{encode, SymbolSequence};
use crate::error::{BroadcastError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A submitted phrase, encoded once at creation and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phrase {
    /// Text exactly as submitted.
    pub original_text: String,
    /// Output of the translation capability; this is what gets encoded.
    pub translated_text: String,
    /// Code-string rendering of `symbols`.
    pub encoded_text: String,
    pub symbols: SymbolSequence,
    pub submitted_at: DateTime<Utc>,
}

impl Phrase {
    /// Encode `translated` and build a phrase. Fails when nothing is playable.
    pub fn new(original: &str, translated: &str, submitted_at: DateTime<Utc>) -> Result<Self> {
        let symbols = encode(translated);
        if symbols.is_empty() {
            return Err(BroadcastError::EncodingEmpty);
        }
        Ok(Phrase {
            original_text: original.to_string(),
            translated_text: translated.to_string(),
            encoded_text: symbols.to_string(),
            symbols,
            submitted_at,
        })
    }

    /// A permanent phrase that was never translated.
    pub fn system(text: &str) -> Result<Self> {
        Phrase::new(text, text, DateTime::<Utc>::default())
    }
}

/// System phrases followed by stored phrases, joined by word gaps.
///
/// Always rebuilt from the store; `revision` says which store state it came from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BroadcastSequence {
    symbols: SymbolSequence,
    phrase_count: usize,
    revision: u64,
}

impl BroadcastSequence {
    pub fn from_phrases<'a, I>(phrases: I, revision: u64) -> Self
    where
        I: IntoIterator<Item = &'a Phrase>,
    {
        let phrases: Vec<&Phrase> = phrases.into_iter().collect();
        BroadcastSequence {
            symbols: SymbolSequence::join(phrases.iter().map(|p| &p.symbols)),
            phrase_count: phrases.len(),
            revision,
        }
    }

    pub fn symbols(&self) -> &SymbolSequence {
        &self.symbols
    }

    /// The symbols, or `EmptySequence` when there is nothing to play.
    pub fn playable(&self) -> Result<&SymbolSequence> {
        if self.symbols.is_empty() {
            Err(BroadcastError::EmptySequence)
        } else {
            Ok(&self.symbols)
        }
    }

    /// Code-string rendering used by the scroll trace.
    pub fn code_text(&self) -> String {
        self.symbols.to_string()
    }

    pub fn phrase_count(&self) -> usize {
        self.phrase_count
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Anything a channel can read a fresh broadcast from.
pub trait SequenceSource {
    fn broadcast_sequence(&self) -> BroadcastSequence;
}
