//! Append-only list of broadcast phrases.
//!
//! System phrases come first and are fixed for the life of the store;
//! submitted phrases follow in insertion order.

use crate::error::{BroadcastError, Result};
use crate::persistence::Persistence;
use crate::phrase::{BroadcastSequence, Phrase, SequenceSource};
use chrono::Utc;
use tracing::{info, warn};

/// Translation capability applied to submitted text before encoding.
pub trait Translator {
    fn translate(&self, text: &str) -> std::result::Result<String, String>;
}

/// Leaves text untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

impl Translator for IdentityTranslator {
    fn translate(&self, text: &str) -> std::result::Result<String, String> {
        Ok(text.to_string())
    }
}

/// Trims and upper-cases, the form the code table is written in.
#[derive(Debug, Clone, Copy, Default)]
pub struct UppercaseTranslator;

impl Translator for UppercaseTranslator {
    fn translate(&self, text: &str) -> std::result::Result<String, String> {
        Ok(text.trim().to_uppercase())
    }
}

#[derive(Debug, Default)]
pub struct PhraseStore {
    system: Vec<Phrase>,
    phrases: Vec<Phrase>,
    revision: u64,
}

impl PhraseStore {
    /// Build a store with the given permanent phrases. Unplayable ones are dropped.
    pub fn new<S: AsRef<str>>(system_texts: &[S]) -> Self {
        let system = system_texts
            .iter()
            .filter_map(|text| match Phrase::system(text.as_ref()) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(text = text.as_ref(), "dropping system phrase: {}", e);
                    None
                }
            })
            .collect();
        PhraseStore {
            system,
            phrases: Vec::new(),
            revision: 0,
        }
    }

    /// Restore previously persisted phrases. Does not persist again.
    pub fn load(&mut self, phrases: Vec<Phrase>) {
        self.phrases = phrases;
        self.revision += 1;
    }

    /// Translate, encode, append and persist a new phrase.
    ///
    /// Translation and encoding failures leave the store untouched. A failed
    /// save is logged; the phrase stays in memory.
    pub fn submit(
        &mut self,
        text: &str,
        translator: &dyn Translator,
        persistence: &mut dyn Persistence,
    ) -> Result<Phrase> {
        let translated = translator
            .translate(text)
            .map_err(BroadcastError::TranslationFailed)?;
        let phrase = Phrase::new(text, &translated, Utc::now())?;

        self.phrases.push(phrase.clone());
        self.revision += 1;
        info!(
            encoded = %phrase.encoded_text,
            count = self.phrases.len(),
            "phrase added"
        );

        if let Err(e) = persistence.save_phrases(&self.phrases) {
            warn!("could not persist phrases: {}", e);
        }
        Ok(phrase)
    }

    /// Submitted phrases, oldest first.
    pub fn phrases(&self) -> &[Phrase] {
        &self.phrases
    }

    pub fn system_phrases(&self) -> &[Phrase] {
        &self.system
    }

    /// Number of submitted phrases.
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Bumped on every change; stamped into each `BroadcastSequence`.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

impl SequenceSource for PhraseStore {
    fn broadcast_sequence(&self) -> BroadcastSequence {
        BroadcastSequence::from_phrases(self.system.iter().chain(self.phrases.iter()), self.revision)
    }
}
