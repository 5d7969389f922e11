//! Text to timing symbols.
//!
//! Letters and digits map through the fixed ITU table; everything else is
//! dropped. Literal spaces separate words.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One timing symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    /// Short mark (dit).
    Short,
    /// Long mark (dah).
    Long,
    /// Gap between letters of a word.
    Gap,
    /// Gap between words.
    WordGap,
}

impl Symbol {
    /// True for the audible/visible "on" symbols.
    pub fn is_mark(self) -> bool {
        matches!(self, Symbol::Short | Symbol::Long)
    }

    /// Character used in the code-string rendering.
    pub fn as_char(self) -> char {
        match self {
            Symbol::Short => '.',
            Symbol::Long => '-',
            Symbol::Gap => ' ',
            Symbol::WordGap => '/',
        }
    }
}

/// Ordered symbol list produced by [`encode`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolSequence(Vec<Symbol>);

impl SymbolSequence {
    pub fn new() -> Self {
        SymbolSequence(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[Symbol] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Symbol> {
        self.0.iter()
    }

    /// Number of marks (Short + Long), i.e. how many tones the sequence plays.
    pub fn mark_count(&self) -> usize {
        self.0.iter().filter(|s| s.is_mark()).count()
    }

    /// Join sequences with a single word gap, skipping empty parts.
    pub fn join<'a, I>(parts: I) -> SymbolSequence
    where
        I: IntoIterator<Item = &'a SymbolSequence>,
    {
        let mut out = Vec::new();
        for part in parts {
            if part.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push(Symbol::WordGap);
            }
            out.extend_from_slice(&part.0);
        }
        SymbolSequence(out)
    }
}

impl FromIterator<Symbol> for SymbolSequence {
    fn from_iter<T: IntoIterator<Item = Symbol>>(iter: T) -> Self {
        SymbolSequence(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SymbolSequence {
    type Item = &'a Symbol;
    type IntoIter = std::slice::Iter<'a, Symbol>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Renders the code string: `... --- ... / .- -...`
impl fmt::Display for SymbolSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for symbol in &self.0 {
            match symbol {
                Symbol::WordGap => f.write_str(" / ")?,
                other => write!(f, "{}", other.as_char())?,
            }
        }
        Ok(())
    }
}

/// Parse a code string back into symbols.
///
/// `.` `-` ` ` `/` are recognised; any other character is skipped. Spaces
/// around a `/` belong to the word gap and are not kept as letter gaps.
pub fn parse_code(code: &str) -> SymbolSequence {
    let mut out: Vec<Symbol> = Vec::new();
    let mut after_word_gap = false;
    for c in code.chars() {
        match c {
            '.' => {
                out.push(Symbol::Short);
                after_word_gap = false;
            }
            '-' => {
                out.push(Symbol::Long);
                after_word_gap = false;
            }
            ' ' => {
                if !after_word_gap {
                    out.push(Symbol::Gap);
                }
            }
            '/' => {
                while out.last() == Some(&Symbol::Gap) {
                    out.pop();
                }
                out.push(Symbol::WordGap);
                after_word_gap = true;
            }
            _ => {}
        }
    }
    SymbolSequence(out)
}

/// Dot/dash pattern for a character, case-insensitive. `None` when unmapped.
pub fn code_for(c: char) -> Option<&'static str> {
    let code = match c.to_ascii_uppercase() {
        'A' => ".-",
        'B' => "-...",
        'C' => "-.-.",
        'D' => "-..",
        'E' => ".",
        'F' => "..-.",
        'G' => "--.",
        'H' => "....",
        'I' => "..",
        'J' => ".---",
        'K' => "-.-",
        'L' => ".-..",
        'M' => "--",
        'N' => "-.",
        'O' => "---",
        'P' => ".--.",
        'Q' => "--.-",
        'R' => ".-.",
        'S' => "...",
        'T' => "-",
        'U' => "..-",
        'V' => "...-",
        'W' => ".--",
        'X' => "-..-",
        'Y' => "-.--",
        'Z' => "--..",
        '0' => "-----",
        '1' => ".----",
        '2' => "..---",
        '3' => "...--",
        '4' => "....-",
        '5' => ".....",
        '6' => "-....",
        '7' => "--...",
        '8' => "---..",
        '9' => "----.",
        _ => return None,
    };
    Some(code)
}

/// Encode text into a symbol sequence.
///
/// Words with no mappable characters are dropped entirely, so the result
/// never holds two word gaps in a row and is empty for blank input.
pub fn encode(text: &str) -> SymbolSequence {
    let mut out = Vec::new();
    for word in text.split(' ') {
        let letters: Vec<&str> = word.chars().filter_map(code_for).collect();
        if letters.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(Symbol::WordGap);
        }
        for (i, letter) in letters.iter().enumerate() {
            if i > 0 {
                out.push(Symbol::Gap);
            }
            out.extend(letter.chars().map(|c| if c == '.' { Symbol::Short } else { Symbol::Long }));
        }
    }
    SymbolSequence(out)
}
