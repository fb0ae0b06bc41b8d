//! Sentence and word segmentation.
//!
//! Sentences follow the Unicode sentence-boundary rules, so paragraph breaks
//! (the blank lines between chapters) always end a sentence. Words follow
//! the Unicode word rules, which already keep internal apostrophes
//! ("don't", "darcy's"); hyphenated compounds ("well-bred") are glued back
//! together here because UAX #29 splits them.

use std::iter::Peekable;
use unicode_segmentation::{UnicodeSegmentation, UnicodeWordIndices, USentenceBoundIndices};

/// A sentence with its position in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentence<'a> {
    pub index: usize,
    /// Byte offset of `text` in the document.
    pub start: usize,
    pub text: &'a str,
}

/// A word token inside a sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    /// Byte offset of `text` in its sentence.
    pub offset: usize,
}

impl Token<'_> {
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Segmenter;

impl Segmenter {
    /// Lazily split `text` into trimmed, non-empty sentences.
    /// Calling this again restarts from the beginning.
    pub fn sentences<'a>(&self, text: &'a str) -> Sentences<'a> {
        Sentences {
            inner: text.split_sentence_bound_indices(),
            next_index: 0,
        }
    }

    pub fn words<'a>(&self, sentence: &'a str) -> Words<'a> {
        Words {
            sentence,
            inner: sentence.unicode_word_indices().peekable(),
        }
    }
}

pub struct Sentences<'a> {
    inner: USentenceBoundIndices<'a>,
    next_index: usize,
}

impl<'a> Iterator for Sentences<'a> {
    type Item = Sentence<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for (start, raw) in self.inner.by_ref() {
            let trimmed = raw.trim_start();
            let lead = raw.len() - trimmed.len();
            let text = trimmed.trim_end();
            if text.is_empty() {
                continue;
            }
            let sentence = Sentence {
                index: self.next_index,
                start: start + lead,
                text,
            };
            self.next_index += 1;
            return Some(sentence);
        }
        None
    }
}

pub struct Words<'a> {
    sentence: &'a str,
    inner: Peekable<UnicodeWordIndices<'a>>,
}

impl<'a> Iterator for Words<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (start, first) = self.inner.next()?;
        let mut end = start + first.len();

        // Join `word-word` when the hyphen is the only thing between them.
        while let Some(&(next_start, next_word)) = self.inner.peek() {
            let gap = &self.sentence[end..next_start];
            if !is_joining_hyphen(gap) {
                break;
            }
            end = next_start + next_word.len();
            self.inner.next();
        }

        Some(Token {
            text: &self.sentence[start..end],
            offset: start,
        })
    }
}

fn is_joining_hyphen(gap: &str) -> bool {
    let mut chars = gap.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('-' | '\u{2010}' | '\u{2011}'), None)
    )
}

/// Whether a token can ever be reported: long enough, no digits, some letters.
pub fn is_vocabulary_token(token: &str, min_chars: usize) -> bool {
    token.chars().count() >= min_chars
        && !token.chars().any(|c| c.is_numeric())
        && token.chars().any(|c| c.is_alphabetic())
}
