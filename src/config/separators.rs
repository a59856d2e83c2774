// src/config/separators.rs

use std::fmt;

/// Byte-indexed lookup of the characters chunk cuts may land after.
///
/// Only ASCII characters are accepted: a cut placed right after an ASCII
/// byte can never fall inside a multi-byte UTF-8 sequence.
#[derive(Clone, PartialEq, Eq)]
pub struct SeparatorSet {
    table: [bool; 256],
    count: usize,
}

impl SeparatorSet {
    pub fn empty() -> Self {
        Self {
            table: [false; 256],
            count: 0,
        }
    }

    /// Build the set from a string, returning the set and every non-ASCII
    /// character that had to be dropped.
    pub fn from_ascii(chars: &str) -> (Self, Vec<char>) {
        let mut set = Self::empty();
        let mut rejected = Vec::new();
        for ch in chars.chars() {
            if ch.is_ascii() {
                set.insert(ch as u8);
            } else {
                rejected.push(ch);
            }
        }
        (set, rejected)
    }

    pub fn insert(&mut self, byte: u8) {
        let slot = &mut self.table[byte as usize];
        if !*slot {
            *slot = true;
            self.count += 1;
        }
    }

    #[inline]
    pub fn contains(&self, byte: u8) -> bool {
        self.table[byte as usize]
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Offset of the last separator byte in `bytes`, scanning backward.
    pub fn rfind(&self, bytes: &[u8]) -> Option<usize> {
        bytes.iter().rposition(|&b| self.contains(b))
    }
}

impl Default for SeparatorSet {
    fn default() -> Self {
        Self::from_ascii(super::DEFAULT_SEPARATORS).0
    }
}

impl fmt::Debug for SeparatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes: String = (0u8..=127)
            .filter(|b| self.contains(*b))
            .map(|b| (b as char).escape_default().to_string())
            .collect();
        f.debug_struct("SeparatorSet")
            .field("count", &self.count)
            .field("bytes", &bytes)
            .finish()
    }
}
