//! Receive-side ratchet bookkeeping
//!
//! Three concerns live here:
//!
//! - Skip-ahead derivation: a receiver seeing message N+k (k within the skip
//!   window) derives and returns the keys for N..N+k in one pass, so the
//!   skipped ones can be cached for late arrivals.
//! - The skipped-key cache itself. Memory only, never persisted: a skipped
//!   message key that survives a restart would undercut forward secrecy.
//! - The replay window: highest delivered message number plus a sliding
//!   bitmap of the `REPLAY_WINDOW_BITS` numbers below it.

use std::{collections::HashMap, sync::Mutex};

use serde::{Deserialize, Serialize};

use vk_crypto::chain::{self, MessageKeys};

use crate::error::{E2eeError, ErrorKind};

/// Replay window width in bits. Matches the skip window; do not shrink
/// without a data migration.
pub const REPLAY_WINDOW_BITS: u32 = 1024;

const WORDS: usize = (REPLAY_WINDOW_BITS as usize) / 64;

// ── Skip-ahead derivation ────────────────────────────────────────────────────

/// Result of deriving keys for a message ahead of the expected counter.
pub struct ChainAdvance {
    /// Keys for the requested message number.
    pub keys: MessageKeys,
    /// Keys for the numbers that were jumped over, oldest first.
    pub skipped: Vec<(u32, MessageKeys)>,
    /// Chain key after consuming everything up to and including the target.
    pub new_chain_key: [u8; 32],
    /// Next expected message number after this advance.
    pub new_count: u32,
}

/// Walk the chain from `next_expected` up to message `n`.
///
/// `n` below `next_expected` is the caller's problem (skipped-key cache or
/// replay handling); `n` more than `skip_window` ahead is refused.
pub fn derive_for_number(
    chain_key: &[u8; 32],
    next_expected: u32,
    n: u32,
    skip_window: u32,
) -> Result<ChainAdvance, E2eeError> {
    if n < next_expected {
        return Err(E2eeError::new(ErrorKind::KeyDerivationError));
    }
    if n - next_expected > skip_window {
        return Err(E2eeError::new(ErrorKind::KeyDerivationError));
    }

    let mut ck = *chain_key;
    let mut skipped = Vec::new();
    for m in next_expected..n {
        skipped.push((m, chain::message_keys(&ck, m)?));
        ck = chain::advance(&ck)?;
    }
    let keys = chain::message_keys(&ck, n)?;
    let new_chain_key = chain::advance(&ck)?;

    Ok(ChainAdvance {
        keys,
        skipped,
        new_chain_key,
        new_count: n + 1,
    })
}

// ── Skipped-key cache ────────────────────────────────────────────────────────

/// In-memory cache of message keys for numbers that were jumped over,
/// keyed by (session id, message number).
#[derive(Default)]
pub struct SkippedKeys {
    map: Mutex<HashMap<(String, u32), MessageKeys>>,
}

impl SkippedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: &str, n: u32, keys: MessageKeys) {
        let mut map = self
            .map
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert((session_id.to_string(), n), keys);
    }

    /// Remove and return cached keys; each entry is usable exactly once.
    pub fn take(&self, session_id: &str, n: u32) -> Option<MessageKeys> {
        let mut map = self
            .map
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.remove(&(session_id.to_string(), n))
    }
}

// ── Replay window ────────────────────────────────────────────────────────────

/// Sliding-bitmap replay tracker, persisted as JSON alongside the session.
///
/// `highest` is the largest delivered message number (-1 before the first
/// delivery). Bit `i` of the map records delivery of `highest - i`, so the
/// window covers the `REPLAY_WINDOW_BITS` most recent numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayWindow {
    highest: i64,
    bits: Vec<u64>,
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self {
            highest: -1,
            bits: vec![0; WORDS],
        }
    }
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut w: ReplayWindow = serde_json::from_str(json)?;
        w.bits.resize(WORDS, 0);
        Ok(w)
    }

    pub fn highest_delivered(&self) -> Option<u32> {
        u32::try_from(self.highest).ok()
    }

    /// Number already recorded as delivered?
    pub fn contains(&self, n: u32) -> bool {
        let Some(offset) = self.offset_of(n) else {
            return false;
        };
        if offset >= REPLAY_WINDOW_BITS as usize {
            return false;
        }
        self.bits[offset / 64] & (1u64 << (offset % 64)) != 0
    }

    /// Number so far behind `highest` that it fell off the window?
    pub fn is_expired(&self, n: u32) -> bool {
        match self.offset_of(n) {
            Some(offset) => offset >= REPLAY_WINDOW_BITS as usize,
            None => false,
        }
    }

    /// Record delivery of `n`. Numbers already expired are ignored; the
    /// caller rejects those before marking.
    pub fn mark_delivered(&mut self, n: u32) {
        match self.offset_of(n) {
            None => {
                // New highest: slide the window forward.
                let shift = (i64::from(n) - self.highest) as u64;
                self.shift_up(shift);
                self.highest = i64::from(n);
                self.bits[0] |= 1;
            }
            Some(offset) if offset < REPLAY_WINDOW_BITS as usize => {
                self.bits[offset / 64] |= 1u64 << (offset % 64);
            }
            Some(_) => {}
        }
    }

    /// Distance below `highest`, or None when `n` is a new highest.
    fn offset_of(&self, n: u32) -> Option<usize> {
        let delta = self.highest - i64::from(n);
        usize::try_from(delta).ok()
    }

    fn shift_up(&mut self, shift: u64) {
        if shift >= u64::from(REPLAY_WINDOW_BITS) {
            self.bits.fill(0);
            return;
        }
        let word_shift = (shift / 64) as usize;
        let bit_shift = (shift % 64) as u32;
        for i in (0..WORDS).rev() {
            let mut word = if i >= word_shift {
                self.bits[i - word_shift] << bit_shift
            } else {
                0
            };
            if bit_shift > 0 && i > word_shift {
                word |= self.bits[i - word_shift - 1] >> (64 - bit_shift);
            }
            self.bits[i] = word;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_ahead_yields_target_and_skipped_keys() {
        let ck = [5u8; 32];
        let advance = derive_for_number(&ck, 0, 3, 1024).unwrap();
        assert_eq!(advance.new_count, 4);
        assert_eq!(advance.skipped.len(), 3);
        assert_eq!(advance.skipped[0].0, 0);
        assert_eq!(advance.skipped[2].0, 2);
        assert_ne!(advance.keys.enc_key, advance.skipped[2].1.enc_key);
    }

    #[test]
    fn skip_ahead_matches_stepwise_derivation() {
        let ck = [5u8; 32];
        // Step one message at a time
        let step0 = derive_for_number(&ck, 0, 0, 1024).unwrap();
        let step1 = derive_for_number(&step0.new_chain_key, 1, 1, 1024).unwrap();
        // Jump straight to 1
        let jump = derive_for_number(&ck, 0, 1, 1024).unwrap();
        assert_eq!(jump.keys.enc_key, step1.keys.enc_key);
        assert_eq!(jump.skipped[0].1.enc_key, step0.keys.enc_key);
    }

    #[test]
    fn beyond_skip_window_is_refused() {
        let ck = [5u8; 32];
        assert!(derive_for_number(&ck, 0, 1025, 1024).is_err());
        assert!(derive_for_number(&ck, 0, 1024, 1024).is_ok());
    }

    #[test]
    fn behind_expected_counter_is_refused() {
        let ck = [5u8; 32];
        assert!(derive_for_number(&ck, 5, 4, 1024).is_err());
    }

    #[test]
    fn skipped_cache_is_take_once() {
        let cache = SkippedKeys::new();
        let ck = [5u8; 32];
        let advance = derive_for_number(&ck, 0, 1, 1024).unwrap();
        let (n, keys) = advance.skipped.into_iter().next().unwrap();
        cache.insert("s1", n, keys);
        assert!(cache.take("s1", n).is_some());
        assert!(cache.take("s1", n).is_none());
    }

    #[test]
    fn replay_window_basic_marking() {
        let mut w = ReplayWindow::new();
        assert!(!w.contains(0));
        w.mark_delivered(0);
        assert!(w.contains(0));
        w.mark_delivered(5);
        assert!(w.contains(5));
        assert!(w.contains(0));
        assert!(!w.contains(3));
        w.mark_delivered(3);
        assert!(w.contains(3));
        assert_eq!(w.highest_delivered(), Some(5));
    }

    #[test]
    fn replay_window_expires_old_numbers() {
        let mut w = ReplayWindow::new();
        w.mark_delivered(0);
        w.mark_delivered(2000);
        assert!(w.is_expired(0));
        assert!(!w.contains(0));
        assert!(!w.is_expired(1500));
    }

    #[test]
    fn replay_window_survives_json_roundtrip() {
        let mut w = ReplayWindow::new();
        w.mark_delivered(7);
        w.mark_delivered(9);
        let back = ReplayWindow::from_json(&w.to_json().unwrap()).unwrap();
        assert!(back.contains(7));
        assert!(back.contains(9));
        assert!(!back.contains(8));
    }

    #[test]
    fn shift_across_word_boundaries_keeps_bits() {
        let mut w = ReplayWindow::new();
        w.mark_delivered(10);
        // Slide by 100 bits (crosses a word boundary)
        w.mark_delivered(110);
        assert!(w.contains(10));
        assert!(w.contains(110));
        assert!(!w.contains(60));
    }
}
