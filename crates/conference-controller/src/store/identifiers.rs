//! Human-facing conference identifiers.
//!
//! A live conference is reachable through two keys besides its session ID:
//!
//! - a [`Slug`], the normalised conference name used in URLs
//! - a [`JoinCode`], a fixed-length numeric code typed on a phone keypad
//!
//! [`IdentifierRegistry`] maps either key to a session and never binds one
//! key to two sessions. Join codes are drawn from a CSPRNG so they cannot be
//! enumerated.

use crate::errors::CcError;
use common::types::SessionId;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Longest slug accepted after normalisation.
pub const MAX_SLUG_LENGTH: usize = 64;

/// Colliding draws before a small code space is scanned instead.
const SCAN_AFTER_ATTEMPTS: usize = 64;

/// Code spaces up to this size are scanned for a free code once random
/// draws keep colliding. Larger spaces keep drawing.
const EXHAUSTIVE_SCAN_LIMIT: u32 = 100_000;

/// Normalised conference name.
///
/// Lowercase ASCII alphanumerics separated by single hyphens.
/// "River Otter!" and "river-otter" are the same slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Normalise a display name into a slug.
    ///
    /// # Errors
    ///
    /// Returns `CcError::BadRequest` if nothing alphanumeric is left or the
    /// result exceeds [`MAX_SLUG_LENGTH`].
    pub fn from_name(name: &str) -> Result<Self, CcError> {
        let mut slug = String::with_capacity(name.len());
        let mut pending_separator = false;

        for c in name.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_separator && !slug.is_empty() {
                    slug.push('-');
                }
                pending_separator = false;
                slug.push(c.to_ascii_lowercase());
            } else {
                pending_separator = true;
            }
        }

        if slug.is_empty() {
            return Err(CcError::BadRequest(
                "Conference name must contain at least one letter or digit".to_string(),
            ));
        }

        if slug.len() > MAX_SLUG_LENGTH {
            return Err(CcError::BadRequest(format!(
                "Conference name must not exceed {MAX_SLUG_LENGTH} characters"
            )));
        }

        Ok(Self(slug))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric join code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JoinCode(String);

impl JoinCode {
    /// Extract a join code from keypad input.
    ///
    /// Keeps the digits and drops everything else (`#`, `*`, spaces).
    /// Returns `None` if no digit was entered.
    pub fn from_digits(input: &str) -> Option<Self> {
        let digits: String = input.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            None
        } else {
            Some(Self(digits))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mapping from a human-facing key to the session it currently addresses.
#[derive(Debug)]
pub struct IdentifierRegistry<K> {
    bindings: HashMap<K, SessionId>,
}

impl<K> Default for IdentifierRegistry<K> {
    fn default() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> IdentifierRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session currently bound to `key`.
    pub fn resolve(&self, key: &K) -> Option<&SessionId> {
        self.bindings.get(key)
    }

    /// Bind `key` to `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `CcError::Conflict` if the key is bound to a different
    /// session. Rebinding to the same session is a no-op.
    pub fn bind(&mut self, key: K, session_id: SessionId) -> Result<(), CcError> {
        match self.bindings.get(&key) {
            Some(existing) if *existing != session_id => Err(CcError::Conflict(
                "Identifier already bound to another conference".to_string(),
            )),
            Some(_) => Ok(()),
            None => {
                self.bindings.insert(key, session_id);
                Ok(())
            }
        }
    }

    /// Remove the binding for `key`, returning the session it pointed at.
    pub fn unbind(&mut self, key: &K) -> Option<SessionId> {
        self.bindings.remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.bindings.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Draws unpredictable, zero-padded numeric join codes.
pub struct JoinCodeGenerator {
    length: u32,
    space: u32,
    rng: SystemRandom,
}

impl JoinCodeGenerator {
    /// Create a generator for codes of `length` digits (1-9).
    ///
    /// # Errors
    ///
    /// Returns `CcError::Internal` for a length outside 1-9.
    pub fn new(length: u32) -> Result<Self, CcError> {
        let space = match length {
            1..=9 => 10u32.pow(length),
            _ => {
                return Err(CcError::Internal(format!(
                    "join code length {length} out of range"
                )))
            }
        };

        Ok(Self {
            length,
            space,
            rng: SystemRandom::new(),
        })
    }

    /// Number of distinct codes of the configured length.
    pub fn capacity(&self) -> u32 {
        self.space
    }

    /// Draw one code uniformly from the code space.
    ///
    /// # Errors
    ///
    /// Returns `CcError::Internal` if the system RNG fails.
    pub fn draw(&self) -> Result<JoinCode, CcError> {
        let value = self.uniform_below(self.space)?;
        Ok(self.format(value))
    }

    fn format(&self, value: u32) -> JoinCode {
        let width = self.length as usize;
        JoinCode(format!("{value:0width$}"))
    }

    /// Uniform value in `0..bound` by rejection sampling.
    fn uniform_below(&self, bound: u32) -> Result<u32, CcError> {
        // Reject draws above the largest multiple of `bound` to avoid modulo bias.
        let zone = u32::MAX - (u32::MAX % bound);
        loop {
            let mut bytes = [0u8; 4];
            self.rng.fill(&mut bytes).map_err(|_| {
                tracing::error!(target: "cc.store.identifiers", "RNG failure generating join code");
                CcError::Internal("RNG failure".to_string())
            })?;

            let value = u32::from_le_bytes(bytes);
            if value < zone {
                return Ok(value % bound);
            }
        }
    }

    /// Draw a code for which `is_taken` is false.
    ///
    /// `in_use` is the number of codes `is_taken` rejects. While it is below
    /// the capacity a free code exists, so drawing continues until one turns
    /// up. Small spaces switch to picking among the free codes directly.
    ///
    /// # Errors
    ///
    /// Returns `CcError::CapacityExceeded` when every code is taken.
    pub fn allocate(
        &self,
        in_use: usize,
        is_taken: impl Fn(&JoinCode) -> bool,
    ) -> Result<JoinCode, CcError> {
        if in_use as u64 >= u64::from(self.space) {
            return Err(CcError::CapacityExceeded(format!(
                "all {} join codes are in use",
                self.space
            )));
        }

        let mut attempts = 0usize;
        loop {
            let code = self.draw()?;
            if !is_taken(&code) {
                return Ok(code);
            }

            attempts += 1;
            if attempts >= SCAN_AFTER_ATTEMPTS && self.space <= EXHAUSTIVE_SCAN_LIMIT {
                return self.pick_free(&is_taken);
            }
        }
    }

    /// Uniform pick among every free code.
    fn pick_free(&self, is_taken: &impl Fn(&JoinCode) -> bool) -> Result<JoinCode, CcError> {
        let free: Vec<JoinCode> = (0..self.space)
            .map(|value| self.format(value))
            .filter(|code| !is_taken(code))
            .collect();

        let count = u32::try_from(free.len())
            .map_err(|_| CcError::Internal("join code space too large".to_string()))?;
        if count == 0 {
            return Err(CcError::CapacityExceeded(
                "no free join code found".to_string(),
            ));
        }

        let index = self.uniform_below(count)? as usize;
        free.into_iter().nth(index).ok_or_else(|| {
            CcError::Internal("join code index out of range".to_string())
        })
    }
}
