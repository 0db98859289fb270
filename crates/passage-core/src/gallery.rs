//! Enrolled identity gallery and cosine matching.
//!
//! Read-mostly: concurrent probes share a read lock while occasional
//! `register` calls take the write lock, so a probe never observes a
//! half-appended embedding set. Linear scan is sufficient at the target
//! scale (tens to low thousands of identities).

use crate::types::{Embedding, Identity, MatchResult};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GalleryError {
    #[error("empty embedding vector")]
    InvalidInput,
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Strategy for comparing a probe embedding against enrolled identities.
pub trait Matcher {
    fn compare<'a, I>(&self, probe: &Embedding, identities: I, threshold: f32) -> MatchResult
    where
        I: IntoIterator<Item = &'a Identity>;
}

/// Cosine similarity matcher.
///
/// Always scores every embedding of every identity, no early exit. An
/// identity with multiple enrolled samples scores as its best sample;
/// ties between identities break toward the lowest id, so the result is
/// deterministic regardless of gallery iteration order.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare<'a, I>(&self, probe: &Embedding, identities: I, threshold: f32) -> MatchResult
    where
        I: IntoIterator<Item = &'a Identity>,
    {
        let mut best_score = f32::NEG_INFINITY;
        let mut best: Option<&Identity> = None;

        for identity in identities {
            let mut identity_score = f32::NEG_INFINITY;
            for embedding in &identity.embeddings {
                let sim = probe.similarity(embedding);
                if sim > identity_score {
                    identity_score = sim;
                }
            }

            let wins = identity_score > best_score
                || (identity_score == best_score
                    && best.is_some_and(|b| identity.id < b.id));
            if wins {
                best_score = identity_score;
                best = Some(identity);
            }
        }

        match best {
            Some(identity) if best_score >= threshold => MatchResult {
                matched: true,
                score: best_score,
                identity_id: Some(identity.id.clone()),
                display_name: Some(identity.display_name.clone()),
            },
            _ => MatchResult::no_match(if best_score == f32::NEG_INFINITY {
                0.0
            } else {
                best_score
            }),
        }
    }
}

/// Enrolled identities and their embeddings, keyed by external id.
pub struct Gallery {
    /// Embedding dimensionality every stored and probed vector must have.
    dim: usize,
    /// Cosine similarity threshold for a positive match.
    threshold: f32,
    identities: RwLock<HashMap<String, Identity>>,
}

impl Gallery {
    pub fn new(dim: usize, threshold: f32) -> Self {
        Self {
            dim,
            threshold,
            identities: RwLock::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn validate(&self, embedding: &Embedding) -> Result<(), GalleryError> {
        if embedding.values.is_empty() {
            return Err(GalleryError::InvalidInput);
        }
        if embedding.dim() != self.dim {
            return Err(GalleryError::DimensionMismatch {
                expected: self.dim,
                actual: embedding.dim(),
            });
        }
        Ok(())
    }

    /// Append an embedding to an identity, creating the identity if absent.
    ///
    /// The write lock makes the append visible atomically to concurrent
    /// probes.
    pub fn register(
        &self,
        id: &str,
        display_name: &str,
        embedding: Embedding,
    ) -> Result<(), GalleryError> {
        self.validate(&embedding)?;

        let mut identities = lock_write(&self.identities);
        match identities.get_mut(id) {
            Some(identity) => identity.embeddings.push(embedding),
            None => {
                identities.insert(
                    id.to_string(),
                    Identity {
                        id: id.to_string(),
                        display_name: display_name.to_string(),
                        embeddings: vec![embedding],
                    },
                );
            }
        }
        tracing::debug!(identity = id, total = identities.len(), "embedding registered");
        Ok(())
    }

    /// Remove an identity and all its embeddings. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        lock_write(&self.identities).remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        lock_read(&self.identities).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all enrolled identities.
    pub fn identities(&self) -> Vec<Identity> {
        lock_read(&self.identities).values().cloned().collect()
    }

    /// Match a probe against every enrolled embedding.
    ///
    /// An empty gallery yields a no-match with score 0.0. Malformed probes
    /// error out; callers in the frame loop log and degrade those to a
    /// no-match rather than aborting the stream.
    pub fn match_embedding(&self, probe: &Embedding) -> Result<MatchResult, GalleryError> {
        self.validate(probe)?;

        let identities = lock_read(&self.identities);
        Ok(CosineMatcher.compare(probe, identities.values(), self.threshold))
    }
}

// Lock poisoning only means a panicking holder; the map itself is always
// left consistent, so recover the guard instead of propagating the panic.
fn lock_read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn lock_write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
