mod beam_search;

pub use beam_search::{beam_search, NextTokenLogits};

use crate::error::GenerationError;
use std::sync::Arc;

/// Length budget and search breadth for one generation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationConfig {
    pub name: &'static str,
    /// Upper bound on the output sequence length, start token included.
    pub max_length: usize,
    pub beam_width: usize,
}

impl GenerationConfig {
    pub const SHORT: GenerationConfig = GenerationConfig {
        name: "short",
        max_length: 16,
        beam_width: 4,
    };

    pub const LONG: GenerationConfig = GenerationConfig {
        name: "long",
        max_length: 64,
        beam_width: 4,
    };

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.beam_width == 0 {
            return Err(GenerationError::InvalidConfig {
                name: self.name,
                reason: "beam width must be at least 1".to_string(),
            });
        }
        if self.max_length == 0 {
            return Err(GenerationError::InvalidConfig {
                name: self.name,
                reason: "max length must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Scores may mask tokens with `-inf`, but never contain NaN or `+inf` and
/// always leave at least one token reachable.
pub(crate) fn check_logits(scores: &[f32], step: usize) -> Result<(), GenerationError> {
    let poisoned = scores.iter().any(|s| s.is_nan() || *s == f32::INFINITY);
    let reachable = scores.iter().any(|s| s.is_finite());
    if poisoned || !reachable {
        return Err(GenerationError::NonFiniteLogits { step });
    }
    Ok(())
}

/// Chosen tokens of one pass plus the raw score vector each generated token
/// was picked from. `step_scores[i]` belongs to `tokens[i + 1]`.
#[derive(Debug, Clone)]
pub struct GenerationTrace {
    tokens: Vec<u32>,
    step_scores: Vec<Arc<[f32]>>,
}

impl GenerationTrace {
    pub fn new(tokens: Vec<u32>, step_scores: Vec<Arc<[f32]>>) -> Result<Self, GenerationError> {
        if tokens.is_empty() {
            return Err(GenerationError::MalformedTrace(
                "sequence must start with a start token".to_string(),
            ));
        }
        if step_scores.len() != tokens.len() - 1 {
            return Err(GenerationError::MalformedTrace(format!(
                "{} tokens need {} score vectors, got {}",
                tokens.len(),
                tokens.len() - 1,
                step_scores.len()
            )));
        }
        for (step, scores) in step_scores.iter().enumerate() {
            let token = tokens[step + 1] as usize;
            if token >= scores.len() {
                return Err(GenerationError::MalformedTrace(format!(
                    "token {} at step {} is outside a vocabulary of {}",
                    token,
                    step,
                    scores.len()
                )));
            }
            check_logits(scores, step)?;
        }

        Ok(Self {
            tokens,
            step_scores,
        })
    }

    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    pub fn step_scores(&self) -> &[Arc<[f32]>] {
        &self.step_scores
    }

    pub fn generated_steps(&self) -> usize {
        self.step_scores.len()
    }

    /// Pairs every generated token with the scores it was chosen from.
    pub fn steps(&self) -> impl Iterator<Item = (u32, &[f32])> + '_ {
        self.tokens[1..]
            .iter()
            .copied()
            .zip(self.step_scores.iter().map(|s| s.as_ref()))
    }
}
