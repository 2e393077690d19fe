//! Turns the probability trace of one generation pass into a single number.
//!
//! The value is the mean probability of the chosen tokens, as a percentage,
//! clamped to `[MIN_CONFIDENCE, MAX_CONFIDENCE]`. It is a heuristic and is not
//! calibrated.

use crate::generation::GenerationTrace;

pub const MIN_CONFIDENCE: f64 = 10.0;
pub const MAX_CONFIDENCE: f64 = 99.0;

/// Probability of `token` under the log-softmax of raw `scores`.
pub fn token_probability(scores: &[f32], token: u32) -> f64 {
    let max = scores
        .iter()
        .map(|&s| s as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let log_sum_exp = max
        + scores
            .iter()
            .map(|&s| (s as f64 - max).exp())
            .sum::<f64>()
            .ln();
    let log_prob = scores[token as usize] as f64 - log_sum_exp;
    log_prob.exp()
}

pub fn score(trace: &GenerationTrace) -> f64 {
    let probs: Vec<f64> = trace
        .steps()
        .map(|(token, scores)| token_probability(scores, token))
        .collect();

    let confidence = if probs.is_empty() {
        0.0
    } else {
        probs.iter().sum::<f64>() / probs.len() as f64 * 100.0
    };

    confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Logits over a 3-token vocabulary where `token` gets probability `p`.
    fn logits_with_probability(token: u32, p: f64) -> Arc<[f32]> {
        let rest = (1.0 - p) / 2.0;
        (0..3u32)
            .map(|t| if t == token { p.ln() as f32 } else { rest.ln() as f32 })
            .collect::<Vec<_>>()
            .into()
    }

    fn trace(tokens: Vec<u32>, probs: &[f64]) -> GenerationTrace {
        let scores = tokens[1..]
            .iter()
            .zip(probs)
            .map(|(&token, &p)| logits_with_probability(token, p))
            .collect();
        GenerationTrace::new(tokens, scores).unwrap()
    }

    #[test]
    fn token_probability_normalizes_raw_scores() {
        let p = token_probability(&[1.0, 1.0, 1.0, 1.0], 2);
        assert!((p - 0.25).abs() < 1e-12);

        // shifting every score leaves the distribution unchanged
        let p = token_probability(&[1001.0, 1000.0], 0);
        let expected = 1.0 / (1.0 + (-1.0f64).exp());
        assert!((p - expected).abs() < 1e-9);
    }

    #[test]
    fn single_step_equals_its_probability() {
        let confidence = score(&trace(vec![0, 1], &[0.81]));
        assert!((confidence - 81.0).abs() < 1e-4, "got {confidence}");
    }

    #[test]
    fn mean_over_steps() {
        let confidence = score(&trace(vec![0, 1, 2], &[0.9, 0.4]));
        assert!((confidence - 65.0).abs() < 1e-4, "got {confidence}");
    }

    #[test]
    fn empty_generation_clamps_to_minimum() {
        assert_eq!(score(&trace(vec![0], &[])), MIN_CONFIDENCE);
    }

    #[test]
    fn low_probability_clamps_to_minimum() {
        assert_eq!(score(&trace(vec![0, 1], &[0.02])), MIN_CONFIDENCE);
        assert_eq!(score(&trace(vec![0, 1], &[1e-30])), MIN_CONFIDENCE);
    }

    #[test]
    fn high_probability_clamps_to_maximum() {
        assert_eq!(score(&trace(vec![0, 1], &[0.999])), MAX_CONFIDENCE);
    }

    #[test]
    fn extreme_logits_stay_finite() {
        let scores: Arc<[f32]> = vec![-1e30, 0.0, 1e30].into();
        let trace = GenerationTrace::new(vec![0, 0], vec![scores]).unwrap();
        assert_eq!(score(&trace), MIN_CONFIDENCE);
    }

    #[test]
    fn masked_chosen_token_scores_minimum() {
        let scores: Arc<[f32]> = vec![f32::NEG_INFINITY, 0.0, 0.0].into();
        let trace = GenerationTrace::new(vec![0, 0], vec![scores]).unwrap();
        assert_eq!(score(&trace), MIN_CONFIDENCE);
    }
}
