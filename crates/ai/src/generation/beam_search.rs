use super::{check_logits, GenerationConfig, GenerationTrace};
use crate::error::GenerationError;
use candle_core::{DType, Tensor, D};
use std::sync::Arc;
use tracing::debug;

const LENGTH_PENALTY: f64 = 1.0;

/// Anything that can score the next token of a partial sequence.
pub trait NextTokenLogits {
    /// Returns raw, unnormalized scores over the vocabulary, shape `(vocab,)`.
    fn next_token_logits(&mut self, tokens: &[u32]) -> candle_core::Result<Tensor>;
}

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<u32>,
    step_scores: Vec<Arc<[f32]>>,
    sum_logprobs: f64,
}

impl Hypothesis {
    fn start(token: u32) -> Self {
        Self {
            tokens: vec![token],
            step_scores: vec![],
            sum_logprobs: 0.0,
        }
    }

    fn extend(&self, token: u32, scores: Arc<[f32]>, sum_logprobs: f64) -> Self {
        let mut tokens = Vec::with_capacity(self.tokens.len() + 1);
        tokens.extend_from_slice(&self.tokens);
        tokens.push(token);

        let mut step_scores = self.step_scores.clone();
        step_scores.push(scores);

        Self {
            tokens,
            step_scores,
            sum_logprobs,
        }
    }

    fn normalized_score(&self) -> f64 {
        normalize(self.sum_logprobs, self.tokens.len())
    }
}

fn normalize(sum_logprobs: f64, len: usize) -> f64 {
    sum_logprobs / (len as f64).powf(LENGTH_PENALTY)
}

struct FinishedHypotheses {
    capacity: usize,
    hyps: Vec<(f64, Hypothesis)>,
}

impl FinishedHypotheses {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            hyps: Vec::with_capacity(capacity + 1),
        }
    }

    fn worst_score(&self) -> f64 {
        self.hyps
            .iter()
            .map(|(score, _)| *score)
            .fold(f64::INFINITY, f64::min)
    }

    fn add(&mut self, hyp: Hypothesis) {
        let score = hyp.normalized_score();
        if self.hyps.len() < self.capacity || score > self.worst_score() {
            self.hyps.push((score, hyp));
            if self.hyps.len() > self.capacity {
                if let Some(worst) = self
                    .hyps
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
                    .map(|(idx, _)| idx)
                {
                    self.hyps.swap_remove(worst);
                }
            }
        }
    }

    /// No live hypothesis can beat the worst finished one anymore.
    fn is_done(&self, best_live_sum_logprobs: f64, cur_len: usize) -> bool {
        self.hyps.len() >= self.capacity
            && self.worst_score() >= normalize(best_live_sum_logprobs, cur_len)
    }

    fn into_best(self) -> Option<Hypothesis> {
        self.hyps
            .into_iter()
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, hyp)| hyp)
    }
}

struct Candidate {
    beam_idx: usize,
    token: u32,
    sum_logprobs: f64,
}

fn top_k(log_probs: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut indexed: Vec<(u32, f32)> = log_probs
        .iter()
        .copied()
        .enumerate()
        .map(|(idx, lp)| (idx as u32, lp))
        .collect();

    if k < indexed.len() {
        indexed.select_nth_unstable_by(k, |a, b| b.1.total_cmp(&a.1));
        indexed.truncate(k);
    }

    indexed
}

/// Beam search from `start_token` until `eos_token` or `config.max_length`.
///
/// Every hypothesis keeps the raw logits of its own path, so the returned
/// trace pairs each chosen token with the distribution it was chosen from.
pub fn beam_search<S>(
    source: &mut S,
    start_token: u32,
    eos_token: u32,
    config: &GenerationConfig,
) -> Result<GenerationTrace, GenerationError>
where
    S: NextTokenLogits + ?Sized,
{
    config.validate()?;

    let beam_width = config.beam_width;
    let mut live = vec![Hypothesis::start(start_token)];
    let mut finished = FinishedHypotheses::new(beam_width);

    while let Some(first) = live.first() {
        if first.tokens.len() >= config.max_length {
            break;
        }

        let mut candidates = Vec::with_capacity(live.len() * 2 * beam_width);
        let mut step_scores = Vec::with_capacity(live.len());

        for (beam_idx, hyp) in live.iter().enumerate() {
            let logits = source
                .next_token_logits(&hyp.tokens)?
                .to_dtype(DType::F32)?;
            let raw = logits.to_vec1::<f32>()?;
            check_logits(&raw, hyp.tokens.len() - 1)?;
            let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?.to_vec1::<f32>()?;

            for (token, lp) in top_k(&log_probs, 2 * beam_width) {
                candidates.push(Candidate {
                    beam_idx,
                    token,
                    sum_logprobs: hyp.sum_logprobs + lp as f64,
                });
            }
            step_scores.push(Arc::<[f32]>::from(raw));
        }

        candidates.sort_by(|a, b| b.sum_logprobs.total_cmp(&a.sum_logprobs));

        let mut next = Vec::with_capacity(beam_width);
        for (rank, candidate) in candidates.into_iter().enumerate() {
            let hyp = &live[candidate.beam_idx];
            let scores = step_scores[candidate.beam_idx].clone();

            if candidate.token == eos_token {
                if rank < beam_width {
                    finished.add(hyp.extend(candidate.token, scores, candidate.sum_logprobs));
                }
                continue;
            }

            next.push(hyp.extend(candidate.token, scores, candidate.sum_logprobs));
            if next.len() == beam_width {
                break;
            }
        }

        live = next;

        if let Some(best) = live.first() {
            if finished.is_done(best.sum_logprobs, best.tokens.len()) {
                break;
            }
        }
    }

    for hyp in live {
        finished.add(hyp);
    }

    let best = finished.into_best().ok_or_else(|| {
        GenerationError::MalformedTrace("beam search finished without a hypothesis".to_string())
    })?;

    debug!(
        config = config.name,
        tokens = best.tokens.len(),
        score = best.normalized_score(),
        "beam search finished"
    );

    GenerationTrace::new(best.tokens, best.step_scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use std::collections::HashMap;

    const BOS: u32 = 0;
    const EOS: u32 = 1;
    const A: u32 = 2;
    const B: u32 = 3;

    /// Next-token distribution depends only on the last token.
    struct ScriptedDecoder {
        table: HashMap<u32, Vec<f32>>,
        calls: usize,
    }

    impl ScriptedDecoder {
        fn new() -> Self {
            let mut table = HashMap::new();
            table.insert(BOS, vec![0.0001, 0.1, 0.5, 0.4]);
            table.insert(A, vec![0.0001, 0.6, 0.2, 0.2]);
            table.insert(B, vec![0.0001, 0.9, 0.05, 0.05]);
            Self::with_table(table)
        }

        fn with_table(table: HashMap<u32, Vec<f32>>) -> Self {
            Self { table, calls: 0 }
        }

        fn logits_after(&self, token: u32) -> Vec<f32> {
            self.table[&token].iter().map(|w| w.ln()).collect()
        }
    }

    impl NextTokenLogits for ScriptedDecoder {
        fn next_token_logits(&mut self, tokens: &[u32]) -> candle_core::Result<Tensor> {
            self.calls += 1;
            let last = *tokens.last().expect("sequence is never empty");
            let logits = self.logits_after(last);
            Tensor::new(logits.as_slice(), &Device::Cpu)
        }
    }

    fn config(max_length: usize, beam_width: usize) -> GenerationConfig {
        GenerationConfig {
            name: "test",
            max_length,
            beam_width,
        }
    }

    #[test_log::test]
    fn single_beam_follows_greedy_path() {
        let mut decoder = ScriptedDecoder::new();
        let trace = beam_search(&mut decoder, BOS, EOS, &config(8, 1)).unwrap();
        assert_eq!(trace.tokens(), &[BOS, A, EOS]);
    }

    #[test_log::test]
    fn wider_beam_finds_better_sequence() {
        let mut decoder = ScriptedDecoder::new();
        let trace = beam_search(&mut decoder, BOS, EOS, &config(8, 2)).unwrap();
        assert_eq!(trace.tokens(), &[BOS, B, EOS]);
    }

    #[test_log::test]
    fn trace_carries_scores_of_its_own_path() {
        let mut decoder = ScriptedDecoder::new();
        let trace = beam_search(&mut decoder, BOS, EOS, &config(8, 2)).unwrap();

        assert_eq!(trace.generated_steps(), trace.tokens().len() - 1);
        assert_eq!(trace.step_scores()[0].as_ref(), decoder.logits_after(BOS).as_slice());
        assert_eq!(trace.step_scores()[1].as_ref(), decoder.logits_after(B).as_slice());
    }

    #[test_log::test]
    fn length_budget_is_respected() {
        let mut decoder = ScriptedDecoder::new();
        let trace = beam_search(&mut decoder, BOS, EOS, &config(2, 2)).unwrap();
        assert_eq!(trace.tokens(), &[BOS, A]);
    }

    #[test_log::test]
    fn max_length_of_one_generates_nothing() {
        let mut decoder = ScriptedDecoder::new();
        let trace = beam_search(&mut decoder, BOS, EOS, &config(1, 4)).unwrap();
        assert_eq!(trace.tokens(), &[BOS]);
        assert_eq!(trace.generated_steps(), 0);
        assert_eq!(decoder.calls, 0);
    }

    #[test_log::test]
    fn invalid_config_is_rejected_before_decoding() {
        let mut decoder = ScriptedDecoder::new();
        let result = beam_search(&mut decoder, BOS, EOS, &config(8, 0));
        assert!(matches!(result, Err(GenerationError::InvalidConfig { .. })));
        assert_eq!(decoder.calls, 0);
    }

    #[test_log::test]
    fn stops_once_finished_hypotheses_cannot_be_beaten() {
        let mut decoder = ScriptedDecoder::new();
        beam_search(&mut decoder, BOS, EOS, &config(8, 2)).unwrap();
        // one call for BOS, one per live beam at step two, then the finished set is settled
        assert_eq!(decoder.calls, 3);
    }

    /// Probabilities over an 8-token vocabulary; unlisted tokens share the rest.
    fn distribution(listed: &[(u32, f32)]) -> Vec<f32> {
        let rest = 1.0 - listed.iter().map(|(_, p)| p).sum::<f32>();
        let share = rest / (8 - listed.len()) as f32;
        (0..8u32)
            .map(|t| {
                listed
                    .iter()
                    .find(|(token, _)| *token == t)
                    .map_or(share, |(_, p)| *p)
            })
            .collect()
    }

    #[test_log::test]
    fn low_ranked_eos_does_not_end_search_early() {
        const C: u32 = 4;
        const D: u32 = 5;
        const E: u32 = 6;
        const F: u32 = 7;

        let mut table = HashMap::new();
        table.insert(BOS, distribution(&[(A, 0.5), (B, 0.4), (EOS, 0.05)]));
        table.insert(A, distribution(&[(EOS, 0.5), (C, 0.49)]));
        // B's EOS ranks third at step two, behind A's EOS and A -> C
        table.insert(B, distribution(&[(EOS, 0.55), (D, 0.44)]));
        table.insert(C, distribution(&[(E, 0.5), (F, 0.45)]));
        table.insert(D, distribution(&[(F, 0.5)]));
        table.insert(E, distribution(&[(EOS, 0.99)]));
        table.insert(F, distribution(&[(EOS, 0.99)]));

        // Admitting B's EOS would fill the finished set at step two and stop the
        // search at step three with [BOS, A, EOS].
        let mut decoder = ScriptedDecoder::with_table(table);
        let trace = beam_search(&mut decoder, BOS, EOS, &config(8, 2)).unwrap();
        assert_eq!(trace.tokens(), &[BOS, A, C, E, EOS]);
    }

    struct FaultyDecoder {
        logits: Vec<f32>,
    }

    impl NextTokenLogits for FaultyDecoder {
        fn next_token_logits(&mut self, _tokens: &[u32]) -> candle_core::Result<Tensor> {
            Tensor::new(self.logits.as_slice(), &Device::Cpu)
        }
    }

    #[test_log::test]
    fn non_finite_logits_fail_the_pass() {
        let cases = [
            vec![0.0, f32::NAN, 0.0, 0.0],
            vec![0.0, 0.0, f32::INFINITY, 0.0],
            vec![f32::NEG_INFINITY; 4],
        ];
        for logits in cases {
            let mut decoder = FaultyDecoder { logits };
            let result = beam_search(&mut decoder, BOS, EOS, &config(8, 2));
            assert!(
                matches!(result, Err(GenerationError::NonFiniteLogits { step: 0 })),
                "{result:?}"
            );
        }
    }

    #[test]
    fn top_k_keeps_highest_scores() {
        let mut top = top_k(&[0.1, 0.9, 0.5, 0.7], 2);
        top.sort_by_key(|(token, _)| *token);
        assert_eq!(top, vec![(1, 0.9), (3, 0.7)]);
        assert_eq!(top_k(&[0.1, 0.2], 5).len(), 2);
    }
}
