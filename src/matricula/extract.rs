//! Strategy scheduling, validation gate and selection

use super::strategies::{default_strategies, MatriculaStrategy, StrategyContext};
use super::types::{
    ExtractionMode, MatriculaCandidate, MatriculaOptions, MatriculaResult, OutcomeKind,
    StrategyKind, StrategyOutcome,
};
use super::validate::is_valid;
use crate::ocr::OcrEngine;
use image::GrayImage;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

/// Runs the matrícula strategies over the original page
pub struct MatriculaExtractor {
    strategies: Vec<Box<dyn MatriculaStrategy>>,
}

impl Default for MatriculaExtractor {
    fn default() -> Self {
        Self::with_strategies(default_strategies())
    }
}

impl MatriculaExtractor {
    /// Use a custom strategy list; list order is the tie-break order
    pub fn with_strategies(strategies: Vec<Box<dyn MatriculaStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Extract the matrícula
    ///
    /// Never fails: strategy errors become `Failed` outcomes and an empty,
    /// invalid result is returned when nothing validates.
    #[instrument(skip_all, fields(width = page.width(), height = page.height(), mode = ?options.mode))]
    pub fn extract(&self, page: &GrayImage, ocr: &dyn OcrEngine, options: &MatriculaOptions) -> MatriculaResult {
        let ctx = StrategyContext { ocr, options };

        let runs: Vec<(StrategyOutcome, Option<MatriculaCandidate>)> = match options.mode {
            ExtractionMode::Exhaustive => self
                .strategies
                .par_iter()
                .map(|s| run_strategy(s.as_ref(), page, &ctx))
                .collect(),
            ExtractionMode::FirstValid => {
                let mut runs = Vec::with_capacity(self.strategies.len());
                let mut done = false;
                for strategy in &self.strategies {
                    if done {
                        runs.push((skipped(strategy.kind()), None));
                        continue;
                    }
                    let run = run_strategy(strategy.as_ref(), page, &ctx);
                    done = run.1.is_some();
                    runs.push(run);
                }
                runs
            }
        };

        let (outcomes, candidates): (Vec<_>, Vec<_>) = runs.into_iter().unzip();
        let Some(best) = select_best(candidates.into_iter().flatten()) else {
            warn!("No valid matrícula found");
            return MatriculaResult::empty(outcomes);
        };

        info!(matricula = %best.text, confidence = best.confidence, strategy = %best.strategy, "Matrícula recognized");
        MatriculaResult {
            text: best.text,
            confidence: best.confidence,
            valid: true,
            strategy: Some(best.strategy),
            outcomes,
        }
    }
}

/// Run one strategy behind the validation gate
///
/// The returned candidate, if any, always passes validation.
fn run_strategy(
    strategy: &dyn MatriculaStrategy,
    page: &GrayImage,
    ctx: &StrategyContext<'_>,
) -> (StrategyOutcome, Option<MatriculaCandidate>) {
    let kind = strategy.kind();
    if !strategy.applies(ctx.options) {
        return (skipped(kind), None);
    }

    let outcome = |kind_of: OutcomeKind| StrategyOutcome { strategy: kind, kind: kind_of };
    match strategy.extract(page, ctx) {
        Ok(Some(candidate)) if is_valid(&candidate.text, ctx.options.min_length, ctx.options.max_length) => {
            debug!(strategy = %kind, text = %candidate.text, confidence = candidate.confidence, "Candidate");
            let reported = OutcomeKind::Candidate {
                text: candidate.text.clone(),
                confidence: candidate.confidence,
            };
            (outcome(reported), Some(candidate))
        }
        Ok(Some(candidate)) => {
            debug!(strategy = %kind, raw = %candidate.text, "Candidate rejected");
            (outcome(OutcomeKind::Rejected { raw: candidate.text }), None)
        }
        Ok(None) => (outcome(OutcomeKind::NoResult), None),
        Err(e) => {
            warn!(strategy = %kind, error = %e, "Matrícula strategy failed");
            (outcome(OutcomeKind::Failed { message: e.to_string() }), None)
        }
    }
}

fn skipped(strategy: StrategyKind) -> StrategyOutcome {
    StrategyOutcome {
        strategy,
        kind: OutcomeKind::Skipped,
    }
}

/// Highest confidence; only a strictly greater one replaces the current best
fn select_best(candidates: impl Iterator<Item = MatriculaCandidate>) -> Option<MatriculaCandidate> {
    candidates.fold(None, |best, c| match best {
        Some(b) if c.confidence <= b.confidence => Some(b),
        _ => Some(c),
    })
}
