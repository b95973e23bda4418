//! Adaptive fill-ratio decision

use super::types::{AnswerValue, DecisionPolicy, ALTERNATIVE_LABELS};

/// Outcome of resolving one question's fill ratios
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub value: AnswerValue,
    pub weak: bool,
    pub threshold: f32,
    pub max_fill: f32,
}

impl DecisionPolicy {
    /// Threshold after adapting `base` to how dark the strongest mark is
    pub fn effective_threshold(&self, base: f32, max_fill: f32) -> f32 {
        if max_fill < base * self.light_band {
            base * self.light_factor
        } else if max_fill > base * self.dark_band {
            base * self.dark_factor
        } else {
            base
        }
    }

    /// Resolve fill ratios into an answer
    ///
    /// A cell is marked when it clears the effective threshold and is within
    /// `relative_floor` of the strongest cell. Several marks resolve to the
    /// one dominant mark if exactly one reaches `dominance * max`, flagged
    /// weak; otherwise they are `Multiple`.
    pub fn resolve(&self, ratios: &[f32], base: f32) -> Decision {
        let max_fill = ratios.iter().copied().fold(0.0f32, f32::max);
        let threshold = self.effective_threshold(base, max_fill);

        let marked: Vec<usize> = (0..ratios.len())
            .filter(|&i| ratios[i] >= threshold && ratios[i] >= self.relative_floor * max_fill)
            .collect();

        let (value, weak) = match marked.as_slice() {
            [] => (AnswerValue::Blank, false),
            [only] => (label(*only), false),
            several => {
                let dominant: Vec<usize> = several
                    .iter()
                    .copied()
                    .filter(|&i| ratios[i] >= self.dominance * max_fill)
                    .collect();
                match dominant.as_slice() {
                    [one] => (label(*one), true),
                    _ => (AnswerValue::Multiple, false),
                }
            }
        };

        Decision {
            value,
            weak,
            threshold,
            max_fill,
        }
    }
}

fn label(index: usize) -> AnswerValue {
    ALTERNATIVE_LABELS
        .get(index)
        .map_or(AnswerValue::InvalidRoi, |&c| AnswerValue::Alternative(c))
}
