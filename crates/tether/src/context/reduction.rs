//! Staged, budget-driven degradation.
//!
//! Both the context packer and the snapshot pruner follow the same shape:
//! measure a candidate, and while it is over budget apply the next reduction
//! step in a fixed order, re-measuring after each one. The first candidate
//! that fits wins. If every step has been applied and the result still does
//! not fit, a fallback produces the final value unconditionally.
//!
//! A step whose output measures larger than its input is discarded, so the
//! measured cost never increases from one stage to the next.
//!
//! [`ReductionPipeline`] owns that stop/fallback logic so callers only supply
//! the measurement and the ordered steps.

use std::convert::Infallible;

/// One measurement taken while running a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// Name of the stage whose output was measured.
    pub stage: String,
    /// Measured tokens after the stage.
    pub tokens: usize,
    /// Whether the measurement was within budget.
    pub fits: bool,
    /// `false` when the step grew the measurement and was discarded.
    pub applied: bool,
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The named stage produced the first candidate within budget.
    Fit { stage: String },
    /// No stage fit; the fallback produced the value.
    Fallback,
}

/// Result of running a [`ReductionPipeline`].
#[derive(Debug, Clone)]
pub struct Reduced<T> {
    pub value: T,
    /// Tokens of `value` as measured by the pipeline.
    pub tokens: usize,
    pub outcome: Outcome,
    /// Every measurement in the order it was taken, fallback included.
    pub trace: Vec<StageReport>,
}

impl<T> Reduced<T> {
    /// Whether the run ended in the fallback.
    pub fn fell_back(&self) -> bool {
        self.outcome == Outcome::Fallback
    }
}

type Measure<'a, T, E> = Box<dyn Fn(&T) -> Result<usize, E> + 'a>;
type Apply<'a, T> = Box<dyn Fn(T) -> T + 'a>;

/// Ordered reduction steps sharing one measurement function.
///
/// # Example
///
/// ```
/// use tether::context::reduction::ReductionPipeline;
///
/// let reduced = ReductionPipeline::infallible(10, |v: &Vec<u32>| v.len())
///     .step("halve", |mut v: Vec<u32>| {
///         v.truncate(v.len() / 2);
///         v
///     })
///     .step("halve again", |mut v: Vec<u32>| {
///         v.truncate(v.len() / 2);
///         v
///     })
///     .run("initial", (0..30).collect(), |mut v| {
///         v.truncate(1);
///         v
///     })
///     .unwrap();
///
/// assert_eq!(reduced.value.len(), 7);
/// assert_eq!(reduced.trace.len(), 3);
/// ```
pub struct ReductionPipeline<'a, T, E = Infallible> {
    budget: usize,
    measure: Measure<'a, T, E>,
    steps: Vec<(String, Apply<'a, T>)>,
}

impl<'a, T> ReductionPipeline<'a, T, Infallible> {
    /// Pipeline whose measurement cannot fail.
    pub fn infallible(budget: usize, measure: impl Fn(&T) -> usize + 'a) -> Self {
        Self::new(budget, move |value: &T| Ok(measure(value)))
    }
}

impl<'a, T, E> ReductionPipeline<'a, T, E> {
    /// Pipeline with a fallible measurement. A measurement error aborts the
    /// run and is returned to the caller.
    pub fn new(budget: usize, measure: impl Fn(&T) -> Result<usize, E> + 'a) -> Self {
        Self {
            budget,
            measure: Box::new(measure),
            steps: Vec::new(),
        }
    }

    /// Append a reduction step. Steps run in the order they are added, each
    /// receiving the previous step's output.
    pub fn step(mut self, name: impl Into<String>, apply: impl Fn(T) -> T + 'a) -> Self {
        self.steps.push((name.into(), Box::new(apply)));
        self
    }

    /// Number of reduction steps (excluding the initial measurement).
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no reduction steps were added.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Measure `initial`, then apply steps until a candidate fits. When none
    /// does, `fallback` receives the last candidate and its output is returned
    /// without a budget check.
    pub fn run(
        self,
        initial_stage: &str,
        initial: T,
        fallback: impl FnOnce(T) -> T,
    ) -> Result<Reduced<T>, E>
    where
        T: Clone,
    {
        let mut trace = Vec::with_capacity(self.steps.len() + 2);

        let mut current = initial;
        let mut current_tokens = (self.measure)(&current)?;
        if self.record(&mut trace, initial_stage, current_tokens, true) {
            return Ok(Reduced {
                value: current,
                tokens: current_tokens,
                outcome: Outcome::Fit {
                    stage: initial_stage.to_string(),
                },
                trace,
            });
        }

        for (name, apply) in &self.steps {
            let candidate = apply(current.clone());
            let tokens = (self.measure)(&candidate)?;
            if tokens > current_tokens {
                self.record(&mut trace, name, current_tokens, false);
                continue;
            }
            current = candidate;
            current_tokens = tokens;
            if self.record(&mut trace, name, tokens, true) {
                return Ok(Reduced {
                    value: current,
                    tokens,
                    outcome: Outcome::Fit {
                        stage: name.clone(),
                    },
                    trace,
                });
            }
        }

        let value = fallback(current);
        let tokens = (self.measure)(&value)?;
        self.record(&mut trace, "fallback", tokens, true);
        Ok(Reduced {
            value,
            tokens,
            outcome: Outcome::Fallback,
            trace,
        })
    }

    fn record(
        &self,
        trace: &mut Vec<StageReport>,
        stage: &str,
        tokens: usize,
        applied: bool,
    ) -> bool {
        let fits = tokens <= self.budget;
        trace.push(StageReport {
            stage: stage.to_string(),
            tokens,
            fits,
            applied,
        });
        fits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shrink_by(n: usize) -> impl Fn(usize) -> usize {
        move |v| v.saturating_sub(n)
    }

    #[test]
    fn initial_fit_skips_steps() {
        let reduced = ReductionPipeline::infallible(100, |v: &usize| *v)
            .step("never", |_| unreachable!())
            .run("initial", 50, |_| unreachable!())
            .unwrap();
        assert_eq!(reduced.value, 50);
        assert_eq!(
            reduced.outcome,
            Outcome::Fit {
                stage: "initial".into()
            }
        );
        assert_eq!(reduced.trace.len(), 1);
    }

    #[test]
    fn stops_at_first_fitting_step() {
        let reduced = ReductionPipeline::infallible(100, |v: &usize| *v)
            .step("a", shrink_by(50))
            .step("b", shrink_by(50))
            .step("c", |_| unreachable!())
            .run("initial", 200, |_| unreachable!())
            .unwrap();
        assert_eq!(reduced.value, 100);
        assert_eq!(reduced.outcome, Outcome::Fit { stage: "b".into() });
        let stages: Vec<&str> = reduced.trace.iter().map(|r| r.stage.as_str()).collect();
        assert_eq!(stages, ["initial", "a", "b"]);
    }

    #[test]
    fn fallback_runs_when_nothing_fits() {
        let reduced = ReductionPipeline::infallible(10, |v: &usize| *v)
            .step("a", shrink_by(1))
            .run("initial", 100, |_| 500)
            .unwrap();
        assert!(reduced.fell_back());
        // The fallback value is returned even though it is over budget.
        assert_eq!(reduced.value, 500);
        assert_eq!(reduced.trace.last().unwrap().stage, "fallback");
        assert!(!reduced.trace.last().unwrap().fits);
    }

    #[test]
    fn fallback_receives_last_candidate() {
        let reduced = ReductionPipeline::infallible(0, |v: &usize| *v)
            .step("a", shrink_by(10))
            .step("b", shrink_by(10))
            .run("initial", 100, |last| last + 1)
            .unwrap();
        assert_eq!(reduced.value, 81);
    }

    #[test]
    fn growing_step_is_discarded() {
        let reduced = ReductionPipeline::infallible(10, |v: &usize| *v)
            .step("grow", |v| v + 5)
            .step("shrink", shrink_by(15))
            .run("initial", 20, |_| unreachable!())
            .unwrap();
        assert_eq!(reduced.value, 5);
        assert!(!reduced.trace[1].applied);
        assert_eq!(reduced.trace[1].tokens, 20);
        assert!(reduced.trace[2].applied);
    }

    #[test]
    fn measurement_error_aborts() {
        let result = ReductionPipeline::new(10, |v: &usize| {
            if *v == 3 { Err("boom") } else { Ok(*v) }
        })
        .step("a", |_| 3)
        .run("initial", 100, |v| v);
        assert_eq!(result.unwrap_err(), "boom");
    }

    #[test]
    fn len_counts_steps() {
        let pipeline = ReductionPipeline::infallible(0, |v: &usize| *v)
            .step("a", shrink_by(1))
            .step("b", shrink_by(1));
        assert_eq!(pipeline.len(), 2);
        assert!(!pipeline.is_empty());
    }
}
