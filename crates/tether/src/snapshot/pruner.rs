//! Four-stage snapshot pruning.
//!
//! [`SnapshotPruner::prune`] measures the payload the decision engine will
//! receive (`{synopsis, snapshot, prompt}`) and reduces the snapshot until
//! that payload fits `target_budget`:
//!
//! 1. **Visual trim** — drop style references and layout grids from every
//!    node. Always applied.
//! 2. **Text truncation** — shorten node text over `text_cap` to its first
//!    80% and last 20%, joined by an ellipsis.
//! 3. **Child sampling** — clip every node's sampled children to
//!    `min(12, max_children)`, then 6, then 3.
//! 4. **Coverage search** — sort top-level nodes by type priority then area
//!    and binary-search the longest prefix that fits. The best prefix found
//!    is returned even when nothing fits.
//!
//! Every stage recurses into sampled children. The synopsis is computed from
//! the original snapshot before any stage runs.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::synopsis::Synopsis;
use super::types::{Node, Snapshot};
use crate::context::reduction::{ReductionPipeline, StageReport};
use crate::context::tokens::TokenEstimator;

pub const DEFAULT_MAX_CHILDREN: usize = 12;
pub const DEFAULT_TEXT_CAP: usize = 2000;
pub const DEFAULT_MODEL_TOKEN_LIMIT: usize = 128_000;
pub const DEFAULT_TOKEN_SAFETY_MARGIN: usize = 4_000;

/// Floor for the target budget, whatever the model limit and margin.
pub const MIN_TARGET_BUDGET: usize = 1_000;

/// Child caps tried after the configured one.
const CHILD_CAP_STEPS: [usize; 2] = [6, 3];

/// Share of `text_cap` kept from the start of truncated text, in tenths.
const TEXT_HEAD_TENTHS: usize = 8;

const ELLIPSIS: &str = "…";

/// Hint recording how many top-level nodes the coverage search dropped.
pub const OMITTED_NODES_HINT: &str = "omittedNodes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrunerConfig {
    pub max_children: usize,
    pub text_cap: usize,
    pub model_token_limit: usize,
    pub token_safety_margin: usize,
}

impl Default for PrunerConfig {
    fn default() -> Self {
        Self {
            max_children: DEFAULT_MAX_CHILDREN,
            text_cap: DEFAULT_TEXT_CAP,
            model_token_limit: DEFAULT_MODEL_TOKEN_LIMIT,
            token_safety_margin: DEFAULT_TOKEN_SAFETY_MARGIN,
        }
    }
}

impl PrunerConfig {
    pub fn with_max_children(mut self, max_children: usize) -> Self {
        self.max_children = max_children;
        self
    }

    pub fn with_text_cap(mut self, text_cap: usize) -> Self {
        self.text_cap = text_cap;
        self
    }

    pub fn with_model_token_limit(mut self, limit: usize) -> Self {
        self.model_token_limit = limit;
        self
    }

    pub fn with_token_safety_margin(mut self, margin: usize) -> Self {
        self.token_safety_margin = margin;
        self
    }

    /// `max(1000, model_token_limit - token_safety_margin)`.
    pub fn target_budget(&self) -> usize {
        self.model_token_limit
            .saturating_sub(self.token_safety_margin)
            .max(MIN_TARGET_BUDGET)
    }

    /// Decreasing, deduplicated child caps.
    fn child_caps(&self) -> Vec<usize> {
        let first = self.max_children.min(DEFAULT_MAX_CHILDREN);
        let mut caps = vec![first];
        caps.extend(CHILD_CAP_STEPS.iter().copied().filter(|cap| *cap < first));
        caps
    }
}

/// What pruning did.
#[derive(Debug, Clone, Serialize)]
pub struct PruneReport {
    /// Measurements in the order stages ran.
    #[serde(skip)]
    pub stages: Vec<StageReport>,
    /// Number of top-level nodes kept by the coverage search, or `None` when
    /// an earlier stage already fit.
    pub coverage: Option<usize>,
    pub estimated_tokens: usize,
    pub target_budget: usize,
}

impl PruneReport {
    pub fn fits(&self) -> bool {
        self.estimated_tokens <= self.target_budget
    }

    /// Name of the last stage that ran.
    pub fn final_stage(&self) -> Option<&str> {
        self.stages.last().map(|s| s.stage.as_str())
    }
}

/// Output of [`SnapshotPruner::prune`].
#[derive(Debug, Clone)]
pub struct Pruned {
    pub snapshot: Snapshot,
    pub synopsis: Synopsis,
    pub report: PruneReport,
}

pub struct SnapshotPruner<E> {
    config: PrunerConfig,
    estimator: E,
}

impl<E: TokenEstimator> SnapshotPruner<E> {
    pub fn new(config: PrunerConfig, estimator: E) -> Self {
        Self { config, estimator }
    }

    pub fn config(&self) -> &PrunerConfig {
        &self.config
    }

    /// Prune `snapshot` so that it, its synopsis, and `target_prompt` fit the
    /// target budget. Never fails; the coverage search is the last resort.
    pub fn prune(&self, snapshot: &Snapshot, target_prompt: &str) -> Pruned {
        let synopsis = Synopsis::from_snapshot(snapshot);
        let target_budget = self.config.target_budget();
        let text_cap = self.config.text_cap;

        let synopsis_ref = &synopsis;
        let measure =
            move |candidate: &Snapshot| self.estimate(synopsis_ref, candidate, target_prompt);

        let mut pipeline = ReductionPipeline::infallible(target_budget, measure)
            .step("text_truncation", move |s| truncate_text(s, text_cap));
        for cap in self.config.child_caps() {
            pipeline =
                pipeline.step(format!("sample_children<={cap}"), move |s| clip_children(s, cap));
        }

        let mut coverage = None;
        let reduced = pipeline.run("visual_trim", visual_trim(snapshot.clone()), |last| {
            let (covered, kept) = cover(last, target_budget, measure);
            coverage = Some(kept);
            covered
        });
        let Ok(reduced) = reduced;

        for report in &reduced.trace {
            debug!(
                "Snapshot stage {}: ~{} tokens (budget {}, fits: {}, applied: {})",
                report.stage, report.tokens, target_budget, report.fits, report.applied
            );
        }
        if let Some(kept) = coverage {
            info!(
                "Snapshot coverage search kept {kept}/{} nodes (~{} tokens, budget {target_budget})",
                snapshot.nodes().len(),
                reduced.tokens
            );
        }

        Pruned {
            snapshot: reduced.value,
            synopsis,
            report: PruneReport {
                stages: reduced.trace,
                coverage,
                estimated_tokens: reduced.tokens,
                target_budget,
            },
        }
    }

    /// Estimated tokens of the assembled `{synopsis, snapshot, prompt}`
    /// payload.
    pub fn estimate(&self, synopsis: &Synopsis, snapshot: &Snapshot, prompt: &str) -> usize {
        #[derive(Serialize)]
        struct Payload<'a> {
            synopsis: &'a Synopsis,
            snapshot: &'a Snapshot,
            prompt: &'a str,
        }
        let payload = serde_json::to_value(Payload {
            synopsis,
            snapshot,
            prompt,
        })
        .unwrap_or(Value::Null);
        self.estimator.estimate_json(&payload)
    }
}

/// Coverage stage: keep the longest priority-ordered prefix of top-level
/// nodes that fits. Returns the snapshot and the number of nodes kept.
fn cover(
    mut snapshot: Snapshot,
    budget: usize,
    measure: impl Fn(&Snapshot) -> usize,
) -> (Snapshot, usize) {
    let mut nodes = std::mem::take(&mut snapshot.selection_summary.nodes);
    sort_by_priority(&mut nodes);
    let total = nodes.len();

    let kept = binary_search_coverage(total, budget, |m| {
        measure(&with_prefix(&snapshot, &nodes, m))
    });
    (with_prefix(&snapshot, &nodes, kept), kept)
}

fn with_prefix(base: &Snapshot, sorted: &[Node], m: usize) -> Snapshot {
    let mut snapshot = base.clone();
    snapshot.selection_summary.nodes = sorted.iter().take(m).cloned().collect();
    let omitted = sorted.len().saturating_sub(m);
    if omitted > 0 {
        snapshot
            .selection_summary
            .hints
            .insert(OMITTED_NODES_HINT.to_string(), Value::from(omitted));
    }
    snapshot
}

/// Type priority ascending, then area descending. Ties keep executor order.
pub fn sort_by_priority(nodes: &mut [Node]) {
    nodes.sort_by(|a, b| {
        a.type_priority()
            .cmp(&b.type_priority())
            .then_with(|| b.geometry.area().total_cmp(&a.geometry.area()))
    });
}

/// Largest `m` in `[1, n]` with `measure(m) <= budget`, by binary search.
///
/// Assumes `measure` is non-decreasing in `m`. When no prefix fits the
/// result is 1, and for `n == 0` it is 0.
pub fn binary_search_coverage(
    n: usize,
    budget: usize,
    mut measure: impl FnMut(usize) -> usize,
) -> usize {
    if n == 0 {
        return 0;
    }
    let mut low = 1;
    let mut high = n;
    let mut best = 1;
    while low <= high {
        let mid = low + (high - low) / 2;
        if measure(mid) <= budget {
            best = mid;
            low = mid + 1;
        } else {
            high = mid - 1;
        }
    }
    best
}

// ── Stages ──

/// Drop style references and layout grids from every node.
pub fn visual_trim(mut snapshot: Snapshot) -> Snapshot {
    snapshot.for_each_node_mut(|node| {
        node.style_refs = None;
        node.layout_grids = None;
    });
    snapshot
}

/// Shorten every text longer than `cap` characters.
pub fn truncate_text(mut snapshot: Snapshot, cap: usize) -> Snapshot {
    snapshot.for_each_node_mut(|node| {
        let Some(text) = &node.text else {
            return;
        };
        let length = text.chars().count();
        if length <= cap {
            return;
        }
        let head = cap * TEXT_HEAD_TENTHS / 10;
        let tail = cap - head;
        let start: String = text.chars().take(head).collect();
        let end: String = text.chars().skip(length - tail).collect();
        node.text = Some(format!("{start}{ELLIPSIS}{end}"));
        node.truncated = true;
        // Keep the first recorded length if text was already truncated.
        node.original_length.get_or_insert(length);
    });
    snapshot
}

/// Clip every node's sampled children to `cap`.
pub fn clip_children(mut snapshot: Snapshot, cap: usize) -> Snapshot {
    snapshot.for_each_node_mut(|node| {
        if let Some(children) = &mut node.sample_children {
            children.truncate(cap);
        }
    });
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tokens::HeuristicEstimator;

    fn pruner(config: PrunerConfig) -> SnapshotPruner<HeuristicEstimator> {
        SnapshotPruner::new(config, HeuristicEstimator)
    }

    fn labelled_children(parent: usize, count: usize) -> Vec<Node> {
        (0..count)
            .map(|i| {
                Node::new(format!("{parent}:{i}"), "TEXT")
                    .with_geometry(80.0, 20.0)
                    .with_text(format!("label {i} inside frame {parent}"))
            })
            .collect()
    }

    /// 5 STICKY and 15 FRAME nodes, each frame sampling 20 children.
    fn board() -> Snapshot {
        let mut nodes = Vec::new();
        for i in 0..5 {
            nodes.push(
                Node::new(format!("s{i}"), "STICKY")
                    .with_geometry(200.0, 200.0)
                    .with_text(format!("sticky note {i}")),
            );
        }
        for i in 0..15 {
            let mut frame = Node::new(format!("f{i}"), "FRAME")
                .with_geometry(400.0 + i as f64, 300.0)
                .with_children(labelled_children(i, 20));
            frame.style_refs = Some(serde_json::json!({"fill": "S:123", "stroke": "S:456"}));
            nodes.push(frame);
        }
        Snapshot::from_nodes(nodes)
    }

    fn assert_non_increasing(stages: &[StageReport]) {
        for pair in stages.windows(2) {
            assert!(
                pair[1].tokens <= pair[0].tokens,
                "{} ({}) grew past {} ({})",
                pair[1].stage,
                pair[1].tokens,
                pair[0].stage,
                pair[0].tokens
            );
        }
    }

    #[test]
    fn target_budget_has_floor() {
        let config = PrunerConfig::default()
            .with_model_token_limit(3000)
            .with_token_safety_margin(4000);
        assert_eq!(config.target_budget(), MIN_TARGET_BUDGET);
        assert_eq!(PrunerConfig::default().target_budget(), 124_000);
    }

    #[test]
    fn child_caps_decrease() {
        assert_eq!(PrunerConfig::default().child_caps(), [12, 6, 3]);
        assert_eq!(PrunerConfig::default().with_max_children(30).child_caps(), [12, 6, 3]);
        assert_eq!(PrunerConfig::default().with_max_children(5).child_caps(), [5, 3]);
        assert_eq!(PrunerConfig::default().with_max_children(6).child_caps(), [6, 3]);
        assert_eq!(PrunerConfig::default().with_max_children(2).child_caps(), [2]);
    }

    #[test]
    fn small_snapshot_only_visual_trim() {
        let mut node = Node::new("1", "FRAME");
        node.style_refs = Some(serde_json::json!({"fill": "S:1"}));
        node.layout_grids = Some(serde_json::json!([{"pattern": "COLUMNS"}]));
        let pruned = pruner(PrunerConfig::default()).prune(&Snapshot::from_nodes(vec![node]), "hi");

        assert_eq!(pruned.report.final_stage(), Some("visual_trim"));
        assert_eq!(pruned.report.coverage, None);
        let kept = &pruned.snapshot.nodes()[0];
        assert!(kept.style_refs.is_none());
        assert!(kept.layout_grids.is_none());
    }

    #[test]
    fn visual_trim_recurses() {
        let mut child = Node::new("2", "TEXT");
        child.style_refs = Some(serde_json::json!({"text": "S:2"}));
        let snapshot =
            Snapshot::from_nodes(vec![Node::new("1", "FRAME").with_children(vec![child])]);
        let trimmed = visual_trim(snapshot);
        assert!(trimmed.nodes()[0].sample_children.as_ref().unwrap()[0].style_refs.is_none());
    }

    #[test]
    fn truncation_keeps_head_and_tail() {
        let text: String = ('a'..='z').cycle().take(30).collect();
        let snapshot = Snapshot::from_nodes(vec![Node::new("1", "TEXT").with_text(text.clone())]);
        let truncated = truncate_text(snapshot, 10);
        let node = &truncated.nodes()[0];

        let kept = node.text.as_deref().unwrap();
        assert_eq!(kept, format!("abcdefgh{ELLIPSIS}cd"));
        assert!(node.truncated);
        assert_eq!(node.original_length, Some(30));

        let json = serde_json::to_value(node).unwrap();
        assert_eq!(json["truncated"], true);
        assert_eq!(json["originalLength"], 30);
    }

    #[test]
    fn truncation_counts_characters() {
        let text = "é".repeat(12);
        let snapshot = Snapshot::from_nodes(vec![Node::new("1", "TEXT").with_text(text)]);
        let node = truncate_text(snapshot, 10).nodes()[0].clone();
        assert_eq!(node.text.as_deref().unwrap().chars().count(), 11);
    }

    #[test]
    fn short_text_untouched() {
        let snapshot = Snapshot::from_nodes(vec![Node::new("1", "TEXT").with_text("short")]);
        let node = truncate_text(snapshot, 10).nodes()[0].clone();
        assert_eq!(node.text.as_deref(), Some("short"));
        assert!(!node.truncated);
        assert_eq!(node.original_length, None);
    }

    #[test]
    fn clip_children_recurses() {
        let inner = Node::new("b", "FRAME").with_children(labelled_children(1, 5));
        let mut children = vec![inner];
        children.extend(labelled_children(0, 5));
        let snapshot = Snapshot::from_nodes(vec![Node::new("a", "FRAME").with_children(children)]);

        let clipped = clip_children(snapshot, 3);
        let outer = clipped.nodes()[0].sample_children.as_ref().unwrap();
        assert_eq!(outer.len(), 3);
        assert_eq!(outer[0].sample_children.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn priority_sort() {
        let mut nodes = vec![
            Node::new("frame-big", "FRAME").with_geometry(100.0, 100.0),
            Node::new("vector", "VECTOR").with_geometry(1000.0, 1000.0),
            Node::new("text", "TEXT").with_geometry(1.0, 1.0),
            Node::new("instance", "INSTANCE"),
            Node::new("frame-small", "FRAME").with_geometry(10.0, 10.0),
            Node::new("sticky", "STICKY"),
        ];
        sort_by_priority(&mut nodes);
        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(
            ids,
            ["sticky", "text", "instance", "frame-big", "frame-small", "vector"]
        );
    }

    #[test]
    fn binary_search_finds_largest_fitting_prefix() {
        let per_node = 100;
        for n in 1..=40 {
            for budget in [0, 50, 100, 550, 1_000, 2_000, 10_000] {
                let found = binary_search_coverage(n, budget, |m| m * per_node);
                let expected = (budget / per_node).clamp(1, n);
                assert_eq!(found, expected, "n={n} budget={budget}");
            }
        }
    }

    #[test]
    fn binary_search_is_logarithmic() {
        let mut calls = 0;
        let found = binary_search_coverage(1_000, 12_345, |m| {
            calls += 1;
            m * 10
        });
        assert_eq!(found, 1_000);
        assert!(calls <= 11, "{calls} measurements");
    }

    #[test]
    fn binary_search_empty() {
        assert_eq!(binary_search_coverage(0, 100, |_| unreachable!()), 0);
    }

    #[test]
    fn child_sampling_suffices_for_board() {
        let pruner_probe = pruner(PrunerConfig::default());
        let original = board();
        let synopsis = Synopsis::from_snapshot(&original);
        let at_six = clip_children(visual_trim(original.clone()), 6);
        let budget = pruner_probe.estimate(&synopsis, &at_six, "Group the stickies");
        assert!(budget > MIN_TARGET_BUDGET);

        let config = PrunerConfig::default()
            .with_model_token_limit(budget)
            .with_token_safety_margin(0);
        let pruned = pruner(config).prune(&original, "Group the stickies");

        assert!(pruned.report.fits());
        assert_eq!(pruned.report.coverage, None);
        assert_eq!(pruned.report.final_stage(), Some("sample_children<=6"));
        assert_eq!(pruned.snapshot.nodes().len(), 20);
        for node in pruned.snapshot.nodes() {
            if let Some(children) = &node.sample_children {
                assert_eq!(children.len(), 6);
            }
        }
        assert!(!pruned.snapshot.selection_summary.hints.contains_key(OMITTED_NODES_HINT));
        assert_non_increasing(&pruned.report.stages);
    }

    #[test]
    fn coverage_search_keeps_priority_prefix() {
        let original = board();
        let pruned = pruner(
            PrunerConfig::default()
                .with_model_token_limit(0)
                .with_text_cap(100),
        )
        .prune(&original, "Summarize");

        let kept = pruned.report.coverage.unwrap();
        assert!(kept >= 1 && kept < 20);
        assert_eq!(pruned.snapshot.nodes().len(), kept);
        assert_eq!(pruned.snapshot.nodes()[0].node_type, "STICKY");
        assert_eq!(
            pruned.snapshot.selection_summary.hints[OMITTED_NODES_HINT],
            20 - kept
        );
        assert!(pruned.report.fits());
        assert_eq!(pruned.report.final_stage(), Some("fallback"));
        assert_non_increasing(&pruned.report.stages);
    }

    #[test]
    fn stages_never_grow_estimate() {
        let mut original = board();
        original.selection_summary.nodes.push(
            Node::new("long", "TEXT")
                .with_geometry(10.0, 10.0)
                .with_text("lorem ipsum ".repeat(400)),
        );
        // Just over the cap: truncation would add more than it removes.
        original
            .selection_summary
            .nodes
            .push(Node::new("edge", "TEXT").with_text("x".repeat(101)));
        let probe = pruner(PrunerConfig::default());
        let synopsis = Synopsis::from_snapshot(&original);
        let untrimmed = probe.estimate(&synopsis, &original, "p");

        let pruned = pruner(PrunerConfig::default().with_model_token_limit(0).with_text_cap(100))
            .prune(&original, "p");
        assert!(pruned.report.stages[0].tokens <= untrimmed);
        assert_non_increasing(&pruned.report.stages);
    }

    #[test]
    fn unfittable_keeps_one_node() {
        let huge = "word ".repeat(20_000);
        let nodes = vec![
            Node::new("a", "FRAME").with_text(huge.clone()),
            Node::new("b", "STICKY").with_text(huge),
        ];
        let pruned = pruner(
            PrunerConfig::default()
                .with_model_token_limit(0)
                .with_text_cap(usize::MAX),
        )
        .prune(&Snapshot::from_nodes(nodes), "p");

        assert_eq!(pruned.report.coverage, Some(1));
        assert_eq!(pruned.snapshot.nodes()[0].id, "b");
        assert!(!pruned.report.fits());
    }

    #[test]
    fn synopsis_describes_original() {
        let original = board();
        let pruned = pruner(PrunerConfig::default().with_model_token_limit(0)).prune(&original, "p");
        assert_eq!(pruned.synopsis.selection_count, 20);
        assert_eq!(pruned.synopsis.counts_by_type["TEXT"], 15 * 20);
        assert!(pruned.snapshot.nodes().len() < 20);
    }
}
