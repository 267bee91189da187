// ============================================================
// Layer 6 — Result Tracker
// ============================================================
// Accumulates the predictions of one evaluation pass and turns
// them into classification metrics:
//
//   ACC  correct / total
//   SEN  macro recall      (mean over classes of TP / (TP + FN))
//   PRE  macro precision   (mean over classes of TP / (TP + FP))
//   F1   macro F1          (mean of the per-class F1 scores)
//   AUC  binary  → ROC AUC of the class-1 probability
//        multi   → macro one-vs-rest AUC over classes that have
//                  both positive and negative samples
//
// Macro averages run over the classes present in the labels or
// the predictions; a class with no predictions has precision 0.
//
// The tracker also carries the run state the epoch loop needs:
// current epoch, best epoch, best validation score and the test
// summary taken at that best epoch.

use std::fmt;

// ─── Phase ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Val,
    Test,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Val  => "val",
            Phase::Test => "test",
        }
    }
}

// ─── EvalSummary ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct EvalSummary {
    pub acc: f64,
    pub sen: f64,
    pub pre: f64,
    pub f1:  f64,
    pub auc: f64,
    /// `confusion[true][predicted]`
    pub confusion: Vec<Vec<usize>>,
    pub count: usize,
}

impl EvalSummary {
    /// Model-selection score: AUC, or accuracy when AUC is undefined
    /// (a split that holds a single class).
    pub fn score(&self) -> f64 {
        if self.auc.is_finite() { self.auc } else { self.acc }
    }
}

impl fmt::Display for EvalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ACC: {:.3}, SEN: {:.3}, PRE: {:.3}, F1: {:.3}, AUC: {:.3} (n={})",
            self.acc, self.sen, self.pre, self.f1, self.auc, self.count,
        )
    }
}

// ─── ResultTracker ────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ResultTracker {
    num_classes: usize,
    labels:      Vec<usize>,
    /// One probability row per sample
    probs:       Vec<Vec<f32>>,

    pub epoch:          usize,
    pub best_epoch:     usize,
    pub best_val_score: f64,
    pub test:           Option<EvalSummary>,
}

impl ResultTracker {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            labels: Vec::new(),
            probs: Vec::new(),
            epoch: 0,
            best_epoch: 0,
            best_val_score: f64::NEG_INFINITY,
            test: None,
        }
    }

    /// Forget the predictions of the previous pass.
    pub fn init(&mut self) {
        self.labels.clear();
        self.probs.clear();
    }

    /// Add one batch. `probs` is row-major `[labels.len(), num_classes]`.
    pub fn eval(&mut self, labels: &[usize], probs: &[f32]) {
        debug_assert_eq!(probs.len(), labels.len() * self.num_classes);
        self.labels.extend_from_slice(labels);
        self.probs
            .extend(probs.chunks(self.num_classes).map(|row| row.to_vec()));
    }

    pub fn summarize(&self) -> EvalSummary {
        let preds: Vec<usize> = self.probs.iter().map(|row| argmax(row)).collect();
        let confusion = confusion_matrix(&self.labels, &preds, self.num_classes);
        let (sen, pre, f1) = macro_scores(&confusion);
        EvalSummary {
            acc: accuracy(&confusion),
            sen,
            pre,
            f1,
            auc: auc(&self.labels, &self.probs, self.num_classes),
            confusion,
            count: self.labels.len(),
        }
    }

    /// Close a pass: summarise, log, and update the run state.
    ///
    /// A validation pass becomes the new best only when its score is
    /// strictly greater than every earlier one; a NaN score never is.
    pub fn print(&mut self, epoch: usize, phase: Phase) -> EvalSummary {
        let summary = self.summarize();
        self.epoch  = epoch;
        tracing::info!("{} EPOCH {epoch}: {summary}", phase.as_str().to_uppercase());
        tracing::debug!("confusion matrix: {:?}", summary.confusion);

        match phase {
            Phase::Val => {
                let score = summary.score();
                if score > self.best_val_score {
                    self.best_val_score = score;
                    self.best_epoch     = epoch;
                }
            }
            Phase::Test => self.test = Some(summary.clone()),
        }
        summary
    }

    /// True right after a validation pass that set a new best.
    pub fn is_best_epoch(&self) -> bool {
        self.epoch > 0 && self.best_epoch == self.epoch
    }

    pub fn test_auc(&self) -> f64 {
        self.test.as_ref().map_or(f64::NAN, |t| t.auc)
    }
}

// ─── Metric helpers ───────────────────────────────────────────────────────────
fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

pub fn confusion_matrix(labels: &[usize], preds: &[usize], num_classes: usize) -> Vec<Vec<usize>> {
    let mut m = vec![vec![0usize; num_classes]; num_classes];
    for (&t, &p) in labels.iter().zip(preds) {
        if t < num_classes && p < num_classes {
            m[t][p] += 1;
        }
    }
    m
}

pub fn accuracy(confusion: &[Vec<usize>]) -> f64 {
    let total: usize = confusion.iter().flatten().sum();
    if total == 0 {
        return 0.0;
    }
    let correct: usize = (0..confusion.len()).map(|i| confusion[i][i]).sum();
    correct as f64 / total as f64
}

/// (macro recall, macro precision, macro F1)
pub fn macro_scores(confusion: &[Vec<usize>]) -> (f64, f64, f64) {
    let n = confusion.len();
    let mut recall_sum    = 0.0;
    let mut precision_sum = 0.0;
    let mut f1_sum        = 0.0;
    let mut classes       = 0usize;

    for c in 0..n {
        let tp        = confusion[c][c] as f64;
        let actual    = confusion[c].iter().sum::<usize>() as f64;
        let predicted = (0..n).map(|r| confusion[r][c]).sum::<usize>() as f64;
        if actual == 0.0 && predicted == 0.0 {
            continue;
        }
        classes += 1;

        let recall    = if actual > 0.0 { tp / actual } else { 0.0 };
        let precision = if predicted > 0.0 { tp / predicted } else { 0.0 };
        let f1 = if recall + precision > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        recall_sum    += recall;
        precision_sum += precision;
        f1_sum        += f1;
    }

    if classes == 0 {
        return (0.0, 0.0, 0.0);
    }
    let k = classes as f64;
    (recall_sum / k, precision_sum / k, f1_sum / k)
}

/// Rank-based ROC AUC (Mann–Whitney U) with tied scores sharing
/// their average rank. NaN when either class is missing.
pub fn roc_auc(scores: &[f32], positive: &[bool]) -> f64 {
    let n_pos = positive.iter().filter(|&&p| p).count();
    let n_neg = positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return f64::NAN;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based; i..=j share the mean of (i+1)..=(j+1)
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        rank_sum_pos += order[i..=j].iter().filter(|&&k| positive[k]).count() as f64 * avg_rank;
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    (rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

pub fn auc(labels: &[usize], probs: &[Vec<f32>], num_classes: usize) -> f64 {
    if num_classes == 2 {
        let scores: Vec<f32>    = probs.iter().map(|r| r[1]).collect();
        let positive: Vec<bool> = labels.iter().map(|&l| l == 1).collect();
        return roc_auc(&scores, &positive);
    }

    let per_class: Vec<f64> = (0..num_classes)
        .map(|c| {
            let scores: Vec<f32>    = probs.iter().map(|r| r[c]).collect();
            let positive: Vec<bool> = labels.iter().map(|&l| l == c).collect();
            roc_auc(&scores, &positive)
        })
        .filter(|a| a.is_finite())
        .collect();

    if per_class.is_empty() {
        f64::NAN
    } else {
        per_class.iter().sum::<f64>() / per_class.len() as f64
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roc_auc_perfect_and_inverted() {
        let pos = [false, false, true, true];
        assert_eq!(roc_auc(&[0.1, 0.2, 0.8, 0.9], &pos), 1.0);
        assert_eq!(roc_auc(&[0.9, 0.8, 0.2, 0.1], &pos), 0.0);
    }

    #[test]
    fn test_roc_auc_with_ties() {
        // pairs (pos, neg): (0.5,0.5) tie → 0.5, (0.5,0.1) → 1,
        //                   (0.9,0.5) → 1,   (0.9,0.1) → 1  → 3.5 / 4
        let auc = roc_auc(&[0.1, 0.5, 0.5, 0.9], &[false, false, true, true]);
        assert!((auc - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_single_class_is_nan() {
        assert!(roc_auc(&[0.1, 0.2], &[true, true]).is_nan());
    }

    #[test]
    fn test_macro_scores_hand_computed() {
        // truth 0: predicted 0,0,1   truth 1: predicted 1
        let m = confusion_matrix(&[0, 0, 0, 1], &[0, 0, 1, 1], 2);
        assert_eq!(m, vec![vec![2, 1], vec![0, 1]]);
        assert_eq!(accuracy(&m), 0.75);

        let (sen, pre, f1) = macro_scores(&m);
        // recall    0: 2/3   1: 1
        // precision 0: 1     1: 1/2
        // f1        0: 0.8   1: 2/3
        assert!((sen - (2.0 / 3.0 + 1.0) / 2.0).abs() < 1e-12);
        assert!((pre - 0.75).abs() < 1e-12);
        assert!((f1 - (0.8 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_multiclass_auc_skips_absent_classes() {
        // class 2 never appears as a label → excluded from the macro mean
        let labels = [0, 1, 0, 1];
        let probs  = vec![
            vec![0.7, 0.2, 0.1],
            vec![0.2, 0.7, 0.1],
            vec![0.6, 0.3, 0.1],
            vec![0.1, 0.8, 0.1],
        ];
        assert_eq!(auc(&labels, &probs, 3), 1.0);
    }

    #[test]
    fn test_tracker_best_epoch_is_strictly_greater() {
        let mut t = ResultTracker::new(2);

        t.init();
        t.eval(&[0, 1], &[0.8, 0.2, 0.3, 0.7]);
        t.print(1, Phase::Val);
        assert!(t.is_best_epoch());
        assert_eq!(t.best_val_score, 1.0);

        // equal score → not a new best
        t.init();
        t.eval(&[0, 1], &[0.9, 0.1, 0.2, 0.8]);
        t.print(2, Phase::Val);
        assert!(!t.is_best_epoch());
        assert_eq!(t.best_epoch, 1);

        t.init();
        t.eval(&[0, 1], &[0.6, 0.4, 0.4, 0.6]);
        let s = t.print(2, Phase::Test);
        assert_eq!(s.count, 2);
        assert_eq!(t.test_auc(), 1.0);
    }

    #[test]
    fn test_empty_pass_never_improves() {
        let mut t = ResultTracker::new(3);
        t.init();
        let s = t.print(1, Phase::Val);
        assert!(s.auc.is_nan());
        assert_eq!(s.acc, 0.0);
        // 0.0 > -inf, so an empty first pass still counts; a later empty one does not
        assert!(t.is_best_epoch());
        t.print(2, Phase::Val);
        assert!(!t.is_best_epoch());
    }
}
