/// Area under the ROC curve of `scores` against binary `labels` (a label `>= 0.5` is a
/// positive).
///
/// Tied scores count as half a correctly ranked pair, so the result equals the Mann-Whitney
/// statistic normalized by the amount of positive-negative pairs.
///
/// # Returns
/// `None` if the inputs are empty, have different lengths, or hold a single class.
pub fn roc_auc(scores: &[f32], labels: &[f32]) -> Option<f64> {
    let n = scores.len();
    if n == 0 || labels.len() != n {
        return None;
    }

    let mut items: Vec<(f32, bool)> = scores
        .iter()
        .zip(labels)
        .map(|(&s, &y)| (s, y >= 0.5))
        .collect();
    items.sort_by(|a, b| a.0.total_cmp(&b.0));

    let pos = items.iter().filter(|(_, y)| *y).count() as f64;
    let neg = n as f64 - pos;
    if pos == 0. || neg == 0. {
        return None;
    }

    let mut correct = 0.0f64;
    let mut neg_below = 0.0f64;
    let mut i = 0;

    while i < n {
        let score = items[i].0;
        let mut j = i;
        let (mut pos_tied, mut neg_tied) = (0.0f64, 0.0f64);

        while j < n && items[j].0.total_cmp(&score).is_eq() {
            match items[j].1 {
                true => pos_tied += 1.,
                false => neg_tied += 1.,
            }
            j += 1;
        }

        correct += pos_tied * neg_below + 0.5 * pos_tied * neg_tied;
        neg_below += neg_tied;
        i = j;
    }

    Some(correct / (pos * neg))
}
