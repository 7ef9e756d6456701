//! Agglomerative clustering over one-dimensional features.
//!
//! Average linkage on a line keeps every cluster a contiguous run of the
//! sorted points, and the average distance between two such runs is the
//! distance between their means. The closest pair of clusters is therefore
//! always a pair of neighbours, which keeps each merge round linear.

/// A contiguous run of sorted points.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    len: usize,
    sum: f64,
}

impl Span {
    fn mean(&self) -> f64 {
        self.sum / self.len as f64
    }
}

/// Cluster `features` bottom-up with average linkage.
///
/// Clusters keep merging while the closest pair is strictly closer than
/// `threshold`. Returns one label per input point; labels are dense from
/// zero and ascend with feature value.
pub fn average_linkage(features: &[f64], threshold: f64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..features.len()).collect();
    order.sort_by(|&a, &b| features[a].total_cmp(&features[b]).then(a.cmp(&b)));

    let mut spans: Vec<Span> = order
        .iter()
        .enumerate()
        .map(|(pos, &idx)| Span {
            start: pos,
            len: 1,
            sum: features[idx],
        })
        .collect();

    while spans.len() > 1 {
        let (closest, distance) = spans
            .windows(2)
            .enumerate()
            .map(|(i, pair)| (i, pair[1].mean() - pair[0].mean()))
            .fold((0, f64::INFINITY), |best, cand| {
                if cand.1 < best.1 { cand } else { best }
            });

        if distance >= threshold {
            break;
        }

        let right = spans.remove(closest + 1);
        let left = &mut spans[closest];
        left.len += right.len;
        left.sum += right.sum;
    }

    let mut labels = vec![0; features.len()];
    for (label, span) in spans.iter().enumerate() {
        for &idx in &order[span.start..span.start + span.len] {
            labels[idx] = label;
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_single() {
        assert!(average_linkage(&[], 10.0).is_empty());
        assert_eq!(average_linkage(&[42.0], 10.0), vec![0]);
    }

    #[test]
    fn identical_points_merge() {
        assert_eq!(average_linkage(&[5.0, 5.0, 5.0], 1.0), vec![0, 0, 0]);
    }

    #[test]
    fn far_points_stay_apart() {
        assert_eq!(average_linkage(&[9000.0, 10.0, 4000.0], 25.0), vec![2, 0, 1]);
    }

    #[test]
    fn uses_average_not_single_linkage() {
        // {0,10} merges first (mean 5). 20 is 10 from its neighbour but 15
        // from the cluster mean, so with threshold 12 it stays separate.
        let labels = average_linkage(&[0.0, 10.0, 20.0, 1000.0], 12.0);
        assert_eq!(labels, vec![0, 0, 1, 2]);

        let labels = average_linkage(&[0.0, 10.0, 20.0, 1000.0], 25.0);
        assert_eq!(labels, vec![0, 0, 0, 1]);
    }

    #[test]
    fn threshold_is_strict() {
        assert_eq!(average_linkage(&[0.0, 25.0], 25.0), vec![0, 1]);
        assert_eq!(average_linkage(&[0.0, 24.0], 25.0), vec![0, 0]);
    }
}
