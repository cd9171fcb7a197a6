use crate::shared::rect::Rect;

/// Relative tolerance for two candidates to count as the same face.
pub const GROUP_EPS: f64 = 0.2;

/// Clusters raw multi-scale candidates into final detections.
///
/// A cluster survives only when it holds more than `min_neighbors` candidates;
/// its rect is the rounded average of its members. Surviving rects that sit
/// inside a stronger surviving rect are dropped. `min_neighbors <= 0` returns
/// the candidates untouched.
pub fn group_rectangles(candidates: &[Rect], min_neighbors: i32) -> Vec<Rect> {
    if min_neighbors <= 0 || candidates.is_empty() {
        return candidates.to_vec();
    }

    let labels = partition(candidates, GROUP_EPS);
    let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);

    let mut sums = vec![(0i64, 0i64, 0i64, 0i64); n_classes];
    let mut counts = vec![0i32; n_classes];
    for (rect, &label) in candidates.iter().zip(&labels) {
        let s = &mut sums[label];
        s.0 += rect.x as i64;
        s.1 += rect.y as i64;
        s.2 += rect.width as i64;
        s.3 += rect.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<(Rect, i32)> = sums
        .iter()
        .zip(&counts)
        .filter(|(_, n)| **n > min_neighbors)
        .map(|(s, &n)| {
            let avg = |v: i64| (v as f64 / n as f64).round() as i32;
            (Rect::new(avg(s.0), avg(s.1), avg(s.2), avg(s.3)), n)
        })
        .collect();

    let mut result = Vec::with_capacity(averaged.len());
    for (i, (r1, n1)) in averaged.iter().enumerate() {
        let swallowed = averaged.iter().enumerate().any(|(j, (r2, n2))| {
            if i == j {
                return false;
            }
            let dx = (r2.width as f64 * GROUP_EPS).round() as i32;
            let dy = (r2.height as f64 * GROUP_EPS).round() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.right() <= r2.right() + dx
                && r1.bottom() <= r2.bottom() + dy
                && (*n2 > (*n1).max(3) || *n1 < 3)
        });
        if !swallowed {
            result.push(*r1);
        }
    }
    result
}

fn similar(a: &Rect, b: &Rect, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    ((a.x - b.x).abs() as f64) <= delta
        && ((a.y - b.y).abs() as f64) <= delta
        && ((a.right() - b.right()).abs() as f64) <= delta
        && ((a.bottom() - b.bottom()).abs() as f64) <= delta
}

/// Union-find over the similarity relation; returns dense class labels
/// numbered in order of first appearance.
fn partition(rects: &[Rect], eps: f64) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..rects.len()).collect();

    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if similar(&rects[i], &rects[j], eps) {
                let (ri, rj) = (root(&mut parent, i), root(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    let mut labels = vec![0; rects.len()];
    let mut dense: Vec<Option<usize>> = vec![None; rects.len()];
    let mut next = 0;
    for (i, label) in labels.iter_mut().enumerate() {
        let r = root(&mut parent, i);
        *label = *dense[r].get_or_insert_with(|| {
            next += 1;
            next - 1
        });
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn jittered(x: i32, y: i32, size: i32, n: usize) -> Vec<Rect> {
        (0..n)
            .map(|i| {
                let j = (i % 3) as i32 - 1;
                Rect::new(x + j, y - j, size + j, size)
            })
            .collect()
    }

    #[test]
    fn test_zero_neighbors_returns_candidates() {
        let candidates = vec![Rect::new(0, 0, 10, 10), Rect::new(1, 1, 10, 10)];
        assert_eq!(group_rectangles(&candidates, 0), candidates);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_rectangles(&[], 3).is_empty());
    }

    #[rstest]
    #[case::enough_support(6, 5, 1)]
    #[case::exactly_threshold(5, 5, 0)]
    #[case::low_threshold(3, 1, 1)]
    fn test_cluster_needs_more_than_min_neighbors(
        #[case] n: usize,
        #[case] min_neighbors: i32,
        #[case] expected: usize,
    ) {
        let candidates = jittered(100, 100, 60, n);
        assert_eq!(group_rectangles(&candidates, min_neighbors).len(), expected);
    }

    #[test]
    fn test_cluster_rect_is_average() {
        let candidates = vec![
            Rect::new(100, 100, 60, 60),
            Rect::new(102, 98, 62, 60),
            Rect::new(98, 102, 58, 60),
        ];
        let grouped = group_rectangles(&candidates, 2);
        assert_eq!(grouped, vec![Rect::new(100, 100, 60, 60)]);
    }

    #[test]
    fn test_separate_faces_form_separate_clusters() {
        let mut candidates = jittered(20, 20, 50, 4);
        candidates.extend(jittered(300, 40, 50, 4));
        let grouped = group_rectangles(&candidates, 2);
        assert_eq!(grouped.len(), 2);
        assert!(grouped.iter().any(|r| r.x < 50));
        assert!(grouped.iter().any(|r| r.x > 250));
    }

    #[test]
    fn test_weaker_nested_cluster_is_suppressed() {
        let mut candidates = jittered(100, 100, 120, 10);
        candidates.extend(jittered(140, 140, 30, 4));
        let grouped = group_rectangles(&candidates, 3);
        assert_eq!(grouped.len(), 1);
        assert!(grouped[0].width > 100);
    }

    #[test]
    fn test_partition_labels_are_dense() {
        let rects = vec![
            Rect::new(0, 0, 10, 10),
            Rect::new(500, 500, 10, 10),
            Rect::new(0, 0, 10, 10),
        ];
        assert_eq!(partition(&rects, GROUP_EPS), vec![0, 1, 0]);
    }
}
