//! Set-overlap measures used by name similarity.

use std::collections::BTreeSet;

/// Jaccard index |A ∩ B| / |A ∪ B|. Two empty sets score 0.0.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Jaccard index where membership is decided by `same` instead of equality.
///
/// Each element of `a` is greedily paired with at most one unpaired element
/// of `b`, so the intersection never exceeds `min(|a|, |b|)`.
pub fn soft_jaccard<F>(a: &[&str], b: &[&str], same: F) -> f64
where
    F: Fn(&str, &str) -> bool,
{
    let a = dedup(a);
    let b = dedup(b);
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }

    let mut used = vec![false; b.len()];
    let mut matched = 0usize;
    for x in &a {
        if let Some(pos) = (0..b.len()).find(|&j| !used[j] && same(x, b[j])) {
            used[pos] = true;
            matched += 1;
        }
    }

    let union = a.len() + b.len() - matched;
    matched as f64 / union as f64
}

fn dedup<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    let mut seen = BTreeSet::new();
    tokens.iter().copied().filter(|t| seen.insert(*t)).collect()
}

/// Clamp a score into [0, 1], mapping NaN to 0.
pub fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
