//! Distance to confidence mapping.
//!
//! `confidence = clamp(1 - distance / 2, 0, 1) * 100`, rounded to one
//! decimal. This assumes distances fall roughly in `[0, 2]`, which holds for
//! L2 distance between unit-length embeddings. Anything outside clamps. The
//! score is a ranking aid, not a probability.

use serde::Serialize;

/// Scores at or above this are [`Badge::High`].
pub const HIGH_THRESHOLD: f32 = 70.0;
/// Scores at or above this (and below [`HIGH_THRESHOLD`]) are [`Badge::Medium`].
pub const MEDIUM_THRESHOLD: f32 = 40.0;

/// Map a raw vector distance into `[0, 100]`.
pub fn to_confidence(distance: f32) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    let fraction = (1.0 - distance / 2.0).clamp(0.0, 1.0);
    (fraction * 1000.0).round() / 10.0
}

/// Confidence tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Badge {
    Low,
    Medium,
    High,
}

impl Badge {
    pub fn for_score(score: f32) -> Self {
        if score >= HIGH_THRESHOLD {
            Badge::High
        } else if score >= MEDIUM_THRESHOLD {
            Badge::Medium
        } else {
            Badge::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::High => "HIGH",
            Badge::Medium => "MEDIUM",
            Badge::Low => "LOW",
        }
    }

    /// Low scores should be surfaced to whoever reviews the draft.
    pub fn needs_warning(&self) -> bool {
        *self == Badge::Low
    }
}

impl std::fmt::Display for Badge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shorthand for [`Badge::for_score`].
pub fn badge(score: f32) -> Badge {
    Badge::for_score(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_endpoints() {
        assert_eq!(to_confidence(0.0), 100.0);
        assert_eq!(to_confidence(2.0), 0.0);
        assert_eq!(to_confidence(1.0), 50.0);
    }

    #[test]
    fn test_out_of_range_clamps() {
        assert_eq!(to_confidence(-0.5), 100.0);
        assert_eq!(to_confidence(3.7), 0.0);
        assert_eq!(to_confidence(f32::NAN), 0.0);
    }

    #[test]
    fn test_linear_between_endpoints() {
        assert_eq!(to_confidence(0.3), 85.0);
        assert_eq!(to_confidence(1.5), 25.0);
        assert_eq!(to_confidence(0.5), 75.0);
    }

    #[test]
    fn test_badge_boundaries() {
        assert_eq!(badge(39.9), Badge::Low);
        assert_eq!(badge(40.0), Badge::Medium);
        assert_eq!(badge(69.9), Badge::Medium);
        assert_eq!(badge(70.0), Badge::High);
        assert_eq!(badge(0.0), Badge::Low);
        assert_eq!(badge(100.0), Badge::High);
        assert!(Badge::Low.needs_warning());
        assert!(!Badge::Medium.needs_warning());
    }

    proptest! {
        #[test]
        fn prop_confidence_bounded(d in 0.0f32..=2.0) {
            let c = to_confidence(d);
            prop_assert!((0.0..=100.0).contains(&c));
        }

        #[test]
        fn prop_confidence_non_increasing(a in 0.0f32..=2.0, b in 0.0f32..=2.0) {
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(to_confidence(near) >= to_confidence(far));
        }

        #[test]
        fn prop_badge_is_monotone(a in 0.0f32..=100.0, b in 0.0f32..=100.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(badge(lo) <= badge(hi));
        }
    }
}
