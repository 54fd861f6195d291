//! String similarity scores on a 0-100 scale
//!
//! Three views of similarity are combined: whole-string edit similarity, best
//! substring window, and token-order-insensitive. Provider names vary mostly by
//! extra qualifiers ("Comcast" vs "Comcast Business Class") and word order, so
//! taking the maximum catches both.

use serde::{Deserialize, Serialize};

/// Edit-distance similarity of the whole strings
pub fn ratio(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    to_score(strsim::normalized_levenshtein(a, b))
}

/// Best similarity of the shorter string against every same-length window of the longer
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (shorter, longer) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };

    if shorter.is_empty() {
        return 0;
    }
    if shorter.len() == longer.len() {
        return ratio(a, b);
    }

    let needle: String = shorter.iter().collect();
    let mut best = 0.0_f64;
    for window in longer.windows(shorter.len()) {
        let candidate: String = window.iter().collect();
        let score = strsim::normalized_levenshtein(&needle, &candidate);
        if score > best {
            best = score;
            if best >= 1.0 {
                break;
            }
        }
    }
    to_score(best)
}

/// Similarity after sorting whitespace-separated tokens
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Maximum of the three scores
pub fn combined_score(a: &str, b: &str) -> u8 {
    ratio(a, b).max(partial_ratio(a, b)).max(token_sort_ratio(a, b))
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn to_score(similarity: f64) -> u8 {
    (similarity * 100.0).round().clamp(0.0, 100.0) as u8
}

/// How a combined score is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuzzyVerdict {
    Match,
    /// Close enough to surface for manual mapping, not enough to confirm
    PossibleMatch,
    NoMatch,
}

/// Score bands; both bounds are inclusive lower bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyThresholds {
    pub match_at: u8,
    pub possible_at: u8,
}

impl Default for FuzzyThresholds {
    fn default() -> Self {
        Self {
            match_at: 80,
            possible_at: 60,
        }
    }
}

impl FuzzyThresholds {
    pub fn classify(&self, score: u8) -> FuzzyVerdict {
        if score >= self.match_at {
            FuzzyVerdict::Match
        } else if score >= self.possible_at {
            FuzzyVerdict::PossibleMatch
        } else {
            FuzzyVerdict::NoMatch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_100() {
        assert_eq!(ratio("comcast", "comcast"), 100);
        assert_eq!(combined_score("at&t", "at&t"), 100);
    }

    #[test]
    fn empty_input_scores_zero() {
        assert_eq!(ratio("", "comcast"), 0);
        assert_eq!(partial_ratio("comcast", ""), 0);
        assert_eq!(combined_score("", ""), 0);
    }

    #[test]
    fn partial_ratio_finds_embedded_name() {
        assert_eq!(partial_ratio("comcast", "comcast business class"), 100);
        assert!(ratio("comcast", "comcast business class") < 50);
    }

    #[test]
    fn token_sort_ignores_word_order() {
        assert_eq!(token_sort_ratio("business verizon", "verizon business"), 100);
    }

    #[test]
    fn unrelated_names_score_low() {
        assert!(combined_score("cox", "frontier") < 60);
    }

    #[test]
    fn boundary_scores_classify_inclusively() {
        let thresholds = FuzzyThresholds::default();
        assert_eq!(thresholds.classify(80), FuzzyVerdict::Match);
        assert_eq!(thresholds.classify(79), FuzzyVerdict::PossibleMatch);
        assert_eq!(thresholds.classify(60), FuzzyVerdict::PossibleMatch);
        assert_eq!(thresholds.classify(59), FuzzyVerdict::NoMatch);
    }

    #[test]
    fn thresholds_are_tunable() {
        let relaxed = FuzzyThresholds {
            match_at: 70,
            possible_at: 50,
        };
        assert_eq!(relaxed.classify(72), FuzzyVerdict::Match);
        assert_eq!(relaxed.classify(55), FuzzyVerdict::PossibleMatch);
    }
}
