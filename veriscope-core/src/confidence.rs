//! Rule-based confidence scoring.
//!
//! A pure function of the verified claim list. The reason strings are
//! deterministic templates citing the counts that produced the level; no
//! LLM is involved.

use crate::model::{Confidence, ConfidenceLevel, VerificationStatus, VerifiedClaim};
use crate::verify::total_distinct_domains;

/// Scores aggregate confidence for one attempt's verified claims.
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    /// `(level, reason)` for the claim list. Same input, same output.
    pub fn score(verified: &[VerifiedClaim]) -> Confidence {
        if verified.is_empty() {
            return Confidence {
                level: ConfidenceLevel::Low,
                reason: "No verified claims available.".to_string(),
            };
        }

        let verified_count = verified
            .iter()
            .filter(|c| c.status == VerificationStatus::Verified)
            .count();
        let conflict_count = verified
            .iter()
            .filter(|c| c.status == VerificationStatus::Conflict)
            .count();
        let unverified_count = verified
            .iter()
            .filter(|c| c.status == VerificationStatus::Unverified)
            .count();
        let domains = total_distinct_domains(verified);

        if conflict_count > 0 {
            return Confidence {
                level: ConfidenceLevel::Low,
                reason: format!(
                    "Conflicting evidence detected in {conflict_count} claim group(s)."
                ),
            };
        }

        if verified_count >= 2 && domains >= 3 {
            return Confidence {
                level: ConfidenceLevel::High,
                reason: format!(
                    "{verified_count} claim groups verified across {domains} independent \
                     domains with no conflicts."
                ),
            };
        }

        if verified_count >= 1 {
            return Confidence {
                level: ConfidenceLevel::Medium,
                reason: format!(
                    "{verified_count} verified claim group(s) across {domains} domain(s), \
                     with {unverified_count} group(s) lacking corroboration."
                ),
            };
        }

        Confidence {
            level: ConfidenceLevel::Low,
            reason: format!(
                "No claim group reached multi-source verification ({unverified_count} \
                 single-source group(s))."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vclaim(status: VerificationStatus, urls: &[&str]) -> VerifiedClaim {
        VerifiedClaim {
            canonical_text: "c".to_string(),
            status,
            supporting_urls: urls.iter().map(|u| u.to_string()).collect(),
            opposing_urls: vec![],
            domain_count: urls.len() as u32,
        }
    }

    #[test]
    fn empty_is_low() {
        let confidence = ConfidenceScorer::score(&[]);
        assert_eq!(confidence.level, ConfidenceLevel::Low);
    }

    #[test]
    fn any_conflict_forces_low() {
        let verified = vec![
            vclaim(
                VerificationStatus::Verified,
                &["https://a.gov/", "https://b.com/", "https://c.org/"],
            ),
            vclaim(VerificationStatus::Conflict, &["https://d.net/"]),
        ];
        let confidence = ConfidenceScorer::score(&verified);
        assert_eq!(confidence.level, ConfidenceLevel::Low);
        assert!(confidence.reason.contains("Conflicting"));
    }

    #[test]
    fn broad_agreement_is_high() {
        let verified = vec![
            vclaim(
                VerificationStatus::Verified,
                &["https://a.gov/", "https://b.com/"],
            ),
            vclaim(
                VerificationStatus::Verified,
                &["https://b.com/", "https://c.org/"],
            ),
        ];
        let confidence = ConfidenceScorer::score(&verified);
        assert_eq!(confidence.level, ConfidenceLevel::High);
        assert!(confidence.reason.contains("2 claim groups"));
        assert!(confidence.reason.contains("3 independent domains"));
    }

    #[test]
    fn narrow_agreement_is_medium() {
        let verified = vec![
            vclaim(
                VerificationStatus::Verified,
                &["https://a.gov/", "https://b.com/"],
            ),
            vclaim(VerificationStatus::Unverified, &["https://a.gov/"]),
        ];
        let confidence = ConfidenceScorer::score(&verified);
        assert_eq!(confidence.level, ConfidenceLevel::Medium);
    }

    #[test]
    fn all_single_source_is_low() {
        let verified = vec![
            vclaim(VerificationStatus::Unverified, &["https://a.gov/"]),
            vclaim(VerificationStatus::Unverified, &["https://b.com/"]),
        ];
        let confidence = ConfidenceScorer::score(&verified);
        assert_eq!(confidence.level, ConfidenceLevel::Low);
    }

    #[test]
    fn scoring_is_pure() {
        let verified = vec![vclaim(
            VerificationStatus::Verified,
            &["https://a.gov/", "https://b.com/"],
        )];
        assert_eq!(
            ConfidenceScorer::score(&verified),
            ConfidenceScorer::score(&verified)
        );
    }
}
