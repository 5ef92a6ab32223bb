//! Cross-source claim verification and the attempt-level decision.
//!
//! Groups semantically-equivalent claims, labels each group by domain
//! diversity and polarity agreement, and recommends the planner's next
//! action. The planner remains the authority on actual budget; this
//! module only sees the attempt counters it is handed.

use crate::config::PlannerConfig;
use crate::model::{
    Claim, DecisionOutcome, Polarity, VerificationDecision, VerificationStatus, VerifiedClaim,
};
use crate::verify::matcher::{group_by_similarity, numeric_tokens};
use crate::web::{host_of, registered_domain};
use std::collections::HashSet;
use tracing::debug;

/// Labels claim groups and recommends ACCEPT / RETRY / STOP.
pub struct VerificationEngine {
    similarity_threshold: f64,
    min_verified: u32,
}

impl VerificationEngine {
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            min_verified: config.min_verified,
        }
    }

    /// Group and label the full claim set of one attempt. Output order
    /// follows first claim occurrence.
    pub fn verify(&self, claims: &[Claim]) -> Vec<VerifiedClaim> {
        if claims.is_empty() {
            return Vec::new();
        }

        let texts: Vec<&str> = claims.iter().map(|c| c.text.as_str()).collect();
        let groups = group_by_similarity(&texts, self.similarity_threshold);

        groups
            .into_iter()
            .map(|members| self.resolve_group(claims, &members))
            .collect()
    }

    fn resolve_group(&self, claims: &[Claim], members: &[usize]) -> VerifiedClaim {
        let affirm: Vec<&Claim> = members
            .iter()
            .map(|&i| &claims[i])
            .filter(|c| c.polarity == Polarity::Affirm)
            .collect();
        let negate: Vec<&Claim> = members
            .iter()
            .map(|&i| &claims[i])
            .filter(|c| c.polarity == Polarity::Negate)
            .collect();
        let unspecified: Vec<&Claim> = members
            .iter()
            .map(|&i| &claims[i])
            .filter(|c| c.polarity == Polarity::Unspecified)
            .collect();

        // Canonical polarity follows the majority stance; unspecified
        // claims join the supporting side.
        let negate_majority = negate.len() > affirm.len();
        let (mut supporting, mut opposing) = if negate_majority {
            (negate.clone(), affirm.clone())
        } else {
            (affirm.clone(), negate.clone())
        };
        supporting.extend(unspecified.iter().copied());

        let polarity_conflict = !affirm.is_empty() && !negate.is_empty();

        // Same-stance claims can still disagree on the numbers: two
        // claims with numerals sharing none are opposing assertions.
        let mut numeric_conflict = false;
        if !polarity_conflict {
            if let Some(reference) = supporting
                .iter()
                .map(|c| numeric_tokens(&c.text))
                .find(|tokens| !tokens.is_empty())
            {
                let (agreeing, disagreeing): (Vec<&Claim>, Vec<&Claim>) =
                    supporting.into_iter().partition(|c| {
                        let tokens = numeric_tokens(&c.text);
                        tokens.is_empty() || !tokens.is_disjoint(&reference)
                    });
                numeric_conflict = !disagreeing.is_empty();
                supporting = agreeing;
                opposing.extend(disagreeing);
            }
        }

        let supporting_urls = dedup_urls(&supporting);
        let opposing_urls = dedup_urls(&opposing);
        let domain_count = distinct_domains(&supporting) as u32;

        let status = if polarity_conflict || numeric_conflict {
            VerificationStatus::Conflict
        } else if domain_count >= 2 {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Unverified
        };

        VerifiedClaim {
            canonical_text: claims[members[0]].text.clone(),
            status,
            supporting_urls,
            opposing_urls,
            domain_count,
        }
    }

    /// Recommend the planner's next action for this attempt.
    pub fn decide(
        &self,
        verified: &[VerifiedClaim],
        attempt: u32,
        max_attempts: u32,
    ) -> DecisionOutcome {
        let budget_remains = attempt < max_attempts;

        if verified.is_empty() {
            return if budget_remains {
                DecisionOutcome {
                    decision: VerificationDecision::Retry,
                    reason: "No verifiable claims were found. Additional sources may help."
                        .to_string(),
                    recommendation: Some("Search broader or alternative sources.".to_string()),
                }
            } else {
                DecisionOutcome {
                    decision: VerificationDecision::Stop,
                    reason: "No verifiable claims could be found after repeated attempts."
                        .to_string(),
                    recommendation: None,
                }
            };
        }

        let verified_count = count_status(verified, VerificationStatus::Verified);
        let conflict_count = count_status(verified, VerificationStatus::Conflict);
        let total_domains = total_distinct_domains(verified);

        debug!(
            groups = verified.len(),
            verified_count, conflict_count, total_domains, attempt, "verification decision inputs"
        );

        if conflict_count == 0 {
            let accepted = if verified.len() >= 2 {
                verified_count >= self.min_verified as usize
            } else {
                // With a single group, demand broader corroboration.
                verified
                    .iter()
                    .any(|c| c.status == VerificationStatus::Verified && c.domain_count >= 3)
            };
            if accepted {
                return DecisionOutcome {
                    decision: VerificationDecision::Accept,
                    reason: format!(
                        "{verified_count} claim group(s) verified across {total_domains} \
                         independent domain(s) with no conflicts."
                    ),
                    recommendation: None,
                };
            }
        }

        let retry_worthwhile = verified_count == 0 && (conflict_count > 0 || total_domains < 3);
        if retry_worthwhile && budget_remains {
            return if conflict_count > 0 {
                DecisionOutcome {
                    decision: VerificationDecision::Retry,
                    reason: "Sources provide conflicting evidence. Further verification may \
                             resolve discrepancies."
                        .to_string(),
                    recommendation: Some("Seek additional independent sources.".to_string()),
                }
            } else {
                DecisionOutcome {
                    decision: VerificationDecision::Retry,
                    reason: "The conclusion rests on limited evidence. Additional independent \
                             sources may improve confidence."
                        .to_string(),
                    recommendation: Some(
                        "Search for authoritative or corroborating sources.".to_string(),
                    ),
                }
            };
        }

        let reason = if conflict_count > 0 {
            "Conflicting evidence persists despite verification attempts.".to_string()
        } else if !budget_remains {
            "Maximum verification attempts reached without sufficient corroboration.".to_string()
        } else {
            "Evidence is stable but below the acceptance bar; further searching is unlikely \
             to improve it."
                .to_string()
        };
        DecisionOutcome {
            decision: VerificationDecision::Stop,
            reason,
            recommendation: None,
        }
    }
}

fn count_status(verified: &[VerifiedClaim], status: VerificationStatus) -> usize {
    verified.iter().filter(|c| c.status == status).count()
}

fn dedup_urls(claims: &[&Claim]) -> Vec<String> {
    let mut seen = HashSet::new();
    claims
        .iter()
        .filter(|c| seen.insert(c.source_url.clone()))
        .map(|c| c.source_url.clone())
        .collect()
}

fn distinct_domains(claims: &[&Claim]) -> usize {
    claims
        .iter()
        .map(|c| c.source_domain.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Distinct registered domains across every group's supporting sources.
pub fn total_distinct_domains(verified: &[VerifiedClaim]) -> usize {
    verified
        .iter()
        .flat_map(|c| c.supporting_urls.iter())
        .filter_map(|url| host_of(url))
        .map(|host| registered_domain(&host))
        .collect::<HashSet<_>>()
        .len()
}
