//! Grounded answer synthesis.
//!
//! The model is confined to the supplied claims: it may phrase, it may not
//! add. An integrity post-check rejects output introducing numeric tokens
//! absent from the claims; one stricter retry runs, and if that also fails
//! the verified claims are concatenated verbatim.

use crate::error::LlmError;
use crate::llm::LlmClient;
use crate::model::{Confidence, ConfidenceLevel, VerificationStatus, VerifiedClaim};
use crate::verify::matcher::numeric_tokens;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Emitted when no claim set can answer the question, and as the answer
/// text of FAILED sessions.
pub const ABSTENTION_ANSWER: &str = "Insufficient verified evidence.";

/// Advisory note attached to low-confidence results.
pub fn advisory_notes(level: ConfidenceLevel) -> Option<String> {
    match level {
        ConfidenceLevel::Low => Some(
            "The available evidence is limited or conflicting. Further independent \
             confirmation is recommended."
                .to_string(),
        ),
        _ => None,
    }
}

/// Composes the final answer from verified claims.
pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Synthesize an answer grounded in the claim list.
    ///
    /// VERIFIED claims are used by default; UNVERIFIED ones participate
    /// only when nothing is verified, flagged as tentative. Transient LLM
    /// failures degrade to the verbatim fallback rather than erroring.
    pub async fn synthesize(
        &self,
        question: &str,
        verified_claims: &[VerifiedClaim],
        confidence: &Confidence,
    ) -> Result<String, LlmError> {
        let (claims, tentative) = select_claims(verified_claims);
        if claims.is_empty() {
            return Ok(ABSTENTION_ANSWER.to_string());
        }

        let allowed = claim_numeric_tokens(&claims);

        let prompt = build_prompt(question, &claims, confidence.level, tentative, None);
        match self.complete_checked(&prompt, &allowed).await? {
            Some(answer) => return Ok(answer),
            None => warn!("synthesis introduced unknown numerals; retrying with strict prompt"),
        }

        let strict = build_prompt(question, &claims, confidence.level, tentative, Some(&allowed));
        match self.complete_checked(&strict, &allowed).await? {
            Some(answer) => Ok(answer),
            None => {
                warn!("strict synthesis failed integrity check; falling back to verbatim claims");
                Ok(fallback_text(&claims))
            }
        }
    }

    /// One completion, integrity-checked. `Ok(None)` means the output was
    /// rejected; transient transport failures also degrade to `None` so
    /// the caller can fall back.
    async fn complete_checked(
        &self,
        prompt: &str,
        allowed: &HashSet<String>,
    ) -> Result<Option<String>, LlmError> {
        match self.llm.complete(prompt).await {
            Ok(answer) => {
                let foreign: Vec<String> = numeric_tokens(&answer)
                    .into_iter()
                    .filter(|tok| !allowed.contains(tok))
                    .collect();
                if foreign.is_empty() {
                    Ok(Some(answer))
                } else {
                    debug!(?foreign, "integrity check rejected numerals");
                    Ok(None)
                }
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "synthesis LLM call failed transiently");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// VERIFIED claims, else UNVERIFIED flagged tentative.
fn select_claims(verified_claims: &[VerifiedClaim]) -> (Vec<&VerifiedClaim>, bool) {
    let verified: Vec<&VerifiedClaim> = verified_claims
        .iter()
        .filter(|c| c.status == VerificationStatus::Verified)
        .collect();
    if !verified.is_empty() {
        return (verified, false);
    }
    let unverified: Vec<&VerifiedClaim> = verified_claims
        .iter()
        .filter(|c| c.status == VerificationStatus::Unverified)
        .collect();
    (unverified, true)
}

fn build_prompt(
    question: &str,
    claims: &[&VerifiedClaim],
    level: ConfidenceLevel,
    tentative: bool,
    allowed_numerals: Option<&HashSet<String>>,
) -> String {
    let claim_lines: String = claims
        .iter()
        .map(|c| format!("- {} (status: {})\n", c.canonical_text, c.status.as_str()))
        .collect();

    let tentative_rule = if tentative {
        "- The claims are UNCORROBORATED: present the answer as tentative\n"
    } else {
        ""
    };

    let numerals_rule = match allowed_numerals {
        Some(allowed) if !allowed.is_empty() => {
            let mut list: Vec<&str> = allowed.iter().map(String::as_str).collect();
            list.sort_unstable();
            format!(
                "- The ONLY numerals you may write are: {}\n",
                list.join(", ")
            )
        }
        Some(_) => "- You may not write ANY numerals\n".to_string(),
        None => String::new(),
    };

    format!(
        "You are a careful research summarizer.\n\
         \n\
         STRICT RULES:\n\
         - Use ONLY the claims provided below\n\
         - Do NOT add facts, numbers, or URLs that are not in the claims\n\
         - Do NOT infer or speculate beyond the claims\n\
         {tentative_rule}{numerals_rule}\
         - If the claims cannot answer the question, respond exactly:\n\
           {ABSTENTION_ANSWER}\n\
         - One short paragraph only\n\
         \n\
         Question:\n\
         {question}\n\
         \n\
         Claims:\n\
         {claim_lines}\
         \n\
         Overall confidence level: {}\n\
         \n\
         Compose a clear, honest answer based ONLY on the above.",
        level.as_str()
    )
}

/// Verbatim concatenation used when both synthesis attempts fail the
/// integrity check.
pub fn fallback_text(claims: &[&VerifiedClaim]) -> String {
    claims
        .iter()
        .map(|c| c.canonical_text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn claim_numeric_tokens(claims: &[&VerifiedClaim]) -> HashSet<String> {
    claims
        .iter()
        .flat_map(|c| numeric_tokens(&c.canonical_text))
        .collect()
}
