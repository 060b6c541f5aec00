//! Apply one source's recommendation rules for a drug to a patient's
//! derived factors.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::common::words_to_sentence;
use crate::recommend::schema::data::{Factor, RecommendationRule, ScoreOp, Source};
use crate::recommend::schema::query::{FactorMap, GeneFactors};

/// Determine whether the rule's factor requirements are all satisfied.
///
/// An empty patient factor map matches nothing, including unconditional
/// rules: absence of genotype information must never trigger a drug's
/// default recommendation.
pub fn passes(source: Source, rule: &RecommendationRule, factors: &FactorMap) -> bool {
    if factors.is_empty() {
        return false;
    }

    rule.factors.iter().all(|(gene, required)| {
        factors
            .get(gene)
            .map_or(false, |patient| satisfies(source, patient, required.as_ref()))
    })
}

/// Test a patient's values for one gene against one required factor.
fn satisfies(source: Source, patient: &GeneFactors, required: Option<&Factor>) -> bool {
    match required {
        None => patient.label_for(source).is_none(),
        Some(Factor::Score(op, value)) => match patient.activity_score {
            Some(score) => match op {
                ScoreOp::Eq => score == *value,
                ScoreOp::Geq => score >= *value,
            },
            None => false,
        },
        Some(Factor::Label(label)) => patient.label_for(source) == Some(label.as_str()),
    }
}

/// Pick the most specific of the matching rules: the one requiring the most
/// genes; the first rule in source order wins ties.
pub fn best_recommendation<'a>(
    matched: impl IntoIterator<Item = &'a RecommendationRule>,
) -> Option<&'a RecommendationRule> {
    let mut best: Option<&RecommendationRule> = None;
    for rule in matched {
        if best.map_or(true, |b| rule.factors.len() > b.factors.len()) {
            best = Some(rule);
        }
    }
    best
}

/// Match one source's rules for a drug against the patient's factors.
///
/// Returns the best matching rule; when nothing matches but the drug has
/// rules in this source and the patient lacks factors for some of the genes
/// those rules reference, a rule-shaped "more genotyping needed" response
/// naming the missing genes is synthesized instead.  When the patient has
/// every referenced gene typed and still nothing matches, no result is
/// emitted.
pub fn match_source(
    source: Source,
    rules: &[RecommendationRule],
    factors: &FactorMap,
) -> Option<RecommendationRule> {
    let matched = rules.iter().filter(|rule| passes(source, rule, factors));
    if let Some(best) = best_recommendation(matched) {
        return Some(best.clone());
    }

    let first_rule = rules.first()?;

    let referenced: BTreeSet<&String> = rules.iter().flat_map(|rule| rule.factors.keys()).collect();
    let genes_missing: Vec<String> = referenced
        .iter()
        .filter(|gene| !factors.contains_key(gene.as_str()))
        .map(|gene| gene.to_string())
        .collect();
    if genes_missing.is_empty() {
        return None;
    }

    Some(RecommendationRule {
        factors: IndexMap::new(),
        recommendation: format!(
            "Recommendations are available, but they require genotypes of following genes: {}",
            words_to_sentence(&genes_missing)
        ),
        strength: None,
        guideline: first_rule.guideline.clone(),
    })
}
