//! Code for representing patient queries and query results.

use indexmap::IndexMap;

use super::data::{RecommendationRule, Source};

/// Patient input: gene symbol to genotype string.
///
/// Genotypes may be diplotypes (`"*1/*2"`), single haplotypes, presence
/// tokens (`"positive"`/`"negative"`) for HLA markers, or free-text
/// phenotype labels.
pub type PatientGenotypes = IndexMap<String, String>;

/// Factors resolved for one gene of the patient.
#[derive(serde::Serialize, serde::Deserialize, PartialEq, Clone, Debug, Default)]
pub struct GeneFactors {
    /// Cross-source normalized label.
    pub factor: Option<String>,
    /// Raw label from the consortium source, against which that source's
    /// rules are written.
    pub cpic_factor: Option<String>,
    /// Numeric activity score, where the gene has one.
    pub activity_score: Option<f64>,
}

impl GeneFactors {
    /// The label that the given source's rules compare against.
    pub fn label_for(&self, source: Source) -> Option<&str> {
        match source {
            Source::Cpic => self.cpic_factor.as_deref(),
            Source::Dpwg | Source::Fda => self.factor.as_deref(),
        }
    }
}

/// Per-request factor map; every input gene appears here, unresolved genes
/// with all fields `None`.
pub type FactorMap = IndexMap<String, GeneFactors>;

/// Final query result: drug to per-source best recommendation.
pub type Recommendations = IndexMap<String, IndexMap<Source, RecommendationRule>>;
