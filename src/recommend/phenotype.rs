//! Resolution of patient genotypes into per-gene factors.

use crate::recommend::factor;
use crate::recommend::genotype;
use crate::recommend::schema::data::{Database, Source};
use crate::recommend::schema::query::{FactorMap, GeneFactors, PatientGenotypes};

/// Resolve each patient gene to its factors against the database's
/// per-source phenotype indices.
///
/// The consortium source is primary: its hit provides the raw label and the
/// activity score, and the raw label is mapped through the cross-source
/// vocabulary.  When no cross-source factor resolved that way, the lookup
/// falls through to the working group and agency indices, which carry
/// labels only.  A gene that resolves nowhere keeps all fields `None`;
/// this is not an error but "insufficient genotype data".
pub fn phenotype(genotypes: &PatientGenotypes, db: &Database) -> FactorMap {
    let mut result = FactorMap::new();

    for (gene, genotype) in genotypes {
        let mut factors = GeneFactors::default();

        for index in genotype::genotype_indexes(gene, genotype) {
            if factors.factor.is_some() && factors.cpic_factor.is_some() {
                break;
            }

            if factors.cpic_factor.is_none() {
                if let Some(entry) = db.phenotype_index(Source::Cpic).get(&index) {
                    factors.cpic_factor = entry.label.clone();
                    factors.activity_score = entry.activity_score;
                    factors.factor = entry
                        .label
                        .as_deref()
                        .and_then(factor::label_to_factor)
                        .map(String::from);
                }
            }

            if factors.factor.is_none() {
                if let Some(entry) = db.phenotype_index(Source::Dpwg).get(&index) {
                    factors.factor = entry.label.clone();
                } else if let Some(entry) = db.phenotype_index(Source::Fda).get(&index) {
                    factors.factor = entry.label.clone();
                }
            }
        }

        tracing::trace!("gene {} resolved to {:?}", gene, &factors);
        result.insert(gene.clone(), factors);
    }

    result
}
