//! Code for representing the recommendation database.
//!
//! The on-disk snapshot is JSON (optionally gzip-compressed) with one block
//! per guideline source, each carrying the per-drug recommendation rules and
//! the per-gene genotype encoding tables.  After deserialization the snapshot
//! is converted into a `Database` which additionally owns the flat phenotype
//! lookup indices; everything is immutable from then on.

use std::path::Path;

use indexmap::IndexMap;
use itertools::Itertools;
use strum::IntoEnumIterator;

use crate::recommend::factor;

/// The three guideline sources backing the recommendation database.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    Debug,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Source {
    /// Consortium guideline database (CPIC).
    Cpic,
    /// Dutch pharmacogenetics working group database (DPWG).
    Dpwg,
    /// Regulatory agency labeling database (FDA).
    Fda,
}

/// Strength grade attached to a recommendation rule.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    Debug,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Strength {
    /// Strong recommendation.
    Strong,
    /// Moderate recommendation.
    Moderate,
    /// Optional recommendation.
    Optional,
}

/// Comparison operator of an activity score requirement.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub enum ScoreOp {
    /// Exact score, rendered as `==`.
    Eq,
    /// Lower bound, rendered as `>=`; arises from "at least N copies" notation.
    Geq,
}

impl std::fmt::Display for ScoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreOp::Eq => write!(f, "=="),
            ScoreOp::Geq => write!(f, ">="),
        }
    }
}

/// Canonical, comparable encoding of a gene's state.
///
/// Replaces the historical stringly-typed representation where `"== 2.00"`,
/// `">= 1.50"` and `"poor metabolizer"` all travelled as plain strings that
/// had to be prefix-sniffed at every comparison site.  The legacy string
/// forms are kept on the wire via `Display`/`FromStr`.
#[derive(PartialEq, Clone, Debug)]
pub enum Factor {
    /// Categorical phenotype or presence label, e.g. `"poor metabolizer"`.
    Label(String),
    /// Activity score requirement, e.g. `== 2.00` or `>= 4.00`.
    Score(ScoreOp, f64),
}

impl std::fmt::Display for Factor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Factor::Label(label) => f.write_str(label),
            Factor::Score(op, value) => write!(f, "{} {:.2}", op, value),
        }
    }
}

impl From<&str> for Factor {
    fn from(value: &str) -> Self {
        for (op, prefix) in [(ScoreOp::Eq, "=="), (ScoreOp::Geq, ">=")] {
            if let Some(rest) = value.strip_prefix(prefix) {
                if let Ok(score) = rest.trim().parse::<f64>() {
                    return Factor::Score(op, score);
                }
            }
        }
        Factor::Label(value.to_string())
    }
}

impl std::str::FromStr for Factor {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Factor::from(s))
    }
}

impl serde::Serialize for Factor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Factor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Ok(Factor::from(s.as_str()))
    }
}

/// One value of a genotype encoding table entry.
#[derive(serde::Serialize, serde::Deserialize, PartialEq, Clone, Debug)]
#[serde(untagged)]
pub enum Encoding {
    /// Numeric activity score assigned to the genotype.
    Score(f64),
    /// Raw phenotype or presence label assigned to the genotype.
    Label(String),
    /// No usable result for this genotype.
    Unknown,
}

/// One recommendation rule of a (source, drug) pair.
///
/// An empty `factors` map means the rule is the unconditional default for
/// its drug in its source.  The synthesized "more genotyping needed"
/// fallback reuses this shape with empty factors and no strength.
#[serde_with::skip_serializing_none]
#[derive(serde::Serialize, serde::Deserialize, PartialEq, Clone, Debug, Default)]
pub struct RecommendationRule {
    /// Required factor per gene symbol; `None` requires the gene to have no
    /// resolved factor.
    #[serde(default)]
    pub factors: IndexMap<String, Option<Factor>>,
    /// Recommendation text.
    pub recommendation: String,
    /// Strength grade; absent for sources that do not grade their rules.
    #[serde(default)]
    pub strength: Option<Strength>,
    /// URL of the guideline the rule was derived from.
    pub guideline: String,
}

/// Rules and encoding tables of one guideline source, as stored in the
/// snapshot.
#[derive(serde::Serialize, serde::Deserialize, PartialEq, Clone, Debug, Default)]
pub struct SourceData {
    /// Recommendation rules by drug name.
    #[serde(default)]
    pub recommendations: IndexMap<String, Vec<RecommendationRule>>,
    /// Genotype-to-factor encoding tables by gene symbol.
    #[serde(default)]
    pub encodings: IndexMap<String, IndexMap<String, Vec<Encoding>>>,
}

/// The full database snapshot as produced by the ETL jobs.
#[derive(serde::Serialize, serde::Deserialize, PartialEq, Clone, Debug, Default)]
pub struct Snapshot {
    /// Consortium guideline data.
    #[serde(default)]
    pub cpic: SourceData,
    /// Working group guideline data.
    #[serde(default)]
    pub dpwg: SourceData,
    /// Regulatory agency labeling data.
    #[serde(default)]
    pub fda: SourceData,
}

/// Resolved encoding of one genotype index key.
#[derive(PartialEq, Clone, Debug, Default)]
pub struct PhenotypeEntry {
    /// Raw phenotype or presence label, if any.
    pub label: Option<String>,
    /// Numeric activity score, if any.
    pub activity_score: Option<f64>,
}

/// Flat per-source lookup from `"GENE:genotype_key"` to the resolved
/// encoding entry.
pub type PhenotypeIndex = IndexMap<String, PhenotypeEntry>;

/// Fully loaded recommendation database.
///
/// Construction re-normalizes all rule factors (idempotent on clean ETL
/// output, loud on stale vocabulary) and precomputes the per-source
/// phenotype indices.  Immutable afterwards; share by reference.
#[derive(Clone, Debug, Default)]
pub struct Database {
    /// The snapshot with normalized rule factors.
    snapshot: Snapshot,
    /// Phenotype index of the consortium source.
    cpic_index: PhenotypeIndex,
    /// Phenotype index of the working group source.
    dpwg_index: PhenotypeIndex,
    /// Phenotype index of the regulatory agency source.
    fda_index: PhenotypeIndex,
}

impl Database {
    /// Build a database from an in-memory snapshot.
    pub fn new(mut snapshot: Snapshot) -> Result<Self, anyhow::Error> {
        for source in Source::iter() {
            let data = match source {
                Source::Cpic => &mut snapshot.cpic,
                Source::Dpwg => &mut snapshot.dpwg,
                Source::Fda => &mut snapshot.fda,
            };
            normalize_rules(data)
                .map_err(|e| anyhow::anyhow!("invalid {} rule data: {}", source, e))?;
        }
        let cpic_index = build_phenotype_index(&snapshot.cpic);
        let dpwg_index = build_phenotype_index(&snapshot.dpwg);
        let fda_index = build_phenotype_index(&snapshot.fda);
        Ok(Self {
            snapshot,
            cpic_index,
            dpwg_index,
            fda_index,
        })
    }

    /// Load a database snapshot from `path` (gzip-transparent).
    pub fn load<P>(path: P) -> Result<Self, anyhow::Error>
    where
        P: AsRef<Path>,
    {
        tracing::debug!("loading database snapshot from {:?}", path.as_ref());
        let reader = crate::common::io::open_read_maybe_gz(path)?;
        let snapshot: Snapshot = serde_json::from_reader(reader)?;
        Self::new(snapshot)
    }

    /// Access one source's rules and encoding tables.
    pub fn source_data(&self, source: Source) -> &SourceData {
        match source {
            Source::Cpic => &self.snapshot.cpic,
            Source::Dpwg => &self.snapshot.dpwg,
            Source::Fda => &self.snapshot.fda,
        }
    }

    /// Access one source's flat phenotype index.
    pub fn phenotype_index(&self, source: Source) -> &PhenotypeIndex {
        match source {
            Source::Cpic => &self.cpic_index,
            Source::Dpwg => &self.dpwg_index,
            Source::Fda => &self.fda_index,
        }
    }

    /// All drug names across all sources, sorted.
    pub fn drugs(&self) -> Vec<String> {
        Source::iter()
            .flat_map(|source| self.source_data(source).recommendations.keys().cloned())
            .sorted()
            .dedup()
            .collect()
    }
}

/// Re-normalize all rule factors of one source through the factor
/// normalizer.  This folds HLA allele designators into gene symbols and
/// canonicalizes labels; already-normalized input passes through unchanged.
fn normalize_rules(data: &mut SourceData) -> Result<(), anyhow::Error> {
    for (drug, rules) in data.recommendations.iter_mut() {
        for rule in rules.iter_mut() {
            let mut factors = IndexMap::with_capacity(rule.factors.len());
            for (gene, required) in &rule.factors {
                let (gene, required) = match required {
                    Some(Factor::Label(label)) => factor::normalize_factor(gene, label)
                        .map_err(|e| anyhow::anyhow!("drug {:?}: {}", drug, e))?,
                    Some(Factor::Score(op, value)) => {
                        (gene.clone(), Some(Factor::Score(*op, *value)))
                    }
                    None => (gene.clone(), None),
                };
                factors.insert(gene, required);
            }
            rule.factors = factors;
        }
    }
    Ok(())
}

/// Flatten one source's per-gene encoding tables into the lookup index used
/// by the phenotyping engine.  The first label and the first score of each
/// entry win.
fn build_phenotype_index(data: &SourceData) -> PhenotypeIndex {
    let mut index = PhenotypeIndex::new();
    for (gene, table) in &data.encodings {
        for (genotype_key, values) in table {
            let mut entry = PhenotypeEntry::default();
            for value in values {
                match value {
                    Encoding::Label(label) if entry.label.is_none() => {
                        entry.label = Some(label.clone())
                    }
                    Encoding::Score(score) if entry.activity_score.is_none() => {
                        entry.activity_score = Some(*score)
                    }
                    _ => (),
                }
            }
            index.insert(format!("{}:{}", gene, genotype_key), entry);
        }
    }
    index
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::{Database, Encoding, Factor, ScoreOp, Snapshot, Source, Strength};

    #[rstest]
    #[case("== 2.00", Factor::Score(ScoreOp::Eq, 2.0))]
    #[case(">= 1.50", Factor::Score(ScoreOp::Geq, 1.5))]
    #[case(">=4", Factor::Score(ScoreOp::Geq, 4.0))]
    #[case("poor metabolizer", Factor::Label(String::from("poor metabolizer")))]
    #[case("== garbage", Factor::Label(String::from("== garbage")))]
    fn factor_from_str(#[case] text: &str, #[case] expected: Factor) {
        assert_eq!(Factor::from(text), expected);
    }

    #[rstest]
    #[case(Factor::Score(ScoreOp::Eq, 2.0), "== 2.00")]
    #[case(Factor::Score(ScoreOp::Geq, 1.5), ">= 1.50")]
    #[case(Factor::Label(String::from("positive")), "positive")]
    fn factor_display(#[case] factor: Factor, #[case] expected: &str) {
        assert_eq!(factor.to_string(), expected);
    }

    #[test]
    fn snapshot_deserialization() -> Result<(), anyhow::Error> {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{
                "cpic": {
                    "recommendations": {
                        "allopurinol": [
                            {
                                "factors": {"HLA-B*58:01": "positive"},
                                "recommendation": "Allopurinol is contraindicated",
                                "strength": "strong",
                                "guideline": "https://cpicpgx.org/guidelines/guideline-for-allopurinol-and-hla-b/"
                            }
                        ]
                    },
                    "encodings": {
                        "CYP2D6": {
                            "*1/*1": ["normal metabolizer", 2.0],
                            "*4/*4": ["poor metabolizer", 0.0],
                            "*104/*104": [null]
                        }
                    }
                },
                "dpwg": {},
                "fda": {}
            }"#,
        )?;

        let rule = &snapshot.cpic.recommendations["allopurinol"][0];
        assert_eq!(
            rule.factors["HLA-B*58:01"],
            Some(Factor::Label(String::from("positive")))
        );
        assert_eq!(rule.strength, Some(Strength::Strong));
        assert_eq!(
            snapshot.cpic.encodings["CYP2D6"]["*1/*1"],
            vec![
                Encoding::Label(String::from("normal metabolizer")),
                Encoding::Score(2.0)
            ]
        );
        assert_eq!(
            snapshot.cpic.encodings["CYP2D6"]["*104/*104"],
            vec![Encoding::Unknown]
        );

        Ok(())
    }

    #[test]
    fn database_builds_phenotype_index() -> Result<(), anyhow::Error> {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{
                "cpic": {
                    "encodings": {
                        "CYP2D6": {"*1/*1": ["normal metabolizer", 2.0]},
                        "HLA-B*58:01": {"positive": ["positive"]}
                    }
                }
            }"#,
        )?;
        let db = Database::new(snapshot)?;

        let entry = &db.phenotype_index(Source::Cpic)["CYP2D6:*1/*1"];
        assert_eq!(entry.label.as_deref(), Some("normal metabolizer"));
        assert_eq!(entry.activity_score, Some(2.0));

        let entry = &db.phenotype_index(Source::Cpic)["HLA-B*58:01:positive"];
        assert_eq!(entry.label.as_deref(), Some("positive"));
        assert_eq!(entry.activity_score, None);

        Ok(())
    }

    #[test]
    fn database_normalizes_rule_factors() -> Result<(), anyhow::Error> {
        // raw ETL spellings: HLA designator still in the factor text and a
        // capitalized phenotype label
        let snapshot: Snapshot = serde_json::from_str(
            r#"{
                "cpic": {
                    "recommendations": {
                        "abacavir": [
                            {
                                "factors": {"HLA-B": "*57:01 positive"},
                                "recommendation": "Abacavir is not recommended",
                                "strength": "strong",
                                "guideline": "https://cpicpgx.org/guidelines/guideline-for-abacavir-and-hla-b/"
                            }
                        ],
                        "clopidogrel": [
                            {
                                "factors": {"CYP2C19": "Poor Metabolizer"},
                                "recommendation": "Consider an alternative antiplatelet agent",
                                "strength": "strong",
                                "guideline": "https://cpicpgx.org/guidelines/guideline-for-clopidogrel-and-cyp2c19/"
                            }
                        ]
                    }
                }
            }"#,
        )?;
        let db = Database::new(snapshot)?;

        let rule = &db.source_data(Source::Cpic).recommendations["abacavir"][0];
        assert_eq!(
            rule.factors["HLA-B*57:01"],
            Some(Factor::Label(String::from("positive")))
        );

        let rule = &db.source_data(Source::Cpic).recommendations["clopidogrel"][0];
        assert_eq!(
            rule.factors["CYP2C19"],
            Some(Factor::Label(String::from("poor metabolizer")))
        );

        Ok(())
    }

    #[test]
    fn database_rejects_unknown_vocabulary() -> Result<(), anyhow::Error> {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{
                "dpwg": {
                    "recommendations": {
                        "caffeine": [
                            {
                                "factors": {"CYP1A2": "Banana Metabolizer"},
                                "recommendation": "n/a",
                                "guideline": "https://example.com"
                            }
                        ]
                    }
                }
            }"#,
        )?;

        let err = Database::new(snapshot).expect_err("stale vocabulary must be rejected");
        assert!(err.to_string().contains("Banana Metabolizer"));

        Ok(())
    }

    #[test]
    fn drugs_is_sorted_union_over_sources() -> Result<(), anyhow::Error> {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{
                "cpic": {"recommendations": {"warfarin": [], "abacavir": []}},
                "dpwg": {"recommendations": {"warfarin": [], "clopidogrel": []}},
                "fda": {"recommendations": {"abacavir": []}}
            }"#,
        )?;
        let db = Database::new(snapshot)?;
        assert_eq!(db.drugs(), vec!["abacavir", "clopidogrel", "warfarin"]);

        Ok(())
    }

    #[test]
    fn rule_serialization_omits_null_strength() -> Result<(), anyhow::Error> {
        let rule = super::RecommendationRule {
            factors: Default::default(),
            recommendation: String::from("No action is needed"),
            strength: None,
            guideline: String::from("https://example.com"),
        };
        assert_eq!(
            serde_json::to_string(&rule)?,
            r#"{"factors":{},"recommendation":"No action is needed","guideline":"https://example.com"}"#
        );

        Ok(())
    }
}
