//! Normalization of raw factor strings into their canonical form.
//!
//! The three guideline sources encode the same gene states in incompatible
//! vocabularies: capitalized metabolizer phenotypes, numeric activity
//! scores with or without a `≥` marker, and allele-specific
//! positive/negative calls for HLA markers.  This module reconciles them
//! into the single `Factor` representation used by the matcher.

use std::collections::HashMap;

use crate::recommend::schema::data::{Factor, ScoreOp};

lazy_static::lazy_static! {
    /// Cross-source phenotype vocabulary, keyed by lowercased source
    /// spelling.  Canonical labels are fixed points of the table; keys
    /// mapped to `None` denote results that carry no actionable factor.
    static ref FACTOR_LABELS: HashMap<&'static str, Option<&'static str>> = {
        let mut m = HashMap::new();
        m.insert("ultrarapid metabolizer", Some("ultrarapid metabolizer"));
        m.insert("rapid metabolizer", Some("ultrarapid metabolizer"));
        m.insert("likely intermediate metabolizer", Some("intermediate metabolizer"));
        m.insert("possible intermediate metabolizer", Some("intermediate metabolizer"));
        m.insert("intermediate metabolizer", Some("intermediate metabolizer"));
        m.insert("likely poor metabolizer", Some("poor metabolizer"));
        m.insert("poor metabolizer", Some("poor metabolizer"));
        m.insert("normal metabolizer", Some("normal metabolizer"));
        m.insert("uncertain risk of aminoglycoside-induced hearing loss", None);
        m.insert("normal risk of aminoglycoside-induced hearing loss", None);
        m.insert("increased risk of aminoglycoside-induced hearing loss", None);
        m.insert("ivacaftor responsive in cf patients", None);
        m.insert("ivacaftor non-responsive in cf patients", None);
        m.insert("uncertain susceptibility", None);
        m.insert("malignant hyperthermia susceptibility", None);
        // G6PD
        m.insert("variable", Some("variable"));
        m.insert("deficient", Some("deficient"));
        m.insert("normal", Some("normal"));
        // SLCO1B1
        m.insert("decreased function", Some("intermediate function"));
        m.insert("possible increased function", Some("intermediate function"));
        m.insert("possible decreased function", Some("intermediate function"));
        m.insert("possible poor function", Some("poor function"));
        m.insert("poor function", Some("poor function"));
        m.insert("normal function", Some("normal function"));
        m.insert("indeterminate", None);
        // HLA markers
        m.insert("positive", Some("positive"));
        m.insert("negative", Some("negative"));
        // VKORC1 / CYP4F2
        m.insert("rs9923231 variant (t)", Some("rs9923231 variant (T)"));
        m.insert("rs9923231 reference (c)", Some("rs9923231 reference (C)"));
        m.insert("*3 (rs2108622 t, v433m)", Some("*3 (rs2108622 T, V433M)"));
        // SLCO1B1 rs4149056 genotypes
        m.insert("521 cc", Some("521 CC"));
        m.insert("521 tc", Some("521 TC"));
        // F5
        m.insert("factor v leiden heterozygous", Some("Factor V Leiden heterozygous"));
        m.insert("factor v leiden homozygous", Some("Factor V Leiden homozygous"));
        // CYP3A5
        m.insert("cyp3a5 heterozygote expressor", Some("CYP3A5 heterozygote expressor"));
        m.insert("cyp3a5 homozygous expressor", Some("CYP3A5 homozygous expressor"));
        m
    };

    /// Pattern for "no result" style factors.
    static ref NO_RESULT: regex::Regex =
        regex::Regex::new(r"(?i)^(?:no(?: .*)? result|n/a)$").expect("invalid regex in source code");
}

/// Error type for factor normalization.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The label is missing from `FACTOR_LABELS`, i.e. the static
    /// vocabulary is stale relative to the upstream data.
    #[error("factor label {0:?} is not in the cross-source vocabulary")]
    UnknownVocabulary(String),
}

/// Whether a categorical label is registered in the cross-source
/// vocabulary at all (including labels deliberately mapped to no factor).
pub fn is_known_label(raw: &str) -> bool {
    FACTOR_LABELS.contains_key(raw.to_lowercase().as_str())
}

/// Map a raw categorical label to its canonical cross-source form.
///
/// Lenient variant used during phenotyping: unknown labels and labels that
/// deliberately carry no factor both yield `None`.
pub fn label_to_factor(raw: &str) -> Option<&'static str> {
    FACTOR_LABELS
        .get(raw.to_lowercase().as_str())
        .copied()
        .flatten()
}

/// Canonicalize one raw factor string for `gene`.
///
/// Returns the (possibly extended) gene symbol and the canonical factor;
/// `None` as factor means "intentionally unknown".  Idempotent: canonical
/// input passes through unchanged.
pub fn normalize_factor(gene: &str, raw: &str) -> Result<(String, Option<Factor>), Error> {
    let (gene, raw) = split_hla_designator(gene, raw);

    if NO_RESULT.is_match(&raw) {
        return Ok((gene, None));
    }

    if let Some(factor) = parse_score(&raw) {
        return Ok((gene, Some(factor)));
    }

    match FACTOR_LABELS.get(raw.to_lowercase().as_str()) {
        Some(Some(label)) => Ok((gene, Some(Factor::Label((*label).to_string())))),
        Some(None) => Ok((gene, None)),
        None => Err(Error::UnknownVocabulary(raw)),
    }
}

/// Parse an activity score expression: bare number, `≥`-prefixed lower
/// bound, or an already-normalized `==`/`>=` form.  The value is snapped to
/// quarter-point granularity.
fn parse_score(raw: &str) -> Option<Factor> {
    let (op, body) = if let Some(rest) = raw.strip_prefix("==") {
        (ScoreOp::Eq, rest)
    } else if let Some(rest) = raw.strip_prefix(">=") {
        (ScoreOp::Geq, rest)
    } else if let Some(rest) = raw.strip_prefix('≥') {
        (ScoreOp::Geq, rest)
    } else {
        (ScoreOp::Eq, raw)
    };
    body.trim()
        .parse::<f64>()
        .ok()
        .map(|value| Factor::Score(op, round_quarter(value)))
}

/// Snap a score to the nearest 0.25; activity scores are defined on a
/// quarter-point scale.
fn round_quarter(value: f64) -> f64 {
    (value * 4.0).round() / 4.0
}

/// Split the allele designator out of an HLA factor text and fold it into
/// the gene symbol, e.g. `("HLA-B", "*57:01 positive")` becomes
/// `("HLA-B*57:01", "positive")`.  Symbols that already carry a designator
/// are left alone.
fn split_hla_designator(gene: &str, factor: &str) -> (String, String) {
    if gene.contains("HLA-") {
        for token in ["positive", "negative"] {
            let suffix = format!(" {}", token);
            if factor.contains(&suffix) {
                let designator = factor.replace(&suffix, "");
                let gene = if gene.contains('*') {
                    gene.to_string()
                } else {
                    format!("{}{}", gene, designator).trim().to_string()
                };
                return (gene, token.to_string());
            }
        }
    }
    (gene.to_string(), factor.to_string())
}
