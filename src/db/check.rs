//! Code implementing the `db check` sub command.
//!
//! Integrity checks over a database snapshot.  These run as a batch step
//! after ETL, never on the request path: duplicate factor maps, unusable
//! recommendation texts, missing guideline URLs, and encoding labels the
//! cross-source vocabulary does not know about.

use std::collections::HashSet;

use clap::Parser;
use strum::IntoEnumIterator;

use crate::recommend::factor;
use crate::recommend::schema::data::{Database, Encoding, Source};

/// Command line arguments for `db check` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Check a recommendation database snapshot", long_about = None)]
pub struct Args {
    /// Path to the recommendation database snapshot (`.json`, optionally
    /// gzip-compressed).
    #[arg(long, required = true)]
    pub path_db: String,
}

/// Run all integrity checks over a loaded database; returns one finding
/// per violation.
pub fn check_database(db: &Database) -> Vec<String> {
    let mut findings = Vec::new();

    for source in Source::iter() {
        let data = db.source_data(source);

        for (drug, rules) in &data.recommendations {
            let mut seen = HashSet::new();
            for rule in rules {
                let key = serde_json::to_string(&rule.factors).unwrap_or_default();
                if !seen.insert(key) {
                    findings.push(format!(
                        "{}/{}: duplicate factor map {:?}",
                        source, drug, rule.factors
                    ));
                }
                if rule.recommendation.is_empty() || rule.recommendation == "No recommendation" {
                    findings.push(format!(
                        "{}/{}: rule without usable recommendation text",
                        source, drug
                    ));
                }
                if rule.guideline.is_empty() {
                    findings.push(format!("{}/{}: rule without guideline URL", source, drug));
                }
            }
        }

        for (gene, table) in &data.encodings {
            for (genotype_key, values) in table {
                for value in values {
                    if let Encoding::Label(label) = value {
                        if label.parse::<f64>().is_ok() {
                            findings.push(format!(
                                "{}/{}: numeric label {:?} for genotype {:?}",
                                source, gene, label, genotype_key
                            ));
                        } else if !factor::is_known_label(label) {
                            findings.push(format!(
                                "{}/{}: label {:?} for genotype {:?} missing from vocabulary",
                                source, gene, label, genotype_key
                            ));
                        }
                    }
                }
            }
        }
    }

    findings
}

/// Main entry point for `db check` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let db = Database::load(&args.path_db)?;
    let findings = check_database(&db);
    for finding in &findings {
        tracing::warn!("{}", finding);
    }
    if findings.is_empty() {
        tracing::info!("database passes all integrity checks");
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "database failed {} integrity check(s)",
            findings.len()
        ))
    }
}
