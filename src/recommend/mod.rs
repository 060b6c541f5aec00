//! Code implementing the `recommend` sub command.
//!
//! Matches a patient's per-gene genotypes against the recommendation rules
//! of the three guideline sources and reports, per drug and source, the
//! single best applicable recommendation.

pub mod factor;
pub mod genotype;
pub mod interpreter;
pub mod phenotype;
pub mod schema;

use std::io::Write;
use std::time::Instant;

use clap::Parser;
use indexmap::IndexMap;
use strum::IntoEnumIterator;

use crate::common::trace_rss_now;
use schema::data::{Database, Source};
use schema::query::{PatientGenotypes, Recommendations};

/// Command line arguments for `recommend` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Match patient genotypes against guideline rules", long_about = None)]
pub struct Args {
    /// Path to the recommendation database snapshot (`.json`, optionally
    /// gzip-compressed).
    #[arg(long, required = true)]
    pub path_db: String,
    /// Path to the patient genotypes JSON file.
    #[arg(long, required = true)]
    pub path_input: String,
    /// Path to the output JSON file; `-` for stdout.
    #[arg(long, default_value = "-")]
    pub path_output: String,
}

/// Match the patient's derived factors against every (drug, source) pair.
///
/// The factor map is computed once; the drug universe is the sorted union
/// of drug names across all sources.  A source that yields neither a match
/// nor a fallback is omitted from its drug's entry.
pub fn query_recommendations(db: &Database, genotypes: &PatientGenotypes) -> Recommendations {
    let factors = phenotype::phenotype(genotypes, db);

    let mut result = Recommendations::new();
    for drug in db.drugs() {
        let mut by_source = IndexMap::new();
        for source in Source::iter() {
            let rules = db
                .source_data(source)
                .recommendations
                .get(&drug)
                .map(|rules| rules.as_slice())
                .unwrap_or_default();
            if let Some(recommendation) = interpreter::match_source(source, rules, &factors) {
                by_source.insert(source, recommendation);
            }
        }
        result.insert(drug, by_source);
    }

    result
}

/// Main entry point for `recommend` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    tracing::info!("Loading recommendation database...");
    let before_loading = Instant::now();
    let db = Database::load(&args.path_db)?;
    tracing::info!(
        "...done loading database in {:?}",
        before_loading.elapsed()
    );

    trace_rss_now();

    tracing::info!("Loading patient genotypes...");
    let genotypes: PatientGenotypes =
        serde_json::from_reader(crate::common::io::open_read_maybe_gz(&args.path_input)?)?;

    tracing::info!("Matching recommendations...");
    let before_query = Instant::now();
    let result = query_recommendations(&db, &genotypes);
    tracing::info!("...done matching in {:?}", before_query.elapsed());

    if args.path_output == "-" {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        serde_json::to_writer_pretty(&mut handle, &result)?;
        handle.write_all(b"\n")?;
    } else {
        let mut writer = crate::common::io::open_write_maybe_gz(&args.path_output)?;
        serde_json::to_writer_pretty(&mut writer, &result)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }

    Ok(())
}
