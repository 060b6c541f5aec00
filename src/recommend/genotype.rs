//! Expansion of raw genotype strings into encoding table lookup keys.

use itertools::Itertools;

lazy_static::lazy_static! {
    /// Allele multiplication notation, e.g. `*1x5` or `*2Ax2`.
    static ref ALLELE_RANGE: regex::Regex =
        regex::Regex::new(r"^(\*\d+[A-Z]?)x(\d{1,2})$").expect("invalid regex in source code");
}

/// Expand one allele token into its lookup variants.
///
/// Multiplication notation expands to the literal token followed by one
/// "at least N copies" variant for every N from the count down to 1, so an
/// exact high copy number can match a rule written for "at least 3 copies"
/// without the database enumerating every possible count.
fn allele_range(allele: &str) -> Vec<String> {
    let mut result = vec![allele.to_string()];
    if let Some(captures) = ALLELE_RANGE.captures(allele) {
        let name = &captures[1];
        let count: u32 = captures[2].parse().expect("digits only per the pattern");
        result.extend((1..=count).rev().map(|n| format!("{}≥{}", name, n)));
    }
    result
}

/// Produce the encoding lookup keys for `genotype` of `genesymbol`, most
/// specific first; callers walk the keys in order and stop at the first
/// table hit.
///
/// Diplotypes are split on `/`, each side expanded, and every pair joined
/// in alphabetical order so that `"A/B"` and `"B/A"` resolve identically.
/// Strings that do not parse as a diplotype fall through as a single
/// literal key.
pub fn genotype_indexes(genesymbol: &str, genotype: &str) -> Vec<String> {
    if let Some((first_allele, second_allele)) = genotype.split_once('/') {
        let second_indexes = allele_range(second_allele);
        allele_range(first_allele)
            .iter()
            .cartesian_product(second_indexes.iter())
            .map(|(first_index, second_index)| {
                let mut pair = [first_index.as_str(), second_index.as_str()];
                pair.sort_unstable();
                format!("{}:{}/{}", genesymbol, pair[0], pair[1])
            })
            .collect()
    } else {
        allele_range(genotype)
            .into_iter()
            .map(|index| format!("{}:{}", genesymbol, index))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    #[test]
    fn allele_range_expands_multiplication_notation() {
        assert_eq!(
            super::allele_range("*1x5"),
            vec!["*1x5", "*1≥5", "*1≥4", "*1≥3", "*1≥2", "*1≥1"]
        );
        assert_eq!(super::allele_range("*2Ax2"), vec!["*2Ax2", "*2A≥2", "*2A≥1"]);
        assert_eq!(super::allele_range("*17"), vec!["*17"]);
        assert_eq!(super::allele_range("positive"), vec!["positive"]);
    }

    #[test]
    fn genotype_indexes_diplotype() {
        assert_eq!(
            super::genotype_indexes("CYP2D6", "*1/*2"),
            vec!["CYP2D6:*1/*2"]
        );
    }

    #[test]
    fn genotype_indexes_is_order_insensitive() {
        assert_eq!(
            super::genotype_indexes("CYP2D6", "*2/*1"),
            super::genotype_indexes("CYP2D6", "*1/*2")
        );

        // with range expansion the emission order differs but the key sets
        // are identical
        let mut flipped = super::genotype_indexes("CYP2D6", "*2/*1x5");
        let mut straight = super::genotype_indexes("CYP2D6", "*1x5/*2");
        flipped.sort();
        straight.sort();
        assert_eq!(flipped, straight);
    }

    #[test]
    fn genotype_indexes_expands_ranges_most_specific_first() {
        let indexes = super::genotype_indexes("CYP2D6", "*1x2/*3");
        assert_eq!(
            indexes,
            vec!["CYP2D6:*1x2/*3", "CYP2D6:*1≥2/*3", "CYP2D6:*1≥1/*3"]
        );
    }

    #[test]
    fn genotype_indexes_single_haplotype() {
        assert_eq!(
            super::genotype_indexes("HLA-B*57:01", "positive"),
            vec!["HLA-B*57:01:positive"]
        );
        assert_eq!(
            super::genotype_indexes("CYP2D6", "*1x3"),
            vec![
                "CYP2D6:*1x3",
                "CYP2D6:*1≥3",
                "CYP2D6:*1≥2",
                "CYP2D6:*1≥1"
            ]
        );
    }

    #[test]
    fn genotype_indexes_malformed_input_degrades_to_literal_key() {
        assert_eq!(
            super::genotype_indexes("F5", "Factor V Leiden heterozygous"),
            vec!["F5:Factor V Leiden heterozygous"]
        );
    }
}
