//! Genomic uniqueness filtering of candidate primer pairs.
//!
//! Each pair is checked against an in-silico PCR oracle; pairs whose product
//! maps to more than one genomic locus are purged and the survivors are
//! re-indexed contiguously.

use crate::design::{DesignOutput, PairCounts};
use crate::error::PrimertoolError;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    // Anything from the first alt-haplotype separator onward is dropped when
    // comparing locus identifiers.
    static ref LOCUS_SUFFIX: Regex = Regex::new(r"[_|:].*").unwrap();
    static ref ANCHOR_TAG: Regex = Regex::new(r"</?A[^>]*>").unwrap();
}

/// One binding locus reported by the uniqueness oracle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingSite {
    pub locus: String,
    pub sequence: String,
}

/// The external uniqueness oracle: all genomic binding sites of a primer pair.
pub trait UniquenessOracle {
    fn find_binding_sites(
        &self,
        forward_primer: &str,
        reverse_primer: &str,
    ) -> Result<Vec<BindingSite>, PrimertoolError>;
}

/// A pair binds uniquely iff the oracle reports exactly one distinct locus.
/// The same product on an alternate haplotype of one chromosome counts once;
/// distinct products on the same chromosome count separately.
pub fn is_uniquely_binding(sites: &[BindingSite]) -> bool {
    let distinct: HashSet<(String, String)> = sites
        .iter()
        .map(|site| {
            (
                LOCUS_SUFFIX.replace(&site.locus, "").into_owned(),
                site.sequence.clone(),
            )
        })
        .collect();
    distinct.len() == 1
}

/// Remove all pairs that do not bind uniquely, re-index the survivors from 0
/// and decrement the "num returned" counters by the number purged.
///
/// The flag is true iff the oracle had produced at least one pair and none
/// survived; it drives the engine's widen-and-restart step.
pub fn filter_unique_pairs(
    output: DesignOutput,
    oracle: &dyn UniquenessOracle,
) -> Result<(DesignOutput, bool), PrimertoolError> {
    let pre_filter_count = output.counts.pairs;
    let mut survivors = Vec::with_capacity(output.pairs.len());
    let mut purged = 0usize;

    for pair in output.pairs {
        let sites = oracle.find_binding_sites(&pair.left_sequence, &pair.right_sequence)?;
        if is_uniquely_binding(&sites) {
            survivors.push(pair);
        } else {
            log::info!(
                "Purging primer pair {} ({} binding sites)",
                pair.index,
                sites.len()
            );
            purged += 1;
        }
    }

    for (index, pair) in survivors.iter_mut().enumerate() {
        pair.index = index;
    }
    let counts = PairCounts {
        left: output.counts.left.saturating_sub(purged),
        right: output.counts.right.saturating_sub(purged),
        pairs: output.counts.pairs.saturating_sub(purged),
    };

    let all_pairs_invalid = pre_filter_count > 0 && survivors.is_empty();
    Ok((
        DesignOutput {
            pairs: survivors,
            counts,
        },
        all_pairs_invalid,
    ))
}

/// Blocking client for a UCSC In-Silico-PCR-like CGI endpoint.
#[derive(Debug)]
pub struct UcscInSilicoPcr {
    client: reqwest::blocking::Client,
    base_url: String,
    organism: String,
    database: String,
    max_product_size: u32,
    min_perfect_match: u32,
    min_good_match: u32,
    flip_reverse_primer: bool,
}

impl UcscInSilicoPcr {
    pub fn new(database: &str) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: "https://genome.ucsc.edu/cgi-bin/hgPcr".to_string(),
            organism: "Human".to_string(),
            database: database.to_string(),
            max_product_size: 4000,
            min_perfect_match: 15,
            min_good_match: 15,
            flip_reverse_primer: false,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }
}

impl UniquenessOracle for UcscInSilicoPcr {
    fn find_binding_sites(
        &self,
        forward_primer: &str,
        reverse_primer: &str,
    ) -> Result<Vec<BindingSite>, PrimertoolError> {
        let size = self.max_product_size.to_string();
        let perfect = self.min_perfect_match.to_string();
        let good = self.min_good_match.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("org", self.organism.as_str()),
                ("db", self.database.as_str()),
                ("wp_target", "genome"),
                ("wp_f", forward_primer),
                ("wp_r", reverse_primer),
                ("Submit", "submit"),
                ("wp_size", size.as_str()),
                ("wp_perfect", perfect.as_str()),
                ("wp_good", good.as_str()),
                (
                    "boolshad.wp_flipReverse",
                    if self.flip_reverse_primer { "1" } else { "0" },
                ),
                ("boolshad.wp_append", "0"),
            ])
            .send()?
            .error_for_status()
            .map_err(|e| {
                PrimertoolError::RemoteService(format!(
                    "In-silico PCR request failed for {forward_primer}/{reverse_primer}: {e}"
                ))
            })?;
        let html = response.text()?;
        Ok(parse_pcr_response(&html))
    }
}

/// Extract the FASTA records embedded in the hgPcr result page. An empty
/// list means the pair did not amplify anywhere.
pub fn parse_pcr_response(html: &str) -> Vec<BindingSite> {
    let block = match (html.find("<PRE>"), html.find("</PRE>")) {
        (Some(open), Some(close)) if open < close => &html[open + "<PRE>".len()..close],
        _ => return Vec::new(),
    };
    let fasta = ANCHOR_TAG.replace_all(block, "");

    let mut sites = Vec::new();
    let mut locus: Option<String> = None;
    let mut sequence = String::new();
    for line in fasta.lines() {
        let line = line.trim();
        if let Some(header) = line.strip_prefix('>') {
            if let Some(id) = locus.take() {
                sites.push(BindingSite {
                    locus: id,
                    sequence: std::mem::take(&mut sequence),
                });
            }
            locus = header.split_whitespace().next().map(str::to_string);
        } else if !line.is_empty() {
            sequence.push_str(line);
        }
    }
    if let Some(id) = locus {
        sites.push(BindingSite {
            locus: id,
            sequence,
        });
    }
    sites
}
