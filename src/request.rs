//! Resolution entry points: variant, exon, gene and genomic-position
//! requests, each producing an order table or a typed error.

use crate::annotation::{GeneAnnotation, GeneStore, SnpStore};
use crate::chunking::{windows, InsertPolicy};
use crate::design::{DesignConfig, PrimerDesigner};
use crate::engine::SearchEngine;
use crate::error::PrimertoolError;
use crate::genome::SequenceStore;
use crate::hgvs;
use crate::mutalyzer::{resolve_variant_descriptions, VariantNormalizer};
use crate::ordertable::{OrderTable, OrderTableBuilder};
use crate::uniqueness::UniquenessOracle;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CHROMOSOME_STRICT: Regex =
        Regex::new(r"^chr(X|Y|M|[1-9]|1[0-9]|2[0-2])$").unwrap();
    static ref CHROMOSOME_TOLERANT: Regex =
        Regex::new(r"^(Chr)?(X|Y|M|[1-9]|1[0-9]|2[0-2])$").unwrap();
}

/// Supported genome assemblies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assembly {
    Hg19,
    Hg38,
}

impl Assembly {
    pub fn parse(raw: &str) -> Result<Self, PrimertoolError> {
        match raw.to_ascii_lowercase().as_str() {
            "hg19" => Ok(Assembly::Hg19),
            "hg38" => Ok(Assembly::Hg38),
            other => Err(PrimertoolError::InvalidInput(format!(
                "Given genome assembly {other} is invalid. Only hg19 and hg38 are accepted."
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Assembly::Hg19 => "hg19",
            Assembly::Hg38 => "hg38",
        }
    }
}

/// Remove every whitespace character from a user-provided token.
pub fn strip_whitespace(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Validate a chromosome token against `chr(1-22|X|Y|M)`, auto-correcting
/// tolerant spellings such as `19`, `Chr19` or `X`.
pub fn normalize_chromosome(raw: &str) -> Result<String, PrimertoolError> {
    let chromosome = strip_whitespace(raw);
    if CHROMOSOME_STRICT.is_match(&chromosome) {
        return Ok(chromosome);
    }
    if let Some(captures) = CHROMOSOME_TOLERANT.captures(&chromosome) {
        return Ok(format!("chr{}", &captures[2]));
    }
    Err(PrimertoolError::InvalidInput(format!(
        "Given chromosome {chromosome} is invalid. Please use a valid chromosome (e.g. \"chr1\", \"X\", \"Y\")."
    )))
}

fn check_transcript_accession(accession: &str) -> Result<(), PrimertoolError> {
    if !accession.starts_with("NM_") {
        return Err(PrimertoolError::InvalidInput(format!(
            "Given accession {accession} is invalid. Transcript accessions should start with \"NM_\"."
        )));
    }
    Ok(())
}

/// All collaborators and policy knobs for one resolution request.
pub struct PrimerPipeline<'a> {
    pub genome: &'a dyn SequenceStore,
    pub genes: &'a dyn GeneStore,
    pub snps: &'a dyn SnpStore,
    pub designer: &'a dyn PrimerDesigner,
    pub uniqueness: &'a dyn UniquenessOracle,
    pub normalizer: &'a dyn VariantNormalizer,
    pub policy: InsertPolicy,
    pub design: DesignConfig,
    /// Initials of the ordering person, copied into every order row.
    pub ordered_by: Option<String>,
}

impl PrimerPipeline<'_> {
    fn engine(&self) -> SearchEngine<'_> {
        SearchEngine {
            genome: self.genome,
            snps: self.snps,
            designer: self.designer,
            uniqueness: self.uniqueness,
            policy: self.policy,
            design: self.design,
        }
    }

    fn builder(&self) -> OrderTableBuilder {
        OrderTableBuilder::new(self.ordered_by.as_deref())
    }

    fn annotation_for(&self, accession: &str) -> Result<GeneAnnotation, PrimertoolError> {
        check_transcript_accession(accession)?;
        self.genes.gene_by_transcript(accession)?.ok_or_else(|| {
            PrimertoolError::InvalidInput(format!(
                "Could not find gene information for {accession} in the annotation store"
            ))
        })
    }

    /// Primers for one exon of a transcript.
    pub fn exon_primers(
        &self,
        accession: &str,
        exon_number: usize,
    ) -> Result<OrderTable, PrimertoolError> {
        let accession = strip_whitespace(accession);
        let annotation = self.annotation_for(&accession)?;
        log::info!(
            "Number of exons in gene {}: {}",
            annotation.gene_name,
            annotation.exon_count
        );
        self.exon_table(&annotation, exon_number)
    }

    fn exon_table(
        &self,
        annotation: &GeneAnnotation,
        exon_number: usize,
    ) -> Result<OrderTable, PrimertoolError> {
        let (exon_start, exon_end) = annotation.exon_boundaries(exon_number)?;
        let hits = self.engine().search_windows(
            &annotation.chromosome,
            windows(exon_start, exon_end, &self.policy),
        )?;
        if hits.is_empty() {
            return Err(PrimertoolError::NoPrimerFound(format!(
                "No primers found for exon {} in gene {}. Try using the genomic position {}:{}-{} instead.",
                exon_number, annotation.gene_name, annotation.chromosome, exon_start, exon_end
            )));
        }
        let builder = self.builder();
        let mut table = OrderTable::default();
        for hit in &hits {
            table
                .rows
                .extend(builder.exon_rows(annotation, exon_number, &hit.pair));
        }
        Ok(table)
    }

    /// Primers for every exon of a transcript.
    pub fn gene_primers(&self, accession: &str) -> Result<OrderTable, PrimertoolError> {
        let accession = strip_whitespace(accession);
        let annotation = self.annotation_for(&accession)?;
        let mut table = OrderTable::default();
        for exon_number in 1..=annotation.exon_count {
            table.extend(self.exon_table(&annotation, exon_number)?);
        }
        Ok(table)
    }

    /// Primers for a raw genomic interval.
    pub fn region_primers(
        &self,
        chromosome: &str,
        start: i64,
        end: i64,
    ) -> Result<OrderTable, PrimertoolError> {
        let chromosome = normalize_chromosome(chromosome)?;
        if start > end {
            return Err(PrimertoolError::InvalidInput(format!(
                "Invalid interval {start}-{end}: start must not be greater than end"
            )));
        }
        let hits = self
            .engine()
            .search_windows(&chromosome, windows(start, end, &self.policy))?;
        if hits.is_empty() {
            return Err(PrimertoolError::NoPrimerFound(format!(
                "No primers found for {chromosome}:{start}-{end}."
            )));
        }
        let builder = self.builder();
        let mut table = OrderTable::default();
        for hit in &hits {
            table
                .rows
                .extend(builder.region_rows(&chromosome, start, end, &hit.pair));
        }
        Ok(table)
    }

    /// Primers around a coding HGVS variant.
    pub fn variant_primers(&self, variant: &str) -> Result<OrderTable, PrimertoolError> {
        let variant = strip_whitespace(variant);
        log::info!("[variant input] {variant}");
        if variant.starts_with("chr") || variant.starts_with("Chr") {
            return Err(PrimertoolError::InvalidInput(
                "Only transcript (NM) variant descriptions are supported here. Use a genomic position request instead."
                    .to_string(),
            ));
        }
        if !variant.starts_with("NM_") {
            return Err(PrimertoolError::InvalidInput(format!(
                "Given variant {variant} is invalid. Variant descriptions should start with \"NM_\"."
            )));
        }

        let (coding, genomic) = resolve_variant_descriptions(self.normalizer, &variant)?;
        let (transcript, _version) = hgvs::split_accession(&coding.accession);
        let annotation = self.annotation_for(&transcript)?;
        let position = annotation.locate_mutation(genomic.start, genomic.end);

        if position.is_in_exon && position.exon_len <= self.policy.max_insert {
            log::info!(
                "Variant lies in exon {} of {}; running the exon search",
                position.exon_number,
                annotation.gene_name
            );
            self.exon_table(&annotation, position.exon_number)
        } else if position.is_in_exon {
            Err(PrimertoolError::ExonTooLarge(format!(
                "Exon length {} exceeds the maximum insert size {}. Try using the genomic position instead: \"{}:{}-{}\".",
                position.exon_len,
                self.policy.max_insert,
                annotation.chromosome,
                position.mut_start,
                position.mut_end
            )))
        } else {
            log::info!("Variant is not in an exon; running the genomic position search");
            self.region_primers(&annotation.chromosome, position.mut_start, position.mut_end)
        }
    }
}
