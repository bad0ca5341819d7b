//! Gene annotation model and the annotation/SNP store seams.
//!
//! Gene lookups are served from a cached UCSC `refGene` table dump; common
//! SNP lookups go through the UCSC JSON API as range queries.

use crate::error::PrimertoolError;
use crate::genome::download_unpacked;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const UCSC_DOWNLOAD_BASE: &str = "https://hgdownload.soe.ucsc.edu/goldenPath";
const UCSC_API_BASE: &str = "https://api.genome.ucsc.edu";
const COMMON_SNP_TRACK: &str = "snp150Common";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn from_symbol(symbol: &str) -> Result<Self, PrimertoolError> {
        match symbol {
            "+" => Ok(Strand::Forward),
            "-" => Ok(Strand::Reverse),
            other => Err(PrimertoolError::InvalidInput(format!(
                "Unknown strand symbol '{other}'"
            ))),
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

/// One transcript annotation row. Exon coordinate lists are genomic and
/// ascending regardless of strand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneAnnotation {
    /// NM accession without version.
    pub transcript_id: String,
    pub chromosome: String,
    pub strand: Strand,
    pub gene_name: String,
    pub exon_count: usize,
    pub exon_starts: Vec<i64>,
    pub exon_ends: Vec<i64>,
}

impl GeneAnnotation {
    /// Genomic boundaries of a 1-based, strand-corrected exon number. On the
    /// reverse strand exon 1 is the last entry of the coordinate lists.
    pub fn exon_boundaries(&self, exon_number: usize) -> Result<(i64, i64), PrimertoolError> {
        if exon_number == 0 || exon_number > self.exon_count {
            return Err(PrimertoolError::InvalidInput(format!(
                "Exon number {} does not exist in gene {} ({} exons). Please use the genomic position instead.",
                exon_number, self.gene_name, self.exon_count
            )));
        }
        let index = match self.strand {
            Strand::Forward => exon_number - 1,
            Strand::Reverse => self.exon_count - exon_number,
        };
        Ok((self.exon_starts[index], self.exon_ends[index]))
    }

    /// Locate a genomic interval against the exon structure.
    pub fn locate_mutation(&self, mut_start: i64, mut_end: i64) -> MutationPosition {
        let mut position = MutationPosition {
            exon_number: 0,
            mut_start,
            mut_end,
            mut_length: mut_end - mut_start,
            is_in_exon: false,
            exon_len: 0,
        };
        for exon in 0..self.exon_count {
            if self.exon_starts[exon] <= mut_start && mut_end <= self.exon_ends[exon] {
                position.is_in_exon = true;
                position.exon_len = self.exon_ends[exon] - self.exon_starts[exon];
                position.exon_number = match self.strand {
                    Strand::Forward => exon + 1,
                    Strand::Reverse => self.exon_count - exon,
                };
            }
        }
        position
    }
}

/// Where a variant sits relative to the exon structure of its transcript.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MutationPosition {
    /// 1-based, strand-corrected; 0 when the position is not exonic.
    pub exon_number: usize,
    pub mut_start: i64,
    pub mut_end: i64,
    pub mut_length: i64,
    pub is_in_exon: bool,
    pub exon_len: i64,
}

/// Read-only transcript annotation lookups.
pub trait GeneStore {
    fn gene_by_transcript(
        &self,
        accession: &str,
    ) -> Result<Option<GeneAnnotation>, PrimertoolError>;
}

/// Read-only common-SNP lookups: stored start coordinates of single-base
/// variants whose end coordinate falls within the closed query interval.
pub trait SnpStore {
    fn common_snps(
        &self,
        chromosome: &str,
        seq_start: i64,
        seq_end: i64,
    ) -> Result<Vec<i64>, PrimertoolError>;
}

/// Gene store over a locally cached UCSC `refGene.txt` table dump.
#[derive(Debug)]
pub struct RefGeneTable {
    path: PathBuf,
}

impl RefGeneTable {
    /// Open the cached table for `assembly` under `cache_dir`, downloading it
    /// from the UCSC download server when missing.
    pub fn prepare(assembly: &str, cache_dir: &Path) -> Result<Self, PrimertoolError> {
        let dir = cache_dir.join(assembly);
        fs::create_dir_all(&dir)?;
        let path = dir.join("refGene.txt");
        if !path.exists() {
            let url = format!("{UCSC_DOWNLOAD_BASE}/{assembly}/database/refGene.txt.gz");
            log::info!("Downloading refGene table for {assembly} from {url}");
            download_unpacked(&url, &path)?;
        }
        Ok(Self { path })
    }

    /// Open an existing table dump (uncompressed, tab-separated).
    pub fn from_file(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn parse_row(record: &csv::StringRecord) -> Result<GeneAnnotation, PrimertoolError> {
        let field = |i: usize| -> Result<&str, PrimertoolError> {
            record.get(i).ok_or_else(|| {
                PrimertoolError::RemoteService(format!(
                    "refGene row has fewer than {} columns",
                    i + 1
                ))
            })
        };
        let exon_count = field(8)?.parse::<usize>().map_err(|e| {
            PrimertoolError::RemoteService(format!("Unreadable exonCount in refGene row: {e}"))
        })?;
        let parse_list = |raw: &str, what: &str| -> Result<Vec<i64>, PrimertoolError> {
            raw.split(',')
                .filter(|part| !part.is_empty())
                .map(|part| {
                    part.parse::<i64>().map_err(|e| {
                        PrimertoolError::RemoteService(format!(
                            "Unreadable {what} entry '{part}' in refGene row: {e}"
                        ))
                    })
                })
                .collect()
        };
        let annotation = GeneAnnotation {
            transcript_id: field(1)?.to_string(),
            chromosome: field(2)?.to_string(),
            strand: Strand::from_symbol(field(3)?)?,
            gene_name: field(12)?.to_string(),
            exon_count,
            exon_starts: parse_list(field(9)?, "exonStarts")?,
            exon_ends: parse_list(field(10)?, "exonEnds")?,
        };
        if annotation.exon_starts.len() != annotation.exon_count
            || annotation.exon_ends.len() != annotation.exon_count
        {
            return Err(PrimertoolError::RemoteService(format!(
                "refGene row for {} has {} exons but {}/{} boundary entries",
                annotation.transcript_id,
                annotation.exon_count,
                annotation.exon_starts.len(),
                annotation.exon_ends.len()
            )));
        }
        Ok(annotation)
    }
}

impl GeneStore for RefGeneTable {
    fn gene_by_transcript(
        &self,
        accession: &str,
    ) -> Result<Option<GeneAnnotation>, PrimertoolError> {
        let file = File::open(&self.path)?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut matches: Vec<GeneAnnotation> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| {
                PrimertoolError::RemoteService(format!(
                    "Could not read refGene table '{}': {e}",
                    self.path.display()
                ))
            })?;
            if record.get(1) == Some(accession) {
                matches.push(Self::parse_row(&record)?);
            }
        }
        if matches.len() > 1 {
            // Accessions mapped to both a primary chromosome and an alt/fix
            // contig: keep the primary placement.
            if let Some(primary) = matches.iter().find(|m| m.chromosome.len() < 6) {
                return Ok(Some(primary.clone()));
            }
        }
        Ok(matches.into_iter().next())
    }
}

/// Common-SNP store over the UCSC JSON API.
#[derive(Debug)]
pub struct UcscApiSnps {
    client: reqwest::blocking::Client,
    base_url: String,
    assembly: String,
}

impl UcscApiSnps {
    pub fn new(assembly: &str) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: UCSC_API_BASE.to_string(),
            assembly: assembly.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
struct SnpRow {
    #[serde(default, rename = "chromStart")]
    chrom_start: i64,
    #[serde(default, rename = "chromEnd")]
    chrom_end: i64,
    #[serde(default)]
    class: String,
}

impl SnpStore for UcscApiSnps {
    fn common_snps(
        &self,
        chromosome: &str,
        seq_start: i64,
        seq_end: i64,
    ) -> Result<Vec<i64>, PrimertoolError> {
        let url = format!("{}/getData/track", self.base_url);
        let start = seq_start.max(0).to_string();
        let end = seq_end.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("genome", self.assembly.as_str()),
                ("track", COMMON_SNP_TRACK),
                ("chrom", chromosome),
                ("start", start.as_str()),
                ("end", end.as_str()),
            ])
            .send()?
            .error_for_status()
            .map_err(|e| {
                PrimertoolError::RemoteService(format!(
                    "SNP track request failed for {chromosome}:{seq_start}-{seq_end}: {e}"
                ))
            })?;
        let body: serde_json::Value = response.json()?;

        // Single-chromosome queries return the rows as an array; whole-track
        // responses key them by chromosome.
        let rows = match body.get(COMMON_SNP_TRACK) {
            Some(serde_json::Value::Array(rows)) => rows.clone(),
            Some(serde_json::Value::Object(by_chrom)) => by_chrom
                .values()
                .filter_map(|v| v.as_array())
                .flatten()
                .cloned()
                .collect(),
            _ => Vec::new(),
        };

        let mut positions = Vec::new();
        for row in rows {
            let row: SnpRow = serde_json::from_value(row)?;
            if row.class == "single" && row.chrom_end >= seq_start && row.chrom_end <= seq_end {
                positions.push(row.chrom_start);
            }
        }
        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn toy_annotation(strand: Strand) -> GeneAnnotation {
        GeneAnnotation {
            transcript_id: "NM_000451".to_string(),
            chromosome: "chrX".to_string(),
            strand,
            gene_name: "SHOX".to_string(),
            exon_count: 6,
            exon_starts: vec![624343, 630189, 640320, 646090, 650310, 655400],
            exon_ends: vec![624602, 630480, 640600, 646300, 650500, 655800],
        }
    }

    #[test]
    fn test_exon_boundaries_forward_strand() {
        let annotation = toy_annotation(Strand::Forward);
        assert_eq!(annotation.exon_boundaries(1).unwrap(), (624343, 624602));
        assert_eq!(annotation.exon_boundaries(6).unwrap(), (655400, 655800));
    }

    #[test]
    fn test_exon_boundaries_reverse_strand_mirrors_index() {
        let annotation = toy_annotation(Strand::Reverse);
        assert_eq!(annotation.exon_boundaries(1).unwrap(), (655400, 655800));
        assert_eq!(annotation.exon_boundaries(6).unwrap(), (624343, 624602));
    }

    #[test]
    fn test_exon_boundaries_out_of_range() {
        let annotation = toy_annotation(Strand::Forward);
        assert!(matches!(
            annotation.exon_boundaries(7),
            Err(PrimertoolError::InvalidInput(_))
        ));
        assert!(annotation.exon_boundaries(0).is_err());
    }

    #[test]
    fn test_locate_mutation_in_exon() {
        let annotation = toy_annotation(Strand::Forward);
        let position = annotation.locate_mutation(630200, 630201);
        assert!(position.is_in_exon);
        assert_eq!(position.exon_number, 2);
        assert_eq!(position.exon_len, 291);
        assert_eq!(position.mut_length, 1);
    }

    #[test]
    fn test_locate_mutation_reverse_strand_numbering() {
        let annotation = toy_annotation(Strand::Reverse);
        let position = annotation.locate_mutation(630200, 630201);
        assert!(position.is_in_exon);
        assert_eq!(position.exon_number, 5);
    }

    #[test]
    fn test_locate_mutation_intronic() {
        let annotation = toy_annotation(Strand::Forward);
        let position = annotation.locate_mutation(625000, 625002);
        assert!(!position.is_in_exon);
        assert_eq!(position.exon_number, 0);
        assert_eq!(position.exon_len, 0);
    }

    fn write_refgene_table(dir: &Path) -> PathBuf {
        let path = dir.join("refGene.txt");
        let mut f = File::create(&path).unwrap();
        // bin name chrom strand txStart txEnd cdsStart cdsEnd exonCount
        // exonStarts exonEnds score name2 ...
        writeln!(
            f,
            "0\tNM_000451\tchrX\t+\t624343\t655800\t624343\t655800\t2\t624343,630189,\t624602,630480,\t0\tSHOX\tcmpl\tcmpl\t0,0,"
        )
        .unwrap();
        writeln!(
            f,
            "1\tNM_999999\tchrX_alt1\t-\t1000\t2000\t1000\t2000\t1\t1000,\t2000,\t0\tALTGENE\tcmpl\tcmpl\t0,"
        )
        .unwrap();
        writeln!(
            f,
            "2\tNM_999999\tchr7\t-\t1000\t2000\t1000\t2000\t1\t1000,\t2000,\t0\tALTGENE\tcmpl\tcmpl\t0,"
        )
        .unwrap();
        path
    }

    #[test]
    fn test_refgene_lookup() {
        let td = tempdir().unwrap();
        let table = RefGeneTable::from_file(&write_refgene_table(td.path()));
        let annotation = table.gene_by_transcript("NM_000451").unwrap().unwrap();
        assert_eq!(annotation.gene_name, "SHOX");
        assert_eq!(annotation.chromosome, "chrX");
        assert_eq!(annotation.strand, Strand::Forward);
        assert_eq!(annotation.exon_count, 2);
        assert_eq!(annotation.exon_starts, vec![624343, 630189]);
        assert_eq!(annotation.exon_ends, vec![624602, 630480]);
        assert!(table.gene_by_transcript("NM_000000").unwrap().is_none());
    }

    #[test]
    fn test_refgene_prefers_primary_chromosome() {
        let td = tempdir().unwrap();
        let table = RefGeneTable::from_file(&write_refgene_table(td.path()));
        let annotation = table.gene_by_transcript("NM_999999").unwrap().unwrap();
        assert_eq!(annotation.chromosome, "chr7");
    }
}
