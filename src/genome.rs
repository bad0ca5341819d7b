//! Reference genome sequence store.
//!
//! The shipped implementation keeps one uncompressed FASTA per assembly in a
//! local cache directory, downloading it from the UCSC download server on
//! first use, and serves region slices through a samtools-style line index.

use crate::error::PrimertoolError;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const UCSC_DOWNLOAD_BASE: &str = "https://hgdownload.soe.ucsc.edu/goldenPath";

/// Read-only access to reference sequence, 0-based half-open coordinates.
pub trait SequenceStore {
    fn fetch(&self, chromosome: &str, start: i64, end: i64) -> Result<String, PrimertoolError>;
}

#[derive(Clone, Copy, Debug)]
struct FastaLineIndex {
    length: u64,
    offset: u64,
    line_bases: u64,
    line_bytes: u64,
}

/// Locally cached genome assembly backed by an indexed FASTA file.
#[derive(Debug)]
pub struct GenomeCache {
    fasta_path: PathBuf,
    index: HashMap<String, FastaLineIndex>,
}

impl GenomeCache {
    /// Open the cached copy of `assembly` under `cache_dir`, downloading the
    /// FASTA from UCSC and building the line index when missing.
    pub fn prepare(assembly: &str, cache_dir: &Path) -> Result<Self, PrimertoolError> {
        let dir = cache_dir.join(assembly);
        fs::create_dir_all(&dir)?;
        let fasta_path = dir.join(format!("{assembly}.fa"));
        if !fasta_path.exists() {
            let url = format!("{UCSC_DOWNLOAD_BASE}/{assembly}/bigZips/{assembly}.fa.gz");
            log::info!("Downloading genome {assembly} from {url}");
            download_unpacked(&url, &fasta_path)?;
        }
        Self::from_fasta(&fasta_path)
    }

    /// Open an existing FASTA file, building the line index alongside it if
    /// it does not exist yet.
    pub fn from_fasta(fasta_path: &Path) -> Result<Self, PrimertoolError> {
        let index_path = index_path_for(fasta_path);
        if !index_path.exists() {
            let index = build_line_index(fasta_path)?;
            write_line_index(&index_path, &index)?;
        }
        let index = load_line_index(&index_path)?;
        Ok(Self {
            fasta_path: fasta_path.to_path_buf(),
            index,
        })
    }

    pub fn fasta_path(&self) -> &Path {
        &self.fasta_path
    }

    fn entry(&self, chromosome: &str) -> Result<&FastaLineIndex, PrimertoolError> {
        // Accept both "chr19" and "19" spellings regardless of how the FASTA
        // names its records.
        let stripped = chromosome.strip_prefix("chr");
        self.index
            .get(chromosome)
            .or_else(|| stripped.and_then(|bare| self.index.get(bare)))
            .or_else(|| {
                if stripped.is_none() {
                    self.index.get(&format!("chr{chromosome}"))
                } else {
                    None
                }
            })
            .ok_or_else(|| {
                PrimertoolError::GenomeStore(format!(
                    "Chromosome '{}' not found in genome FASTA '{}'",
                    chromosome,
                    self.fasta_path.display()
                ))
            })
    }
}

impl SequenceStore for GenomeCache {
    fn fetch(&self, chromosome: &str, start: i64, end: i64) -> Result<String, PrimertoolError> {
        if start < 0 || end <= start {
            return Err(PrimertoolError::GenomeStore(format!(
                "Invalid sequence interval {start}..{end} on {chromosome}"
            )));
        }
        let entry = *self.entry(chromosome)?;
        if end as u64 > entry.length {
            return Err(PrimertoolError::GenomeStore(format!(
                "Requested end {} exceeds length {} of chromosome {}",
                end, entry.length, chromosome
            )));
        }

        let row = start as u64 / entry.line_bases;
        let col = start as u64 % entry.line_bases;
        let mut file = File::open(&self.fasta_path)?;
        file.seek(SeekFrom::Start(
            entry.offset + row * entry.line_bytes + col,
        ))?;
        let mut reader = BufReader::new(file);

        let wanted = (end - start) as usize;
        let mut out = Vec::with_capacity(wanted);
        let mut chunk = [0u8; 8192];
        while out.len() < wanted {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            for b in &chunk[..n] {
                if *b == b'\n' || *b == b'\r' {
                    continue;
                }
                out.push(*b);
                if out.len() == wanted {
                    break;
                }
            }
        }
        if out.len() != wanted {
            return Err(PrimertoolError::GenomeStore(format!(
                "Could not read {}:{}-{} from '{}'; got {} of {} bases",
                chromosome,
                start,
                end,
                self.fasta_path.display(),
                out.len(),
                wanted
            )));
        }
        String::from_utf8(out).map_err(|e| {
            PrimertoolError::GenomeStore(format!("Extracted sequence is not valid UTF-8: {e}"))
        })
    }
}

fn index_path_for(fasta_path: &Path) -> PathBuf {
    let mut os = fasta_path.as_os_str().to_os_string();
    os.push(".fai");
    PathBuf::from(os)
}

/// Download `url` to `destination`, transparently gunzipping `.gz` sources.
/// Written through a `.part` temp file so an interrupted download never
/// leaves a truncated destination behind.
pub(crate) fn download_unpacked(url: &str, destination: &Path) -> Result<(), PrimertoolError> {
    let response = reqwest::blocking::get(url)?.error_for_status().map_err(|e| {
        PrimertoolError::RemoteService(format!("Could not fetch '{url}': {e}"))
    })?;

    let mut part = destination.as_os_str().to_os_string();
    part.push(".part");
    let part = PathBuf::from(part);
    let mut writer = BufWriter::new(File::create(&part)?);

    let result = if url.ends_with(".gz") {
        let mut decoder = GzDecoder::new(response);
        std::io::copy(&mut decoder, &mut writer)
    } else {
        let mut reader = response;
        std::io::copy(&mut reader, &mut writer)
    };
    if let Err(e) = result {
        let _ = fs::remove_file(&part);
        return Err(PrimertoolError::RemoteService(format!(
            "Could not materialize '{url}': {e}"
        )));
    }
    writer.flush()?;
    drop(writer);
    fs::rename(&part, destination)?;
    Ok(())
}

fn build_line_index(
    fasta_path: &Path,
) -> Result<Vec<(String, FastaLineIndex)>, PrimertoolError> {
    let file = File::open(fasta_path)?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    let mut byte_offset: u64 = 0;
    let mut entries: Vec<(String, FastaLineIndex)> = Vec::new();
    let mut active: Option<(String, FastaLineIndex)> = None;

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            break;
        }
        let stripped = line.trim_end_matches(['\n', '\r']);
        if let Some(header) = stripped.strip_prefix('>') {
            if let Some(done) = active.take() {
                entries.push(done);
            }
            let name = header.split_whitespace().next().ok_or_else(|| {
                PrimertoolError::GenomeStore(format!(
                    "FASTA '{}' has a malformed header line",
                    fasta_path.display()
                ))
            })?;
            active = Some((
                name.to_string(),
                FastaLineIndex {
                    length: 0,
                    offset: 0,
                    line_bases: 0,
                    line_bytes: 0,
                },
            ));
        } else if !stripped.is_empty() {
            let (_, entry) = active.as_mut().ok_or_else(|| {
                PrimertoolError::GenomeStore(format!(
                    "FASTA '{}' contains sequence before the first header",
                    fasta_path.display()
                ))
            })?;
            if entry.line_bases == 0 {
                entry.offset = byte_offset;
                entry.line_bases = stripped.len() as u64;
                entry.line_bytes = bytes_read as u64;
            } else if stripped.len() as u64 > entry.line_bases {
                return Err(PrimertoolError::GenomeStore(format!(
                    "FASTA '{}' has inconsistent line lengths",
                    fasta_path.display()
                )));
            }
            entry.length += stripped.len() as u64;
        }
        byte_offset += bytes_read as u64;
    }
    if let Some(done) = active {
        entries.push(done);
    }
    if entries.is_empty() {
        return Err(PrimertoolError::GenomeStore(format!(
            "FASTA '{}' contains no sequence records",
            fasta_path.display()
        )));
    }
    Ok(entries)
}

fn write_line_index(
    index_path: &Path,
    entries: &[(String, FastaLineIndex)],
) -> Result<(), PrimertoolError> {
    let mut writer = BufWriter::new(File::create(index_path)?);
    for (name, entry) in entries {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}",
            name, entry.length, entry.offset, entry.line_bases, entry.line_bytes
        )?;
    }
    writer.flush()?;
    Ok(())
}

fn load_line_index(
    index_path: &Path,
) -> Result<HashMap<String, FastaLineIndex>, PrimertoolError> {
    let reader = BufReader::new(File::open(index_path)?);
    let mut map = HashMap::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let cols: Vec<&str> = trimmed.split('\t').collect();
        if cols.len() < 5 {
            return Err(PrimertoolError::GenomeStore(format!(
                "Invalid FASTA index line {} in '{}'",
                i + 1,
                index_path.display()
            )));
        }
        let parse = |field: &str| -> Result<u64, PrimertoolError> {
            field.parse::<u64>().map_err(|e| {
                PrimertoolError::GenomeStore(format!(
                    "Invalid FASTA index value '{}' at line {} in '{}': {e}",
                    field,
                    i + 1,
                    index_path.display()
                ))
            })
        };
        map.insert(
            cols[0].to_string(),
            FastaLineIndex {
                length: parse(cols[1])?,
                offset: parse(cols[2])?,
                line_bases: parse(cols[3])?,
                line_bytes: parse(cols[4])?,
            },
        );
    }
    if map.is_empty() {
        return Err(PrimertoolError::GenomeStore(format!(
            "FASTA index '{}' is empty",
            index_path.display()
        )));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn toy_genome(dir: &Path) -> GenomeCache {
        let fasta = dir.join("toy.fa");
        fs::write(&fasta, ">chr1 test\nACGTACGT\nACGTACGT\nACGT\n>2\nTTTTGGGG\n").unwrap();
        GenomeCache::from_fasta(&fasta).unwrap()
    }

    #[test]
    fn test_fetch_region_across_lines() {
        let td = tempdir().unwrap();
        let genome = toy_genome(td.path());
        assert_eq!(genome.fetch("chr1", 0, 4).unwrap(), "ACGT");
        assert_eq!(genome.fetch("chr1", 6, 10).unwrap(), "GTAC");
        assert_eq!(genome.fetch("chr1", 0, 20).unwrap(), "ACGTACGTACGTACGTACGT");
    }

    #[test]
    fn test_chromosome_name_tolerance() {
        let td = tempdir().unwrap();
        let genome = toy_genome(td.path());
        assert_eq!(genome.fetch("1", 0, 4).unwrap(), "ACGT");
        assert_eq!(genome.fetch("chr2", 0, 4).unwrap(), "TTTT");
        assert_eq!(genome.fetch("2", 4, 8).unwrap(), "GGGG");
    }

    #[test]
    fn test_invalid_intervals_are_rejected() {
        let td = tempdir().unwrap();
        let genome = toy_genome(td.path());
        assert!(genome.fetch("chr1", -5, 4).is_err());
        assert!(genome.fetch("chr1", 4, 4).is_err());
        assert!(genome.fetch("chr1", 0, 99).is_err());
        assert!(genome.fetch("chrUnknown", 0, 4).is_err());
    }

    #[test]
    fn test_index_is_reused() {
        let td = tempdir().unwrap();
        let genome = toy_genome(td.path());
        let index_path = index_path_for(genome.fasta_path());
        assert!(index_path.exists());
        let reopened = GenomeCache::from_fasta(genome.fasta_path()).unwrap();
        assert_eq!(reopened.fetch("chr1", 16, 20).unwrap(), "ACGT");
    }
}
