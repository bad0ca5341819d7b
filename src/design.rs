//! Primer design oracle: configuration record, output model, and a
//! Boulder-IO subprocess adapter around `primer3_core`.

use crate::error::PrimertoolError;
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

const DEFAULT_PRIMER3_BIN: &str = "primer3_core";
const PRIMER3_ENV_BIN: &str = "PRIMERTOOL_PRIMER3_BIN";

/// Constraint set handed to the design tool on every attempt. Immutable
/// record with one field per tuning parameter instead of a loose tag map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DesignConfig {
    pub optimal_size: u32,
    pub min_size: u32,
    pub max_size: u32,
    pub optimal_tm: f64,
    pub min_tm: f64,
    pub max_tm: f64,
    /// Longest allowed homopolymer run.
    pub max_poly_x: u32,
    /// Number of 3' G/C bases required.
    pub gc_clamp: u32,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            optimal_size: 20,
            min_size: 20,
            max_size: 22,
            optimal_tm: 60.0,
            min_tm: 58.0,
            max_tm: 62.0,
            max_poly_x: 5,
            gc_clamp: 1,
        }
    }
}

/// One candidate primer pair as reported by the design tool.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimerPair {
    /// Positional index within the design output; kept contiguous from 0
    /// across filtering.
    pub index: usize,
    pub left_sequence: String,
    pub right_sequence: String,
    pub left_tm: f64,
    pub right_tm: f64,
    pub product_size: i64,
}

impl PrimerPair {
    /// Average of both primer melting temperatures, rounded to a whole degree.
    pub fn melting_temp(&self) -> f64 {
        ((self.left_tm + self.right_tm) / 2.0).round()
    }
}

/// "Number returned" counters reported alongside the pair list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PairCounts {
    pub left: usize,
    pub right: usize,
    pub pairs: usize,
}

/// Full design tool output for one attempt.
#[derive(Clone, Debug, Default)]
pub struct DesignOutput {
    pub pairs: Vec<PrimerPair>,
    pub counts: PairCounts,
}

/// The external primer design oracle. Synchronous and CPU-bound; no network.
pub trait PrimerDesigner {
    fn design(
        &self,
        template: &str,
        target_offset: i64,
        target_length: i64,
        size_range: [i64; 2],
        config: &DesignConfig,
    ) -> Result<DesignOutput, PrimertoolError>;
}

/// Drives a local `primer3_core` executable over Boulder-IO records.
#[derive(Clone, Debug)]
pub struct Primer3Process {
    executable: String,
}

impl Default for Primer3Process {
    fn default() -> Self {
        Self::new()
    }
}

impl Primer3Process {
    pub fn new() -> Self {
        let executable = std::env::var(PRIMER3_ENV_BIN)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_PRIMER3_BIN.to_string());
        Self { executable }
    }

    pub fn with_executable(executable: &str) -> Self {
        Self {
            executable: executable.to_string(),
        }
    }

    fn boulder_input(
        template: &str,
        target_offset: i64,
        target_length: i64,
        size_range: [i64; 2],
        config: &DesignConfig,
    ) -> String {
        let mut record = String::new();
        record.push_str(&format!("SEQUENCE_TEMPLATE={template}\n"));
        record.push_str(&format!("SEQUENCE_TARGET={target_offset},{target_length}\n"));
        record.push_str(&format!("PRIMER_OPT_SIZE={}\n", config.optimal_size));
        record.push_str(&format!("PRIMER_MIN_SIZE={}\n", config.min_size));
        record.push_str(&format!("PRIMER_MAX_SIZE={}\n", config.max_size));
        record.push_str(&format!("PRIMER_OPT_TM={}\n", config.optimal_tm));
        record.push_str(&format!("PRIMER_MIN_TM={}\n", config.min_tm));
        record.push_str(&format!("PRIMER_MAX_TM={}\n", config.max_tm));
        record.push_str(&format!("PRIMER_MAX_POLY_X={}\n", config.max_poly_x));
        record.push_str(&format!("PRIMER_GC_CLAMP={}\n", config.gc_clamp));
        record.push_str(&format!(
            "PRIMER_PRODUCT_SIZE_RANGE={}-{}\n",
            size_range[0], size_range[1]
        ));
        record.push_str("=\n");
        record
    }

    fn run(&self, input: &str) -> Result<String, PrimertoolError> {
        let mut child = Command::new(&self.executable)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    PrimertoolError::DesignTool(format!(
                        "Could not find primer design executable '{}'. Install primer3 or set {}",
                        self.executable, PRIMER3_ENV_BIN
                    ))
                } else {
                    PrimertoolError::DesignTool(format!(
                        "Could not run primer design executable '{}': {e}",
                        self.executable
                    ))
                }
            })?;
        child
            .stdin
            .as_mut()
            .ok_or_else(|| {
                PrimertoolError::DesignTool("Design tool stdin is not available".to_string())
            })?
            .write_all(input.as_bytes())?;
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(PrimertoolError::DesignTool(format!(
                "Design tool '{}' failed (status={:?}): {}",
                self.executable,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl PrimerDesigner for Primer3Process {
    fn design(
        &self,
        template: &str,
        target_offset: i64,
        target_length: i64,
        size_range: [i64; 2],
        config: &DesignConfig,
    ) -> Result<DesignOutput, PrimertoolError> {
        let input = Self::boulder_input(template, target_offset, target_length, size_range, config);
        let stdout = self.run(&input)?;
        parse_boulder_output(&stdout)
    }
}

/// Parse a `KEY=VALUE` Boulder-IO record into a [`DesignOutput`].
pub fn parse_boulder_output(text: &str) -> Result<DesignOutput, PrimertoolError> {
    let mut tags: HashMap<&str, &str> = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line == "=" {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            tags.insert(key, value);
        }
    }

    if let Some(problem) = tags.get("PRIMER_ERROR") {
        return Err(PrimertoolError::DesignTool(format!(
            "Design tool reported an error: {problem}"
        )));
    }

    let counts = PairCounts {
        left: parse_tag_usize(&tags, "PRIMER_LEFT_NUM_RETURNED")?,
        right: parse_tag_usize(&tags, "PRIMER_RIGHT_NUM_RETURNED")?,
        pairs: parse_tag_usize(&tags, "PRIMER_PAIR_NUM_RETURNED")?,
    };

    let mut pairs = Vec::with_capacity(counts.pairs);
    for index in 0..counts.pairs {
        pairs.push(PrimerPair {
            index,
            left_sequence: require_tag(&tags, &format!("PRIMER_LEFT_{index}_SEQUENCE"))?
                .to_string(),
            right_sequence: require_tag(&tags, &format!("PRIMER_RIGHT_{index}_SEQUENCE"))?
                .to_string(),
            left_tm: parse_tag_f64(&tags, &format!("PRIMER_LEFT_{index}_TM"))?,
            right_tm: parse_tag_f64(&tags, &format!("PRIMER_RIGHT_{index}_TM"))?,
            product_size: require_tag(&tags, &format!("PRIMER_PAIR_{index}_PRODUCT_SIZE"))?
                .parse::<i64>()
                .map_err(|e| {
                    PrimertoolError::DesignTool(format!("Unreadable product size in design output: {e}"))
                })?,
        });
    }

    Ok(DesignOutput { pairs, counts })
}

fn require_tag<'a>(
    tags: &HashMap<&str, &'a str>,
    key: &str,
) -> Result<&'a str, PrimertoolError> {
    tags.get(key).copied().ok_or_else(|| {
        PrimertoolError::DesignTool(format!("Design output is missing tag '{key}'"))
    })
}

fn parse_tag_usize(tags: &HashMap<&str, &str>, key: &str) -> Result<usize, PrimertoolError> {
    require_tag(tags, key)?.parse::<usize>().map_err(|e| {
        PrimertoolError::DesignTool(format!("Unreadable value for tag '{key}': {e}"))
    })
}

fn parse_tag_f64(tags: &HashMap<&str, &str>, key: &str) -> Result<f64, PrimertoolError> {
    require_tag(tags, key)?.parse::<f64>().map_err(|e| {
        PrimertoolError::DesignTool(format!("Unreadable value for tag '{key}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boulder_input_record() {
        let input = Primer3Process::boulder_input("ACGT", 100, 250, [250, 300], &DesignConfig::default());
        assert!(input.starts_with("SEQUENCE_TEMPLATE=ACGT\n"));
        assert!(input.contains("SEQUENCE_TARGET=100,250\n"));
        assert!(input.contains("PRIMER_MAX_POLY_X=5\n"));
        assert!(input.contains("PRIMER_GC_CLAMP=1\n"));
        assert!(input.contains("PRIMER_PRODUCT_SIZE_RANGE=250-300\n"));
        assert!(input.ends_with("=\n"));
    }

    #[test]
    fn test_parse_boulder_output() {
        let text = "PRIMER_LEFT_NUM_RETURNED=2\n\
                    PRIMER_RIGHT_NUM_RETURNED=2\n\
                    PRIMER_PAIR_NUM_RETURNED=2\n\
                    PRIMER_LEFT_0_SEQUENCE=CCTGGGCAACAAAGCAAGAC\n\
                    PRIMER_RIGHT_0_SEQUENCE=TGCGCTTGTAATGTCAATAGCT\n\
                    PRIMER_LEFT_0_TM=59.8\n\
                    PRIMER_RIGHT_0_TM=60.2\n\
                    PRIMER_PAIR_0_PRODUCT_SIZE=412\n\
                    PRIMER_LEFT_1_SEQUENCE=AAACCCGGGTTTAAACCCGG\n\
                    PRIMER_RIGHT_1_SEQUENCE=GGGTTTAAACCCGGGTTTAA\n\
                    PRIMER_LEFT_1_TM=58.1\n\
                    PRIMER_RIGHT_1_TM=61.9\n\
                    PRIMER_PAIR_1_PRODUCT_SIZE=380\n\
                    =\n";
        let output = parse_boulder_output(text).unwrap();
        assert_eq!(output.counts.pairs, 2);
        assert_eq!(output.pairs.len(), 2);
        assert_eq!(output.pairs[0].left_sequence, "CCTGGGCAACAAAGCAAGAC");
        assert_eq!(output.pairs[0].product_size, 412);
        assert_eq!(output.pairs[0].melting_temp(), 60.0);
        assert_eq!(output.pairs[1].index, 1);
    }

    #[test]
    fn test_parse_design_error() {
        let text = "PRIMER_ERROR=SEQUENCE_TARGET beyond end of sequence\n=\n";
        assert!(matches!(
            parse_boulder_output(text),
            Err(PrimertoolError::DesignTool(_))
        ));
    }

    #[test]
    fn test_parse_no_pairs() {
        let text = "PRIMER_LEFT_NUM_RETURNED=0\n\
                    PRIMER_RIGHT_NUM_RETURNED=0\n\
                    PRIMER_PAIR_NUM_RETURNED=0\n=\n";
        let output = parse_boulder_output(text).unwrap();
        assert!(output.pairs.is_empty());
        assert_eq!(output.counts.pairs, 0);
    }
}
