//! Masking of common SNP positions before primer design.

use crate::annotation::SnpStore;
use crate::error::PrimertoolError;
use crate::genome::SequenceStore;

/// Fetch `[seq_start, seq_end)`, upper-case it, and replace every base at a
/// common single-nucleotide variant position with `N` so the design tool
/// cannot anchor a primer on it.
pub fn mask_common_snps(
    genome: &dyn SequenceStore,
    snps: &dyn SnpStore,
    chromosome: &str,
    seq_start: i64,
    seq_end: i64,
) -> Result<String, PrimertoolError> {
    let sequence = genome
        .fetch(chromosome, seq_start, seq_end)?
        .to_ascii_uppercase();

    let positions = snps.common_snps(chromosome, seq_start, seq_end)?;
    if positions.is_empty() {
        return Ok(sequence);
    }

    let mut bases = sequence.into_bytes();
    for stored in positions {
        // The store hands back closed-interval start coordinates selected by
        // their end coordinate; `seq_end - stored` minus 2 lands on the
        // variant base within the slice. Changing this arithmetic changes
        // which base is masked and needs sign-off against the store's
        // coordinate convention.
        let index = seq_end - stored - 2;
        if index >= 0 {
            if let Some(base) = bases.get_mut(index as usize) {
                *base = b'N';
            }
        }
    }
    String::from_utf8(bases).map_err(|e| {
        PrimertoolError::GenomeStore(format!("Masked sequence is not valid UTF-8: {e}"))
    })
}
