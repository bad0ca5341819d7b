//! Iterative primer search over one or more windows.
//!
//! Per window the engine grows the flanking context in 100-base steps and
//! asks the design tool for candidates, purging non-unique pairs after each
//! attempt. When candidates existed but none bound uniquely, the window
//! itself is widened and the flank search restarts from that wider base
//! region. The search stops once a unique pair is found or the product size
//! ceiling passes the maximum insert size.

use crate::annotation::SnpStore;
use crate::chunking::{InsertPolicy, Window};
use crate::design::{DesignConfig, PrimerDesigner, PrimerPair};
use crate::error::PrimertoolError;
use crate::genome::SequenceStore;
use crate::snp_mask::mask_common_snps;
use crate::targets::TargetInfo;
use crate::uniqueness::{filter_unique_pairs, UniquenessOracle};

const FLANK_STEP: i64 = 100;
const WIDEN_STEP: i64 = 100;

/// An accepted primer pair together with the (possibly widened) window it
/// was found in.
#[derive(Clone, Debug)]
pub struct WindowHit {
    pub pair: PrimerPair,
    pub window_start: i64,
    pub window_end: i64,
    /// 1-based position of the source window in the chunk sequence.
    pub window_index: usize,
}

/// Collaborator bundle for one search run.
pub struct SearchEngine<'a> {
    pub genome: &'a dyn SequenceStore,
    pub snps: &'a dyn SnpStore,
    pub designer: &'a dyn PrimerDesigner,
    pub uniqueness: &'a dyn UniquenessOracle,
    pub policy: InsertPolicy,
    pub design: DesignConfig,
}

impl SearchEngine<'_> {
    /// Search every window in order; windows without a unique pair are
    /// skipped, they do not fail the run.
    pub fn search_windows(
        &self,
        chromosome: &str,
        windows: impl IntoIterator<Item = Window>,
    ) -> Result<Vec<WindowHit>, PrimertoolError> {
        let mut hits = Vec::new();
        for (index, window) in windows.into_iter().enumerate() {
            if let Some(hit) = self.search_window(chromosome, window, index + 1)? {
                log::debug!(
                    "Primers found for position {}-{}",
                    hit.window_start,
                    hit.window_end
                );
                hits.push(hit);
            }
        }
        log::info!("Found {} primer pair(s)", hits.len());
        Ok(hits)
    }

    /// Run the widening search for a single window.
    pub fn search_window(
        &self,
        chromosome: &str,
        window: Window,
        window_index: usize,
    ) -> Result<Option<WindowHit>, PrimertoolError> {
        let mut window_start = window.start;
        let mut window_end = window.end;
        let mut primer_bases = FLANK_STEP;
        let mut size_ceiling: i64 = 0;
        let mut accepted: Option<PrimerPair> = None;

        while accepted.is_none() && size_ceiling <= self.policy.max_insert {
            let info = TargetInfo::compute(window_start, window_end, primer_bases);
            size_ceiling = info.size_ceiling();
            if size_ceiling > self.policy.max_insert {
                log::warn!(
                    "Stopping search for window {}:{}-{} (target size {} > max insert {}). No primers were found.",
                    chromosome,
                    window_start,
                    window_end,
                    size_ceiling,
                    self.policy.max_insert
                );
                return Ok(None);
            }

            let template = mask_common_snps(
                self.genome,
                self.snps,
                chromosome,
                info.seq_start,
                info.seq_end,
            )?;
            let output = self.designer.design(
                &template,
                info.target_offset,
                info.target_length,
                info.size_range,
                &self.design,
            )?;

            let (filtered, all_pairs_invalid) = filter_unique_pairs(output, self.uniqueness)?;

            if all_pairs_invalid {
                // Candidates existed but none bound uniquely: widen the base
                // region and restart the flank search from it.
                window_start = (window_start - WIDEN_STEP).max(0);
                window_end += WIDEN_STEP;
                primer_bases = 0;
            }
            primer_bases += FLANK_STEP;

            match filtered.pairs.into_iter().next() {
                Some(pair) => accepted = Some(pair),
                None => log::debug!(
                    "No unique primers within {} bases around the target yet, increasing the allowed distance to {} bases",
                    primer_bases - FLANK_STEP,
                    primer_bases
                ),
            }
        }

        Ok(accepted.map(|pair| WindowHit {
            pair,
            window_start,
            window_end,
            window_index,
        }))
    }
}
