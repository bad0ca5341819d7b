//! Minimal HGVS description parsing.
//!
//! Only what coordinate resolution needs: the reference accession, the
//! coordinate type and the position interval. Edit semantics (substitution,
//! deletion, ...) stay with the normalization service.

use crate::error::PrimertoolError;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Gene-name annotations like "NM_003165.6(STXBP1):c.1702G>A"
    static ref GENE_ANNOTATION: Regex = Regex::new(r"\([^)]*\)").unwrap();
    // Leading position of a posedit, optionally with an intronic offset and
    // an end position: "1702", "1702+3", "1702_1705", "1702+3_1705-2"
    static ref POSITION: Regex =
        Regex::new(r"^(\d+)(?:[+-]\d+)?(?:_(\d+)(?:[+-]\d+)?)?").unwrap();
}

/// A parsed HGVS description, reduced to what resolution consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HgvsVariant {
    /// Reference accession including version, e.g. `NM_000451.3`.
    pub accession: String,
    /// Coordinate type: 'c' (coding), 'g' (genomic), 'n', ...
    pub coord_type: char,
    pub start: i64,
    pub end: i64,
}

/// Parse an HGVS description. Gene names in parentheses are removed first.
pub fn parse_variant(description: &str) -> Result<HgvsVariant, PrimertoolError> {
    let cleaned = GENE_ANNOTATION.replace_all(description, "");
    let (accession, rest) = cleaned.split_once(':').ok_or_else(|| {
        PrimertoolError::InvalidInput(format!(
            "Could not parse '{description}': expected '<accession>:<description>'"
        ))
    })?;
    let (coord_type, posedit) = rest.split_once('.').ok_or_else(|| {
        PrimertoolError::InvalidInput(format!(
            "Could not parse '{description}': expected a coordinate type such as 'c.' or 'g.'"
        ))
    })?;
    let coord_type = match coord_type {
        t if t.len() == 1 => t.chars().next().unwrap(),
        other => {
            return Err(PrimertoolError::InvalidInput(format!(
                "Could not parse '{description}': unknown coordinate type '{other}'"
            )))
        }
    };
    let captures = POSITION.captures(posedit).ok_or_else(|| {
        PrimertoolError::InvalidInput(format!(
            "Could not parse position from '{description}'"
        ))
    })?;
    let parse_pos = |m: regex::Match| -> Result<i64, PrimertoolError> {
        m.as_str().parse::<i64>().map_err(|e| {
            PrimertoolError::InvalidInput(format!(
                "Could not parse position from '{description}': {e}"
            ))
        })
    };
    let start = parse_pos(captures.get(1).expect("mandatory capture"))?;
    let end = match captures.get(2) {
        Some(m) => parse_pos(m)?,
        None => start,
    };
    Ok(HgvsVariant {
        accession: accession.to_string(),
        coord_type,
        start,
        end,
    })
}

/// Split an accession into its transcript part and version (defaulting to 1).
pub fn split_accession(accession: &str) -> (String, u32) {
    match accession.split_once('.') {
        Some((transcript, version)) => (
            transcript.to_string(),
            version.parse::<u32>().unwrap_or(1),
        ),
        None => (accession.to_string(), 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coding_substitution() {
        let variant = parse_variant("NM_000451.3:c.1702G>A").unwrap();
        assert_eq!(variant.accession, "NM_000451.3");
        assert_eq!(variant.coord_type, 'c');
        assert_eq!(variant.start, 1702);
        assert_eq!(variant.end, 1702);
    }

    #[test]
    fn test_parse_removes_gene_annotation() {
        let variant = parse_variant("NM_003165.6(STXBP1):c.1702G>A").unwrap();
        assert_eq!(variant.accession, "NM_003165.6");
    }

    #[test]
    fn test_parse_genomic_range() {
        let variant = parse_variant("NC_000023.11:g.624400_624410del").unwrap();
        assert_eq!(variant.coord_type, 'g');
        assert_eq!(variant.start, 624400);
        assert_eq!(variant.end, 624410);
    }

    #[test]
    fn test_parse_intronic_offset_is_dropped_from_position() {
        let variant = parse_variant("NM_000451.3:c.1702+3G>A").unwrap();
        assert_eq!(variant.start, 1702);
        assert_eq!(variant.end, 1702);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(parse_variant("NM_000451.3").is_err());
        assert!(parse_variant("NM_000451.3:1702G>A").is_err());
        assert!(parse_variant("NM_000451.3:c.G>A").is_err());
    }

    #[test]
    fn test_split_accession() {
        assert_eq!(
            split_accession("NM_000451.3"),
            ("NM_000451".to_string(), 3)
        );
        assert_eq!(split_accession("NM_000451"), ("NM_000451".to_string(), 1));
    }
}
