//! Assembly of accepted primer pairs into the final order table.

use crate::annotation::{GeneAnnotation, Strand};
use crate::design::PrimerPair;
use crate::error::PrimertoolError;
use serde::Serialize;

/// One order line, one primer strand per row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderTableRow {
    pub date: String,
    pub person: Option<String>,
    /// Packed label: `<id>;<sequence>`.
    pub primer: String,
    pub gene: Option<String>,
    pub transcript: Option<String>,
    pub melting_temp: f64,
    pub product_size: i64,
}

/// The terminal artifact of a resolution request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderTable {
    pub rows: Vec<OrderTableRow>,
}

impl OrderTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn extend(&mut self, other: OrderTable) {
        self.rows.extend(other.rows);
    }

    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<(), PrimertoolError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv_writer.serialize(row).map_err(|e| {
                PrimertoolError::Io(std::io::Error::other(format!(
                    "Could not write order table: {e}"
                )))
            })?;
        }
        csv_writer.flush().map_err(PrimertoolError::from)
    }

    pub fn to_csv_string(&self) -> Result<String, PrimertoolError> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            PrimertoolError::Io(std::io::Error::other(format!(
                "Order table is not valid UTF-8: {e}"
            )))
        })
    }
}

/// Builds order rows for accepted pairs, stamping date and ordering person.
#[derive(Clone, Debug)]
pub struct OrderTableBuilder {
    date: String,
    person: Option<String>,
}

impl OrderTableBuilder {
    pub fn new(person: Option<&str>) -> Self {
        Self {
            date: chrono::Local::now().format("%d.%m.%Y").to_string(),
            person: person.map(str::to_string),
        }
    }

    pub fn with_date(date: &str, person: Option<&str>) -> Self {
        Self {
            date: date.to_string(),
            person: person.map(str::to_string),
        }
    }

    /// Rows for an exon-addressed pair: `{gene}-E{exon:02}{F|R};{sequence}`.
    /// On the reverse strand the design tool's right primer reads in
    /// transcript direction, so it becomes the forward order primer.
    pub fn exon_rows(
        &self,
        annotation: &GeneAnnotation,
        exon_number: usize,
        pair: &PrimerPair,
    ) -> [OrderTableRow; 2] {
        let (forward_seq, reverse_seq) = match annotation.strand {
            Strand::Forward => (&pair.left_sequence, &pair.right_sequence),
            Strand::Reverse => (&pair.right_sequence, &pair.left_sequence),
        };
        let forward = format!(
            "{}-E{:02}F;{}",
            annotation.gene_name, exon_number, forward_seq
        );
        let reverse = format!(
            "{}-E{:02}R;{}",
            annotation.gene_name, exon_number, reverse_seq
        );
        [
            self.row(
                forward,
                Some(annotation.gene_name.clone()),
                Some(annotation.transcript_id.clone()),
                pair,
            ),
            self.row(
                reverse,
                Some(annotation.gene_name.clone()),
                Some(annotation.transcript_id.clone()),
                pair,
            ),
        ]
    }

    /// Rows for a coordinate-addressed pair: `{chromosome}-{start|end}{F|R};{sequence}`.
    pub fn region_rows(
        &self,
        chromosome: &str,
        start: i64,
        end: i64,
        pair: &PrimerPair,
    ) -> [OrderTableRow; 2] {
        let forward = format!("{}-{}F;{}", chromosome, start, pair.left_sequence);
        let reverse = format!("{}-{}R;{}", chromosome, end, pair.right_sequence);
        [
            self.row(forward, None, None, pair),
            self.row(reverse, None, None, pair),
        ]
    }

    fn row(
        &self,
        primer: String,
        gene: Option<String>,
        transcript: Option<String>,
        pair: &PrimerPair,
    ) -> OrderTableRow {
        OrderTableRow {
            date: self.date.clone(),
            person: self.person.clone(),
            primer,
            gene,
            transcript,
            melting_temp: pair.melting_temp(),
            product_size: pair.product_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(strand: Strand) -> GeneAnnotation {
        GeneAnnotation {
            transcript_id: "NM_000451".to_string(),
            chromosome: "chrX".to_string(),
            strand,
            gene_name: "SHOX".to_string(),
            exon_count: 1,
            exon_starts: vec![624343],
            exon_ends: vec![624602],
        }
    }

    fn pair() -> PrimerPair {
        PrimerPair {
            index: 0,
            left_sequence: "CCTGGGCAACAAAGCAAGAC".to_string(),
            right_sequence: "TGCGCTTGTAATGTCAATAGCT".to_string(),
            left_tm: 59.6,
            right_tm: 60.2,
            product_size: 412,
        }
    }

    #[test]
    fn test_exon_rows_forward_strand() {
        let builder = OrderTableBuilder::with_date("24.12.2025", Some("AB"));
        let rows = builder.exon_rows(&annotation(Strand::Forward), 3, &pair());
        assert_eq!(rows[0].primer, "SHOX-E03F;CCTGGGCAACAAAGCAAGAC");
        assert_eq!(rows[1].primer, "SHOX-E03R;TGCGCTTGTAATGTCAATAGCT");
        assert_eq!(rows[0].person.as_deref(), Some("AB"));
        assert_eq!(rows[0].melting_temp, 60.0);
        assert_eq!(rows[0].product_size, 412);
        assert_eq!(rows[0].transcript.as_deref(), Some("NM_000451"));
    }

    #[test]
    fn test_exon_rows_reverse_strand_swaps_primers() {
        let builder = OrderTableBuilder::with_date("24.12.2025", None);
        let rows = builder.exon_rows(&annotation(Strand::Reverse), 12, &pair());
        assert_eq!(rows[0].primer, "SHOX-E12F;TGCGCTTGTAATGTCAATAGCT");
        assert_eq!(rows[1].primer, "SHOX-E12R;CCTGGGCAACAAAGCAAGAC");
    }

    #[test]
    fn test_region_rows() {
        let builder = OrderTableBuilder::with_date("24.12.2025", None);
        let rows = builder.region_rows("chr19", 44905790, 44906000, &pair());
        assert_eq!(rows[0].primer, "chr19-44905790F;CCTGGGCAACAAAGCAAGAC");
        assert_eq!(rows[1].primer, "chr19-44906000R;TGCGCTTGTAATGTCAATAGCT");
        assert!(rows[0].gene.is_none());
    }

    #[test]
    fn test_csv_export() {
        let builder = OrderTableBuilder::with_date("24.12.2025", Some("AB"));
        let rows = builder.region_rows("chr19", 100, 400, &pair());
        let table = OrderTable {
            rows: rows.to_vec(),
        };
        let csv = table.to_csv_string().unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "date,person,primer,gene,transcript,melting_temp,product_size"
        );
        assert!(lines.next().unwrap().starts_with("24.12.2025,AB,chr19-100F;"));
    }
}
