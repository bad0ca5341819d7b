use primertool::annotation::{RefGeneTable, UcscApiSnps};
use primertool::chunking::InsertPolicy;
use primertool::design::{DesignConfig, Primer3Process};
use primertool::genome::GenomeCache;
use primertool::mutalyzer::MutalyzerClient;
use primertool::ordertable::OrderTable;
use primertool::request::{Assembly, PrimerPipeline};
use primertool::uniqueness::UcscInSilicoPcr;
use std::env;
use std::fs;
use std::path::PathBuf;

const DEFAULT_CACHE_DIR: &str = "data/ucsc";
const CACHE_DIR_ENV: &str = "PRIMERTOOL_CACHE_DIR";

fn usage() {
    eprintln!(
        "Usage:\n  \
  primertool [--assembly hg38|hg19] [--initials XX] [--out FILE.csv] exon ACCESSION EXON_NUMBER\n  \
  primertool [--assembly hg38|hg19] [--initials XX] [--out FILE.csv] gene ACCESSION\n  \
  primertool [--assembly hg38|hg19] [--initials XX] [--out FILE.csv] region CHROMOSOME START END\n  \
  primertool [--assembly hg38|hg19] [--initials XX] [--out FILE.csv] variant 'NM_000451.3:c.1702G>A'\n\n  \
  The genome and annotation caches live under {DEFAULT_CACHE_DIR} ({CACHE_DIR_ENV} overrides)."
    );
}

struct Options {
    assembly: Assembly,
    initials: Option<String>,
    out: Option<String>,
    rest: Vec<String>,
}

fn parse_options(args: &[String]) -> Result<Options, String> {
    let mut assembly = Assembly::Hg38;
    let mut initials = None;
    let mut out = None;
    let mut rest = Vec::new();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--assembly" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| "Missing value for --assembly".to_string())?;
                assembly = Assembly::parse(value).map_err(|e| e.to_string())?;
                i += 2;
            }
            "--initials" => {
                initials = Some(
                    args.get(i + 1)
                        .ok_or_else(|| "Missing value for --initials".to_string())?
                        .clone(),
                );
                i += 2;
            }
            "--out" => {
                out = Some(
                    args.get(i + 1)
                        .ok_or_else(|| "Missing value for --out".to_string())?
                        .clone(),
                );
                i += 2;
            }
            _ => {
                rest.push(args[i].clone());
                i += 1;
            }
        }
    }
    Ok(Options {
        assembly,
        initials,
        out,
        rest,
    })
}

fn cache_dir() -> PathBuf {
    env::var(CACHE_DIR_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR))
}

fn parse_position(value: &str, what: &str) -> Result<i64, String> {
    value
        .parse::<i64>()
        .map_err(|e| format!("Invalid {what} '{value}': {e}"))
}

fn emit(table: &OrderTable, out: Option<&str>) -> Result<(), String> {
    let csv = table.to_csv_string().map_err(|e| e.to_string())?;
    match out {
        Some(path) => {
            fs::write(path, &csv).map_err(|e| format!("Could not write '{path}': {e}"))?;
            eprintln!("Wrote {} order rows to '{path}'", table.rows.len());
        }
        None => print!("{csv}"),
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        return Err("Missing command".to_string());
    }

    let options = parse_options(&args)?;
    let Some((command, operands)) = options.rest.split_first() else {
        usage();
        return Err("Missing command".to_string());
    };

    let assembly = options.assembly;
    let cache = cache_dir();
    let genome = GenomeCache::prepare(assembly.name(), &cache).map_err(|e| e.to_string())?;
    let genes = RefGeneTable::prepare(assembly.name(), &cache).map_err(|e| e.to_string())?;
    let snps = UcscApiSnps::new(assembly.name());
    let designer = Primer3Process::new();
    let uniqueness = UcscInSilicoPcr::new(assembly.name());
    let normalizer = MutalyzerClient::new();

    let pipeline = PrimerPipeline {
        genome: &genome,
        genes: &genes,
        snps: &snps,
        designer: &designer,
        uniqueness: &uniqueness,
        normalizer: &normalizer,
        policy: InsertPolicy::default(),
        design: DesignConfig::default(),
        ordered_by: options.initials.clone(),
    };

    let table = match (command.as_str(), operands) {
        ("exon", [accession, exon_number]) => {
            let exon_number = exon_number
                .parse::<usize>()
                .map_err(|e| format!("Invalid exon number '{exon_number}': {e}"))?;
            pipeline
                .exon_primers(accession, exon_number)
                .map_err(|e| e.to_string())?
        }
        ("gene", [accession]) => pipeline.gene_primers(accession).map_err(|e| e.to_string())?,
        ("region", [chromosome, start, end]) => {
            let start = parse_position(start, "start position")?;
            let end = parse_position(end, "end position")?;
            pipeline
                .region_primers(chromosome, start, end)
                .map_err(|e| e.to_string())?
        }
        ("variant", [variant]) => pipeline.variant_primers(variant).map_err(|e| e.to_string())?,
        _ => {
            usage();
            return Err(format!("Unknown or incomplete command '{command}'"));
        }
    };

    emit(&table, options.out.as_deref())
}
