//! Variant normalization over a Mutalyzer-like HTTP service.
//!
//! Converts a coding HGVS description into its genomic equivalent, mapping
//! the service's machine-readable error codes onto the crate error taxonomy
//! and auto-correcting small intronic offsets in a bounded loop.

use crate::error::PrimertoolError;
use crate::hgvs::{self, HgvsVariant};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

/// Hard cap on normalize-correct-renormalize rounds; the offset strip can
/// only happen once, anything beyond that is upstream data we cannot fix.
pub const MAX_CORRECTION_ROUNDS: usize = 3;

const LARGEST_CORRECTABLE_OFFSET: i64 = 5;

lazy_static! {
    static ref INTRONIC_OFFSET: Regex = Regex::new(r"\+\d+").unwrap();
    static ref SUBSTITUTION: Regex = Regex::new(r"[A-Z]>[A-Z]").unwrap();
    static ref FOUND_BASE: Regex = Regex::new(r"found ([ACGT]) instead").unwrap();
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub details: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CustomPayload {
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    #[serde(default)]
    pub infos: Vec<ApiMessage>,
    #[serde(default)]
    pub corrected_model: Option<CorrectedModel>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CorrectedModel {
    #[serde(default)]
    pub reference: Option<ReferenceModel>,
    #[serde(default)]
    pub variants: Vec<VariantModel>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ReferenceModel {
    #[serde(default)]
    pub id: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct VariantModel {
    #[serde(default)]
    pub location: Option<LocationModel>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LocationModel {
    #[serde(default)]
    pub offset: Option<OffsetModel>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OffsetModel {
    #[serde(default)]
    pub value: i64,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DescribedVariant {
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EquivalentDescriptions {
    #[serde(default)]
    pub g: Vec<DescribedVariant>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChromosomalDescription {
    #[serde(default)]
    pub g: String,
}

/// Normalization service response body; error payloads arrive under `custom`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NormalizeResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub custom: Option<CustomPayload>,
    #[serde(default)]
    pub infos: Vec<ApiMessage>,
    #[serde(default)]
    pub corrected_model: Option<CorrectedModel>,
    #[serde(default)]
    pub equivalent_descriptions: Option<EquivalentDescriptions>,
    #[serde(default)]
    pub chromosomal_descriptions: Vec<ChromosomalDescription>,
}

impl NormalizeResponse {
    fn errors(&self) -> &[ApiMessage] {
        self.custom
            .as_ref()
            .map(|c| c.errors.as_slice())
            .unwrap_or(&[])
    }
}

/// One normalization round-trip: HTTP-level success plus the parsed body.
#[derive(Clone, Debug)]
pub struct NormalizeReply {
    pub ok: bool,
    pub status: u16,
    pub body: NormalizeResponse,
}

/// The external variant normalization service.
pub trait VariantNormalizer {
    fn normalize(&self, variant: &str) -> Result<NormalizeReply, PrimertoolError>;
}

/// Blocking client for the Mutalyzer normalization API.
#[derive(Debug)]
pub struct MutalyzerClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl Default for MutalyzerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MutalyzerClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: "https://mutalyzer.nl/api".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }
}

impl VariantNormalizer for MutalyzerClient {
    fn normalize(&self, variant: &str) -> Result<NormalizeReply, PrimertoolError> {
        let url = format!("{}/normalize/{}", self.base_url, variant);
        let response = self
            .client
            .get(&url)
            .query(&[("only_variants", "false")])
            // The service rejects default client agents.
            .header(
                reqwest::header::USER_AGENT,
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)",
            )
            .send()?;
        let status = response.status();
        let body: NormalizeResponse = response.json().map_err(|e| {
            PrimertoolError::RemoteService(format!(
                "Variant normalization returned an unreadable response for \"{variant}\": {e}"
            ))
        })?;
        Ok(NormalizeReply {
            ok: status.is_success(),
            status: status.as_u16(),
            body,
        })
    }
}

/// Resolve a coding variant description to its (coding, genomic) pair via the
/// normalization service, auto-correcting small intronic offsets.
pub fn resolve_variant_descriptions(
    normalizer: &dyn VariantNormalizer,
    variant: &str,
) -> Result<(HgvsVariant, HgvsVariant), PrimertoolError> {
    let mut current = variant.to_string();
    for _round in 0..MAX_CORRECTION_ROUNDS {
        let reply = normalizer.normalize(&current)?;

        if !reply.ok {
            let errors = reply.body.errors();
            if errors.first().map(|e| e.code.as_str()) == Some("EINTRONIC") {
                current = correct_intronic_variant(normalizer, &reply.body, &current)?;
                continue;
            }
            let summary: Vec<String> = errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.details))
                .collect();
            return Err(PrimertoolError::RemoteService(format!(
                "Status code: {}. Variant normalization failed for \"{}\". Errors: {{{}}}",
                reply.status,
                current,
                summary.join(", ")
            )));
        }

        check_response_errors(&reply.body)?;

        let mut coding = hgvs::parse_variant(&current)?;
        if !reply.body.infos.is_empty() {
            log::info!("{}", reply.body.infos[0].details);
            if let Some(id) = reply
                .body
                .corrected_model
                .as_ref()
                .and_then(|m| m.reference.as_ref())
                .map(|r| r.id.clone())
                .filter(|id| !id.is_empty())
            {
                coding.accession = id;
            }
        }
        if coding.coord_type != 'c' {
            log::warn!(
                "The input variant {current} is valid but not in a coding reference"
            );
            return Err(PrimertoolError::InvalidInput(
                "Input is not in a coding reference. Provide an NM transcript description."
                    .to_string(),
            ));
        }

        let genomic_description = reply
            .body
            .equivalent_descriptions
            .as_ref()
            .and_then(|eq| eq.g.first())
            .map(|d| d.description.clone())
            .or_else(|| {
                reply
                    .body
                    .chromosomal_descriptions
                    .first()
                    .map(|d| d.g.clone())
            })
            .ok_or_else(|| {
                PrimertoolError::InvalidInput(format!(
                    "Could not resolve a genomic description for \"{current}\" from the normalization response"
                ))
            })?;
        let genomic = hgvs::parse_variant(&genomic_description)?;
        return Ok((coding, genomic));
    }
    Err(PrimertoolError::RemoteService(format!(
        "Variant normalization did not converge after {MAX_CORRECTION_ROUNDS} correction rounds for \"{variant}\""
    )))
}

/// Map service error payloads that arrive with HTTP 200 onto input errors.
fn check_response_errors(body: &NormalizeResponse) -> Result<(), PrimertoolError> {
    if body.message.is_none() || body.custom.is_none() {
        return Ok(());
    }
    if let Some(message) = &body.message {
        log::info!("{message}");
    }
    let custom = body.custom.as_ref().expect("checked above");
    for info in &custom.infos {
        log::info!("{}: {}", info.code, info.details);
    }
    for error in &custom.errors {
        log::error!("{}: {}", error.code, error.details);
    }
    let Some(first) = custom.errors.first() else {
        return Ok(());
    };
    let msg = match first.code.as_str() {
        "EPARSE" => "There is an error in the given variant description",
        "ERETR" | "ENOINTRON" => "The given accession has an error and could not be found",
        "ESYNTAXUC" => "",
        _ => "There was a problem with the input",
    };
    Err(PrimertoolError::InvalidInput(format!(
        "{}{}{}: {}",
        msg,
        if msg.is_empty() { "" } else { ". " },
        first.code,
        first.details
    )))
}

/// Handle an `EINTRONIC` rejection. Offsets up to five bases are stripped
/// from the description and re-checked; a reference mismatch on the stripped
/// description substitutes the reported base and its complementary partner so
/// the variant does not degenerate into a self-substitution. Larger offsets
/// cannot be adjusted safely.
fn correct_intronic_variant(
    normalizer: &dyn VariantNormalizer,
    body: &NormalizeResponse,
    variant: &str,
) -> Result<String, PrimertoolError> {
    let offset = body
        .custom
        .as_ref()
        .and_then(|c| c.corrected_model.as_ref())
        .and_then(|m| m.variants.first())
        .and_then(|v| v.location.as_ref())
        .and_then(|l| l.offset.as_ref())
        .map(|o| o.value)
        .ok_or_else(|| {
            PrimertoolError::RemoteService(format!(
                "Intronic rejection for \"{variant}\" did not include an offset"
            ))
        })?;

    if offset > LARGEST_CORRECTABLE_OFFSET {
        return Err(PrimertoolError::IntronicPositionTooFar(format!(
            "The given variant is intronic and the offset ({offset}) is too large to be corrected automatically. Please use the genomic position instead."
        )));
    }

    let stripped = INTRONIC_OFFSET.replace(variant, "").into_owned();
    log::info!("Stripping intronic offset: \"{variant}\" -> \"{stripped}\"");

    let recheck = normalizer.normalize(&stripped)?;
    let errors = recheck.body.errors();
    if errors.first().map(|e| e.code.as_str()) == Some("ESEQUENCEMISMATCH") {
        let details = &errors[0].details;
        let found = FOUND_BASE
            .captures(details)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().as_bytes()[0])
            .ok_or_else(|| {
                PrimertoolError::RemoteService(format!(
                    "Could not extract the reference base from mismatch details: {details}"
                ))
            })?;
        let partner = bio::alphabets::dna::complement(found) as char;
        let replacement = format!("{}>{}", found as char, partner);
        return Ok(SUBSTITUTION.replace(&stripped, replacement.as_str()).into_owned());
    }
    Ok(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct ScriptedNormalizer {
        replies: RefCell<Vec<NormalizeReply>>,
        calls: RefCell<usize>,
    }

    impl ScriptedNormalizer {
        fn new(replies: Vec<NormalizeReply>) -> Self {
            Self {
                replies: RefCell::new(replies),
                calls: RefCell::new(0),
            }
        }

        fn call_count(&self) -> usize {
            *self.calls.borrow()
        }
    }

    impl VariantNormalizer for ScriptedNormalizer {
        fn normalize(&self, _variant: &str) -> Result<NormalizeReply, PrimertoolError> {
            *self.calls.borrow_mut() += 1;
            let mut replies = self.replies.borrow_mut();
            if replies.is_empty() {
                panic!("normalizer called more often than scripted");
            }
            Ok(replies.remove(0))
        }
    }

    fn intronic_rejection(offset: i64) -> NormalizeReply {
        NormalizeReply {
            ok: false,
            status: 422,
            body: NormalizeResponse {
                custom: Some(CustomPayload {
                    errors: vec![ApiMessage {
                        code: "EINTRONIC".to_string(),
                        details: "intronic position".to_string(),
                    }],
                    infos: vec![],
                    corrected_model: Some(CorrectedModel {
                        reference: None,
                        variants: vec![VariantModel {
                            location: Some(LocationModel {
                                offset: Some(OffsetModel { value: offset }),
                            }),
                        }],
                    }),
                }),
                ..NormalizeResponse::default()
            },
        }
    }

    fn success_reply(genomic: &str) -> NormalizeReply {
        NormalizeReply {
            ok: true,
            status: 200,
            body: NormalizeResponse {
                equivalent_descriptions: Some(EquivalentDescriptions {
                    g: vec![DescribedVariant {
                        description: genomic.to_string(),
                    }],
                }),
                ..NormalizeResponse::default()
            },
        }
    }

    fn plain_reply(ok: bool) -> NormalizeReply {
        NormalizeReply {
            ok,
            status: if ok { 200 } else { 422 },
            body: NormalizeResponse::default(),
        }
    }

    #[test]
    fn test_successful_resolution() {
        let normalizer = ScriptedNormalizer::new(vec![success_reply(
            "NC_000023.11:g.624400A>G",
        )]);
        let (coding, genomic) =
            resolve_variant_descriptions(&normalizer, "NM_000451.3:c.1702G>A").unwrap();
        assert_eq!(coding.accession, "NM_000451.3");
        assert_eq!(coding.coord_type, 'c');
        assert_eq!(genomic.coord_type, 'g');
        assert_eq!(genomic.start, 624400);
        assert_eq!(normalizer.call_count(), 1);
    }

    #[test]
    fn test_small_intronic_offset_strips_and_retries() {
        let normalizer = ScriptedNormalizer::new(vec![
            intronic_rejection(3),
            plain_reply(false), // mismatch recheck, no ESEQUENCEMISMATCH
            success_reply("NC_000023.11:g.624400A>G"),
        ]);
        let (_, genomic) =
            resolve_variant_descriptions(&normalizer, "NM_000451.3:c.1702+3G>A").unwrap();
        assert_eq!(genomic.start, 624400);
        assert_eq!(normalizer.call_count(), 3);
    }

    #[test]
    fn test_large_intronic_offset_fails_without_remote_retry() {
        let normalizer = ScriptedNormalizer::new(vec![intronic_rejection(6)]);
        let err = resolve_variant_descriptions(&normalizer, "NM_000451.3:c.1702+6G>A")
            .unwrap_err();
        assert!(matches!(err, PrimertoolError::IntronicPositionTooFar(_)));
        // only the initial normalization, no correction round-trip
        assert_eq!(normalizer.call_count(), 1);
    }

    #[test]
    fn test_sequence_mismatch_substitutes_base_partner() {
        let mismatch = NormalizeReply {
            ok: false,
            status: 422,
            body: NormalizeResponse {
                custom: Some(CustomPayload {
                    errors: vec![ApiMessage {
                        code: "ESEQUENCEMISMATCH".to_string(),
                        details: "expected G, found A instead of it".to_string(),
                    }],
                    ..CustomPayload::default()
                }),
                ..NormalizeResponse::default()
            },
        };
        let normalizer = ScriptedNormalizer::new(vec![mismatch]);
        let corrected = correct_intronic_variant(
            &normalizer,
            &intronic_rejection(3).body,
            "NM_000451.3:c.1702+3G>A",
        )
        .unwrap();
        assert_eq!(corrected, "NM_000451.3:c.1702A>T");
    }

    #[test]
    fn test_non_coding_reference_is_rejected() {
        let normalizer = ScriptedNormalizer::new(vec![success_reply(
            "NC_000023.11:g.624400A>G",
        )]);
        let err = resolve_variant_descriptions(&normalizer, "NR_000011.1:n.50G>A").unwrap_err();
        assert!(matches!(err, PrimertoolError::InvalidInput(_)));
    }

    #[test]
    fn test_error_payload_with_200_status_maps_to_input_error() {
        let reply = NormalizeReply {
            ok: true,
            status: 200,
            body: NormalizeResponse {
                message: Some("Parse error".to_string()),
                custom: Some(CustomPayload {
                    errors: vec![ApiMessage {
                        code: "EPARSE".to_string(),
                        details: "unexpected token".to_string(),
                    }],
                    ..CustomPayload::default()
                }),
                ..NormalizeResponse::default()
            },
        };
        let normalizer = ScriptedNormalizer::new(vec![reply]);
        let err =
            resolve_variant_descriptions(&normalizer, "NM_000451.3:c.1702G>A").unwrap_err();
        match err {
            PrimertoolError::InvalidInput(msg) => assert!(msg.contains("EPARSE")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unrecoverable_failure_reports_codes() {
        let reply = NormalizeReply {
            ok: false,
            status: 422,
            body: NormalizeResponse {
                custom: Some(CustomPayload {
                    errors: vec![ApiMessage {
                        code: "ERETR".to_string(),
                        details: "could not retrieve reference".to_string(),
                    }],
                    ..CustomPayload::default()
                }),
                ..NormalizeResponse::default()
            },
        };
        let normalizer = ScriptedNormalizer::new(vec![reply]);
        let err =
            resolve_variant_descriptions(&normalizer, "NM_000451.99:c.1G>A").unwrap_err();
        match err {
            PrimertoolError::RemoteService(msg) => assert!(msg.contains("ERETR")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_corrected_accession_is_adopted_from_infos() {
        let reply = NormalizeReply {
            ok: true,
            status: 200,
            body: NormalizeResponse {
                infos: vec![ApiMessage {
                    code: "ICORRECTED".to_string(),
                    details: "reference version corrected".to_string(),
                }],
                corrected_model: Some(CorrectedModel {
                    reference: Some(ReferenceModel {
                        id: "NM_000451.4".to_string(),
                    }),
                    variants: vec![],
                }),
                equivalent_descriptions: Some(EquivalentDescriptions {
                    g: vec![DescribedVariant {
                        description: "NC_000023.11:g.624400A>G".to_string(),
                    }],
                }),
                ..NormalizeResponse::default()
            },
        };
        let normalizer = ScriptedNormalizer::new(vec![reply]);
        let (coding, _) =
            resolve_variant_descriptions(&normalizer, "NM_000451.3:c.1702G>A").unwrap();
        assert_eq!(coding.accession, "NM_000451.4");
    }
}
