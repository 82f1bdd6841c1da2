//! IDOR analysis over observed traffic
//!
//! Every identifier-carrying location (path segment or parameter) is checked
//! against five enumeration strategies. One finding is emitted per distinct
//! `(route, parameter, strategy)` gap.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::runner::{AnalysisModule, name_tokens, validate_target};
use super::ReconContext;
use crate::domain::{
    Category, EnumerationStrategy, ObservedEndpoint, Severity, VulnerabilityFinding, evidence_keys,
};
use crate::error::ModuleFailure;
use crate::payload::DEFAULT_OWNER_FIELD;

const MODULE_ID: &str = "idor";
const SOURCE: &str = "observed-traffic";

/// Parameter names that usually address a single object
const ID_WORDS: &[&str] = &["id", "uuid", "uid", "guid", "key", "number", "no"];
const FILE_WORDS: &[&str] = &["file", "path", "filename", "document", "attachment", "dir"];

/// Where an identifier was seen
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Location {
    /// Route with the identifier segment replaced by `{param}`
    endpoint: String,
    param: String,
}

#[derive(Debug, Default)]
struct Sightings {
    methods: BTreeSet<String>,
    values: Vec<String>,
    owners: BTreeSet<String>,
}

/// Built-in IDOR module
#[derive(Debug, Default)]
pub struct IdorModule;

impl IdorModule {
    pub fn new() -> Self {
        Self
    }
}

fn is_numeric_id(value: &str) -> bool {
    !value.is_empty() && value.len() <= 12 && value.bytes().all(|b| b.is_ascii_digit())
}

/// Version number of a UUID value, if it is one
fn uuid_version(value: &str) -> Option<usize> {
    Uuid::parse_str(value).ok().map(|u| u.get_version_num())
}

fn is_identifier_name(name: &str) -> bool {
    name_tokens(name)
        .last()
        .is_some_and(|t| ID_WORDS.contains(&t.as_str()))
}

fn is_file_name(name: &str) -> bool {
    name_tokens(name)
        .iter()
        .any(|t| FILE_WORDS.contains(&t.as_str()))
}

fn has_traversal(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.contains("../") || lower.contains("..%2f") || lower.contains("..\\") || lower.contains("%2e%2e")
}

/// `orders` -> `order_id`
fn param_for_segment(previous: Option<&str>) -> String {
    match previous {
        Some(seg) if !seg.is_empty() => {
            let singular = seg.strip_suffix("ies").map(|s| format!("{s}y")).unwrap_or_else(|| {
                seg.strip_suffix('s').unwrap_or(seg).to_string()
            });
            format!("{}_id", singular.replace('-', "_"))
        }
        _ => "id".to_string(),
    }
}

/// Identifier path segments of a route, with the templated route for each
fn path_identifiers(route: &str) -> Vec<(Location, String)> {
    let segments: Vec<&str> = route.split('/').collect();
    let mut out = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        if !is_numeric_id(segment) && uuid_version(segment).is_none() {
            continue;
        }
        let previous = i.checked_sub(1).and_then(|p| segments.get(p)).copied();
        let param = param_for_segment(previous);
        let endpoint = segments
            .iter()
            .enumerate()
            .map(|(j, s)| {
                if j == i {
                    format!("{{{param}}}")
                } else if is_numeric_id(s) || uuid_version(s).is_some() {
                    "{id}".to_string()
                } else {
                    (*s).to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("/");
        out.push((Location { endpoint, param }, (*segment).to_string()));
    }
    out
}

/// Route with identifier segments collapsed, so `/orders/1` and `/orders/2`
/// compare equal
fn route_shape(route: &str) -> String {
    route
        .split('/')
        .map(|s| {
            if is_numeric_id(s) || uuid_version(s).is_some() {
                "{id}"
            } else {
                s
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn collect_sightings(observations: &[ObservedEndpoint]) -> BTreeMap<Location, Sightings> {
    let mut sightings: BTreeMap<Location, Sightings> = BTreeMap::new();

    for obs in observations {
        let mut record = |location: Location, value: String| {
            let entry = sightings.entry(location).or_default();
            entry.methods.insert(obs.method.clone());
            entry.values.push(value);
            if obs.is_success() {
                if let Some(owner) = &obs.owner {
                    entry.owners.insert(owner.clone());
                }
            }
        };

        for (location, value) in path_identifiers(obs.route()) {
            record(location, value);
        }

        let shape = route_shape(obs.route());
        for (name, value) in obs.all_params() {
            if is_identifier_name(&name) || is_file_name(&name) {
                record(
                    Location {
                        endpoint: shape.clone(),
                        param: name,
                    },
                    value,
                );
            }
        }
    }
    sightings
}

fn finding_for(
    location: &Location,
    sightings: &Sightings,
    strategy: EnumerationStrategy,
    severity: Severity,
    confidence: f64,
    title: String,
    poc: String,
) -> VulnerabilityFinding {
    let method = sightings
        .methods
        .iter()
        .next()
        .cloned()
        .unwrap_or_else(|| "GET".to_string());
    let sample = sightings.values.first().cloned().unwrap_or_default();

    let mut finding = VulnerabilityFinding::new(Category::Idor, title, severity, confidence)
        .with_module(MODULE_ID)
        .with_strategy(strategy)
        .with_evidence(evidence_keys::ENDPOINT, location.endpoint.clone())
        .with_evidence(evidence_keys::METHOD, method)
        .with_evidence(evidence_keys::PARAMETERS, location.param.clone())
        .with_evidence(evidence_keys::SAMPLE_VALUE, sample)
        .with_evidence(evidence_keys::OWNER_FIELD, DEFAULT_OWNER_FIELD)
        .with_poc(poc)
        .with_source(SOURCE);

    if sightings.owners.len() > 1 {
        finding = finding.with_evidence(
            "owners_observed",
            sightings.owners.iter().cloned().collect::<Vec<_>>().join(","),
        );
    }
    finding
}

fn sequential_gap(location: &Location, sightings: &Sightings) -> Option<VulnerabilityFinding> {
    let numbers: BTreeSet<u64> = sightings
        .values
        .iter()
        .filter_map(|v| if is_numeric_id(v) { v.parse().ok() } else { None })
        .collect();
    let (&low, &high) = (numbers.first()?, numbers.last()?);

    let mut confidence: f64 = 0.6;
    if numbers.len() > 1 && high - low <= 1000 {
        confidence += 0.15;
    }
    let cross_owner = sightings.owners.len() > 1;
    if cross_owner {
        confidence += 0.15;
    }
    let severity = if cross_owner {
        Severity::Critical
    } else {
        Severity::High
    };

    Some(finding_for(
        location,
        sightings,
        EnumerationStrategy::Sequential,
        severity,
        confidence.min(0.95),
        format!("Sequential {} enumeration on {}", location.param, location.endpoint),
        format!(
            "Replay {} with {} = {}..{} and compare the owner of each 200 response",
            location.endpoint,
            location.param,
            low.saturating_sub(5),
            high + 5
        ),
    ))
}

fn uuid_gap(location: &Location, sightings: &Sightings) -> Option<VulnerabilityFinding> {
    // v1 embeds a timestamp and node ID; v4 is not enumerable
    let time_based: Vec<&String> = sightings
        .values
        .iter()
        .filter(|v| uuid_version(v) == Some(1))
        .collect();
    if time_based.is_empty() {
        return None;
    }

    let confidence = if time_based.len() > 1 { 0.75 } else { 0.65 };
    Some(finding_for(
        location,
        sightings,
        EnumerationStrategy::UuidPredictable,
        Severity::High,
        confidence,
        format!("Predictable UUIDv1 {} on {}", location.param, location.endpoint),
        format!(
            "Derive neighbouring time-based UUIDs from {} and request {} with each",
            time_based[0], location.endpoint
        ),
    ))
}

fn traversal_gap(location: &Location, sightings: &Sightings) -> Option<VulnerabilityFinding> {
    let traversing = sightings.values.iter().any(|v| has_traversal(v));
    let file_like = is_file_name(&location.param);
    if !traversing && !file_like {
        return None;
    }

    let confidence = if traversing { 0.7 } else { 0.4 };
    let severity = if traversing {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(finding_for(
        location,
        sightings,
        EnumerationStrategy::PathTraversalCombo,
        severity,
        confidence,
        format!("Path traversal chained with {} on {}", location.param, location.endpoint),
        format!(
            "Set {} to ../<other-account-object> on {} and check for foreign content",
            location.param, location.endpoint
        ),
    ))
}

/// Same identifier parameter supplied more than once in one request
fn pollution_gaps(context: &ReconContext) -> BTreeMap<Location, VulnerabilityFinding> {
    let mut gaps = BTreeMap::new();
    for obs in context.observations() {
        let mut counts: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in obs.all_params() {
            if is_identifier_name(&name) {
                counts.entry(name).or_default().push(value);
            }
        }
        for (param, values) in counts.into_iter().filter(|(_, v)| v.len() > 1) {
            let location = Location {
                endpoint: route_shape(obs.route()),
                param,
            };
            let sightings = Sightings {
                methods: BTreeSet::from([obs.method.clone()]),
                values,
                owners: obs.owner.iter().cloned().collect(),
            };
            let finding = finding_for(
                &location,
                &sightings,
                EnumerationStrategy::ParameterPollution,
                Severity::Medium,
                0.55,
                format!("Parameter pollution on {} at {}", location.param, location.endpoint),
                format!(
                    "Send {} twice on {}: own value first, victim value second",
                    location.param, location.endpoint
                ),
            );
            gaps.entry(location).or_insert(finding);
        }
    }
    gaps
}

/// A route that refuses one method but serves another
fn method_bypass_gaps(context: &ReconContext) -> BTreeMap<Location, VulnerabilityFinding> {
    let mut by_shape: BTreeMap<String, Vec<&ObservedEndpoint>> = BTreeMap::new();
    for obs in context.observations() {
        by_shape.entry(route_shape(obs.route())).or_default().push(obs);
    }

    let mut gaps = BTreeMap::new();
    for (shape, observed) in by_shape {
        let denied: BTreeSet<&str> = observed
            .iter()
            .filter(|o| matches!(o.status, Some(401 | 403)))
            .map(|o| o.method.as_str())
            .collect();
        let allowed: BTreeSet<&str> = observed
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.method.as_str())
            .filter(|m| !denied.contains(m))
            .collect();
        let (Some(denied_method), Some(allowed_method)) = (denied.first(), allowed.first()) else {
            continue;
        };

        let param = path_identifiers(observed[0].route())
            .into_iter()
            .map(|(loc, _)| loc.param)
            .next()
            .unwrap_or_else(|| "id".to_string());
        let location = Location {
            endpoint: shape,
            param,
        };
        let sightings = Sightings {
            methods: BTreeSet::from([allowed_method.to_string()]),
            values: observed
                .iter()
                .flat_map(|o| path_identifiers(o.route()))
                .map(|(_, v)| v)
                .collect(),
            owners: BTreeSet::new(),
        };
        let finding = finding_for(
            &location,
            &sightings,
            EnumerationStrategy::MethodBypass,
            Severity::High,
            0.7,
            format!(
                "{denied_method} denied but {allowed_method} served on {}",
                location.endpoint
            ),
            format!(
                "Repeat the denied {denied_method} request as {allowed_method} (or with X-HTTP-Method-Override) on {}",
                location.endpoint
            ),
        );
        gaps.insert(location, finding);
    }
    gaps
}

#[async_trait]
impl AnalysisModule for IdorModule {
    fn id(&self) -> &str {
        MODULE_ID
    }

    fn category(&self) -> Category {
        Category::Idor
    }

    fn attack_vectors(&self) -> Vec<String> {
        vec![
            "Direct parameter manipulation in API endpoints".to_string(),
            "Path traversal + IDOR chaining for file access".to_string(),
            "UUID enumeration with predictable patterns".to_string(),
        ]
    }

    async fn analyze(
        &self,
        target: &str,
        recon: &ReconContext,
    ) -> Result<Vec<VulnerabilityFinding>, ModuleFailure> {
        validate_target(target)?;

        let mut gaps: BTreeMap<(Location, EnumerationStrategy), VulnerabilityFinding> =
            BTreeMap::new();

        for (location, sightings) in collect_sightings(recon.observations()) {
            let checks = [
                sequential_gap(&location, &sightings),
                uuid_gap(&location, &sightings),
                traversal_gap(&location, &sightings),
            ];
            for finding in checks.into_iter().flatten() {
                if let Some(strategy) = finding.strategy {
                    gaps.entry((location.clone(), strategy)).or_insert(finding);
                }
            }
        }

        for (location, finding) in pollution_gaps(recon).into_iter().chain(method_bypass_gaps(recon)) {
            if let Some(strategy) = finding.strategy {
                gaps.entry((location, strategy)).or_insert(finding);
            }
        }

        debug!(module = MODULE_ID, target, gaps = gaps.len(), "IDOR analysis complete");
        Ok(gaps.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(observations: Vec<ObservedEndpoint>) -> ReconContext {
        ReconContext::new("example-platform", vec![Category::Idor], observations)
    }

    async fn run(observations: Vec<ObservedEndpoint>) -> Vec<VulnerabilityFinding> {
        IdorModule::new()
            .analyze("example-platform", &context(observations))
            .await
            .unwrap()
    }

    fn strategies(findings: &[VulnerabilityFinding]) -> Vec<EnumerationStrategy> {
        findings.iter().filter_map(|f| f.strategy).collect()
    }

    #[tokio::test]
    async fn test_sequential_path_ids_are_one_gap() {
        let findings = run(vec![
            ObservedEndpoint::new("get", "/api/v2/organizations/1041/wallets")
                .with_status(200)
                .with_owner("alice"),
            ObservedEndpoint::new("get", "/api/v2/organizations/1042/wallets")
                .with_status(200)
                .with_owner("bob"),
        ])
        .await;

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.strategy, Some(EnumerationStrategy::Sequential));
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(
            finding.endpoint(),
            Some("/api/v2/organizations/{organization_id}/wallets")
        );
        assert_eq!(finding.parameters(), vec!["organization_id"]);
        assert!(finding.confidence > 0.85);
    }

    #[tokio::test]
    async fn test_uuid_v1_is_predictable_but_v4_is_not() {
        let findings = run(vec![
            ObservedEndpoint::new("GET", "/api/invoices")
                .with_param("invoice_id", "c232ab00-9414-11ec-b3c8-9f6bdeced846")
                .with_status(200),
            ObservedEndpoint::new("GET", "/api/receipts")
                .with_param("receipt_id", "0b9c3f4e-5c1d-4b8a-9a4e-2f1d8c7b6a50")
                .with_status(200),
        ])
        .await;

        assert_eq!(strategies(&findings), vec![EnumerationStrategy::UuidPredictable]);
        assert_eq!(findings[0].parameters(), vec!["invoice_id"]);
    }

    #[tokio::test]
    async fn test_pollution_bypass_and_traversal() {
        let findings = run(vec![
            ObservedEndpoint::new("GET", "/api/accounts?account_id=7&account_id=8").with_status(200),
            ObservedEndpoint::new("DELETE", "/api/users/55").with_status(403),
            ObservedEndpoint::new("POST", "/api/users/55").with_status(200),
            ObservedEndpoint::new("GET", "/api/export")
                .with_param("file", "../../users/56/statement.pdf")
                .with_status(200),
        ])
        .await;

        let found = strategies(&findings);
        assert!(found.contains(&EnumerationStrategy::ParameterPollution));
        assert!(found.contains(&EnumerationStrategy::MethodBypass));
        assert!(found.contains(&EnumerationStrategy::PathTraversalCombo));
        assert!(found.contains(&EnumerationStrategy::Sequential));
    }

    #[tokio::test]
    async fn test_pollution_seen_through_encoded_name() {
        let findings = run(vec![
            ObservedEndpoint::new("GET", "/api/accounts?account%5Fid=7&account_id=8").with_status(200),
        ])
        .await;

        let pollution: Vec<_> = findings
            .iter()
            .filter(|f| f.strategy == Some(EnumerationStrategy::ParameterPollution))
            .collect();
        assert_eq!(pollution.len(), 1);
        assert_eq!(pollution[0].parameters(), vec!["account_id"]);
    }

    #[tokio::test]
    async fn test_output_is_deterministic() {
        let observations = vec![
            ObservedEndpoint::new("GET", "/api/orders/3").with_status(200),
            ObservedEndpoint::new("GET", "/api/carts?cart_id=9").with_status(200),
        ];
        let mut reversed = observations.clone();
        reversed.reverse();

        let a = run(observations).await;
        let b = run(reversed).await;
        let titles = |f: &[VulnerabilityFinding]| f.iter().map(|x| x.title.clone()).collect::<Vec<_>>();
        assert_eq!(titles(&a), titles(&b));
    }

    #[tokio::test]
    async fn test_no_identifiers_no_findings() {
        let findings = run(vec![ObservedEndpoint::new("GET", "/health").with_status(200)]).await;
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_target_fails() {
        let err = IdorModule::new()
            .analyze("bad target", &context(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleFailure::MalformedTarget(_)));
    }
}
