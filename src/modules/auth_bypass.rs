//! Authentication and session handling heuristics

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::runner::{AnalysisModule, name_tokens, validate_target};
use super::ReconContext;
use crate::domain::{Category, Severity, VulnerabilityFinding, evidence_keys};
use crate::error::ModuleFailure;

const MODULE_ID: &str = "auth-bypass";
const BASE_CONFIDENCE: f64 = 0.65;

const PRIVILEGED_SEGMENTS: &[&str] = &["admin", "internal", "debug", "actuator", "manage", "staff"];
const ROLE_PARAMS: &[&str] = &["role", "roles", "admin", "privilege", "permission", "scope", "group"];
const CREDENTIAL_PARAMS: &[&str] = &["token", "jwt", "session", "apikey", "secret", "password"];
const OTP_SEGMENTS: &[&str] = &["2fa", "otp", "mfa", "verify"];

#[derive(Debug, Default)]
pub struct AuthBypassModule;

impl AuthBypassModule {
    pub fn new() -> Self {
        Self
    }
}

fn base(title: String, severity: Severity, confidence: f64, route: &str, method: &str) -> VulnerabilityFinding {
    VulnerabilityFinding::new(Category::AuthBypass, title, severity, confidence)
        .with_module(MODULE_ID)
        .with_evidence(evidence_keys::ENDPOINT, route)
        .with_evidence(evidence_keys::METHOD, method)
        .with_source("observed-traffic")
}

#[async_trait]
impl AnalysisModule for AuthBypassModule {
    fn id(&self) -> &str {
        MODULE_ID
    }

    fn category(&self) -> Category {
        Category::AuthBypass
    }

    fn attack_vectors(&self) -> Vec<String> {
        vec![
            "Session management vulnerabilities".to_string(),
            "OTP validation race conditions".to_string(),
            "Token replay attacks".to_string(),
        ]
    }

    async fn analyze(
        &self,
        target: &str,
        recon: &ReconContext,
    ) -> Result<Vec<VulnerabilityFinding>, ModuleFailure> {
        validate_target(target)?;

        // Keyed by (route, title) so repeated observations collapse
        let mut findings: BTreeMap<(String, String), VulnerabilityFinding> = BTreeMap::new();

        for (route, observed) in recon.by_route() {
            let segments = name_tokens(route);
            let method = observed[0].method.as_str();

            if observed.iter().any(|o| o.is_success())
                && segments.iter().any(|s| PRIVILEGED_SEGMENTS.contains(&s.as_str()))
            {
                let title = format!("Privileged route reachable: {route}");
                let finding = base(title.clone(), Severity::High, BASE_CONFIDENCE, route, method)
                    .with_description("A route under an administrative prefix answered with a success status")
                    .with_poc(format!("Replay {method} {route} with a low-privilege session and without any session"));
                findings.entry((route.to_string(), title)).or_insert(finding);
            }

            if segments.iter().any(|s| OTP_SEGMENTS.contains(&s.as_str())) {
                let title = format!("OTP verification race on {route}");
                let finding = base(title.clone(), Severity::Critical, BASE_CONFIDENCE, route, method)
                    .with_description("Concurrent verification requests may pass before the attempt counter updates")
                    .with_poc(format!("Send 50 concurrent {method} {route} requests with the same code"));
                findings.entry((route.to_string(), title)).or_insert(finding);
            }

            for obs in &observed {
                for (name, _) in obs.all_params() {
                    let tokens = name_tokens(&name);
                    let has = |list: &[&str]| tokens.iter().any(|t| list.contains(&t.as_str()));

                    if has(ROLE_PARAMS) {
                        let title = format!("Client-controlled privilege parameter {name}");
                        let finding = base(title.clone(), Severity::High, BASE_CONFIDENCE * 0.9, route, &obs.method)
                            .with_evidence(evidence_keys::PARAMETERS, name.clone())
                            .with_poc(format!("Set {name}=admin on {} {route}", obs.method));
                        findings.entry((route.to_string(), title)).or_insert(finding);
                    }

                    if has(CREDENTIAL_PARAMS) && obs.path.contains('?') && obs.path.contains(&format!("{name}=")) {
                        let title = format!("Credential {name} carried in URL");
                        let finding = base(title.clone(), Severity::Medium, BASE_CONFIDENCE * 0.75, route, &obs.method)
                            .with_evidence(evidence_keys::PARAMETERS, name.clone())
                            .with_poc(format!("Replay a captured {route}?{name}=... URL from another client"));
                        findings.entry((route.to_string(), title)).or_insert(finding);
                    }
                }
            }
        }

        Ok(findings.into_values().collect())
    }
}
