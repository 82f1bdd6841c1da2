//! Cryptocurrency platform specifics: wallets, withdrawals, payouts

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::runner::{AnalysisModule, name_tokens, validate_target};
use super::ReconContext;
use crate::domain::{Category, Severity, VulnerabilityFinding, evidence_keys};
use crate::error::ModuleFailure;

const MODULE_ID: &str = "crypto-specific";
const BASE_CONFIDENCE: f64 = 0.72;

const MONEY_MOVEMENT: &[&str] = &["withdraw", "withdrawal", "withdrawals", "transfer", "payout", "payouts", "send"];
const WALLET_WORDS: &[&str] = &["wallet", "wallets", "balance", "balances"];
const IDEMPOTENCY_WORDS: &[&str] = &["nonce", "idempotency", "request"];
const ADDRESS_WORDS: &[&str] = &["address", "destination", "recipient"];

/// Satoshi precision; more decimals than this hint at rounding abuse
const MAX_DECIMALS: usize = 8;

#[derive(Debug, Default)]
pub struct CryptoSpecificModule;

impl CryptoSpecificModule {
    pub fn new() -> Self {
        Self
    }
}

fn decimals(value: &str) -> usize {
    value
        .trim()
        .split_once('.')
        .map(|(_, frac)| frac.len())
        .unwrap_or(0)
}

#[async_trait]
impl AnalysisModule for CryptoSpecificModule {
    fn id(&self) -> &str {
        MODULE_ID
    }

    fn category(&self) -> Category {
        Category::CryptoSpecific
    }

    fn attack_vectors(&self) -> Vec<String> {
        vec![
            "Cross-wallet data access".to_string(),
            "Mining rig enumeration".to_string(),
            "Payment flow manipulation".to_string(),
        ]
    }

    async fn analyze(
        &self,
        target: &str,
        recon: &ReconContext,
    ) -> Result<Vec<VulnerabilityFinding>, ModuleFailure> {
        validate_target(target)?;

        let mut findings: BTreeMap<(String, String), VulnerabilityFinding> = BTreeMap::new();
        let mut add = |route: &str, finding: VulnerabilityFinding| {
            findings
                .entry((route.to_string(), finding.title.clone()))
                .or_insert(finding);
        };

        for (route, observed) in recon.by_route() {
            let segments = name_tokens(route);
            let in_route = |list: &[&str]| segments.iter().any(|s| list.contains(&s.as_str()));
            let method = observed[0].method.clone();

            if in_route(WALLET_WORDS) && observed.iter().any(|o| o.is_success()) {
                add(
                    route,
                    VulnerabilityFinding::new(
                        Category::CryptoSpecific,
                        format!("Wallet balance disclosure on {route}"),
                        Severity::High,
                        BASE_CONFIDENCE,
                    )
                    .with_module(MODULE_ID)
                    .with_evidence(evidence_keys::ENDPOINT, route)
                    .with_evidence(evidence_keys::METHOD, method.clone())
                    .with_poc(format!("{method} {route} for wallet IDs admin, test, 1 and 2"))
                    .with_source("observed-traffic"),
                );
            }

            if !in_route(MONEY_MOVEMENT) {
                continue;
            }

            for obs in &observed {
                let params = obs.all_params();
                let names: Vec<Vec<String>> = params.iter().map(|(n, _)| name_tokens(n)).collect();
                let any_param = |list: &[&str]| {
                    names
                        .iter()
                        .flatten()
                        .any(|t| list.contains(&t.as_str()))
                };

                if !any_param(IDEMPOTENCY_WORDS) {
                    add(
                        route,
                        VulnerabilityFinding::new(
                            Category::CryptoSpecific,
                            format!("Withdrawal replay without idempotency key on {route}"),
                            Severity::High,
                            BASE_CONFIDENCE,
                        )
                        .with_module(MODULE_ID)
                        .with_evidence(evidence_keys::ENDPOINT, route)
                        .with_evidence(evidence_keys::METHOD, obs.method.clone())
                        .with_description("Money-movement request carries no nonce or idempotency key")
                        .with_poc(format!("Send the same {} {route} body 20 times concurrently", obs.method))
                        .with_source("observed-traffic"),
                    );
                }

                for (name, value) in &params {
                    let tokens = name_tokens(name);
                    if tokens.iter().any(|t| ADDRESS_WORDS.contains(&t.as_str())) {
                        add(
                            route,
                            VulnerabilityFinding::new(
                                Category::CryptoSpecific,
                                format!("Payout destination {name} not bound to account"),
                                Severity::High,
                                BASE_CONFIDENCE - 0.12,
                            )
                            .with_module(MODULE_ID)
                            .with_evidence(evidence_keys::ENDPOINT, route)
                            .with_evidence(evidence_keys::METHOD, obs.method.clone())
                            .with_evidence(evidence_keys::PARAMETERS, name.clone())
                            .with_poc(format!("Change {name} to an unverified address and submit"))
                            .with_source("observed-traffic"),
                        );
                    }
                    if value.parse::<f64>().is_ok() && decimals(value) > MAX_DECIMALS {
                        add(
                            route,
                            VulnerabilityFinding::new(
                                Category::CryptoSpecific,
                                format!("Sub-satoshi precision accepted in {name}"),
                                Severity::Medium,
                                BASE_CONFIDENCE - 0.22,
                            )
                            .with_module(MODULE_ID)
                            .with_evidence(evidence_keys::ENDPOINT, route)
                            .with_evidence(evidence_keys::PARAMETERS, name.clone())
                            .with_evidence(evidence_keys::SAMPLE_VALUE, value.clone())
                            .with_poc(format!("Repeat {route} with {name} rounding just below one unit"))
                            .with_source("observed-traffic"),
                        );
                    }
                }
            }
        }

        Ok(findings.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ObservedEndpoint;

    #[tokio::test]
    async fn test_withdrawal_checks() {
        let recon = ReconContext::new(
            "example-platform",
            vec![Category::CryptoSpecific],
            vec![
                ObservedEndpoint::new("POST", "/api/v2/accounting/withdrawal")
                    .with_param("address", "bc1qexample")
                    .with_param("amount", "0.000000015"),
                ObservedEndpoint::new("GET", "/api/v2/accounting/wallets").with_status(200),
            ],
        );

        let findings = CryptoSpecificModule::new()
            .analyze("example-platform", &recon)
            .await
            .unwrap();
        let titles: Vec<&str> = findings.iter().map(|f| f.title.as_str()).collect();

        assert_eq!(findings.len(), 4, "{titles:?}");
        assert!(titles.iter().any(|t| t.starts_with("Withdrawal replay")));
        assert!(titles.iter().any(|t| t.starts_with("Payout destination address")));
        assert!(titles.iter().any(|t| t.starts_with("Sub-satoshi")));
        assert!(titles.iter().any(|t| t.starts_with("Wallet balance disclosure")));
    }

    #[tokio::test]
    async fn test_nonce_suppresses_replay_finding() {
        let recon = ReconContext::new(
            "example-platform",
            vec![Category::CryptoSpecific],
            vec![ObservedEndpoint::new("POST", "/api/transfer").with_param("nonce", "991")],
        );

        let findings = CryptoSpecificModule::new()
            .analyze("example-platform", &recon)
            .await
            .unwrap();
        assert!(findings.is_empty());
    }
}
