use std::collections::BTreeMap;

use async_trait::async_trait;

use super::runner::{AnalysisModule, name_tokens, validate_target};
use super::ReconContext;
use crate::domain::{Category, Severity, VulnerabilityFinding, evidence_keys};
use crate::error::ModuleFailure;

const MODULE_ID: &str = "business-logic";
const BASE_CONFIDENCE: f64 = 0.45;

const AMOUNT_WORDS: &[&str] = &["amount", "price", "total", "quantity", "qty", "balance", "fee", "rate"];
const COUPON_WORDS: &[&str] = &["coupon", "promo", "voucher", "discount", "referral"];

/// Heuristics for financial and workflow abuse
#[derive(Debug, Default)]
pub struct BusinessLogicModule;

impl BusinessLogicModule {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AnalysisModule for BusinessLogicModule {
    fn id(&self) -> &str {
        MODULE_ID
    }

    fn category(&self) -> Category {
        Category::BusinessLogic
    }

    fn attack_vectors(&self) -> Vec<String> {
        vec![
            "Financial calculation edge cases".to_string(),
            "Discount code abuse patterns".to_string(),
            "Order manipulation vulnerabilities".to_string(),
        ]
    }

    async fn analyze(
        &self,
        target: &str,
        recon: &ReconContext,
    ) -> Result<Vec<VulnerabilityFinding>, ModuleFailure> {
        validate_target(target)?;

        let mut findings: BTreeMap<(String, String), VulnerabilityFinding> = BTreeMap::new();

        for obs in recon.observations() {
            let route = obs.route();
            for (name, value) in obs.all_params() {
                let tokens = name_tokens(&name);
                let matches = |list: &[&str]| tokens.iter().any(|t| list.contains(&t.as_str()));

                if matches(AMOUNT_WORDS) && value.trim().parse::<f64>().is_ok() {
                    let negative = value.trim().starts_with('-');
                    let (title, severity, confidence) = if negative {
                        (
                            format!("Negative {name} accepted on {route}"),
                            Severity::High,
                            BASE_CONFIDENCE + 0.15,
                        )
                    } else {
                        (
                            format!("Client-controlled {name} on {route}"),
                            Severity::Medium,
                            BASE_CONFIDENCE,
                        )
                    };
                    let finding = VulnerabilityFinding::new(Category::BusinessLogic, title.clone(), severity, confidence)
                        .with_module(MODULE_ID)
                        .with_evidence(evidence_keys::ENDPOINT, route)
                        .with_evidence(evidence_keys::METHOD, obs.method.clone())
                        .with_evidence(evidence_keys::PARAMETERS, name.clone())
                        .with_evidence(evidence_keys::SAMPLE_VALUE, value.clone())
                        .with_description("Monetary values computed client-side can be tampered with before submission")
                        .with_poc(format!("{} {route} with {name}=-100, {name}=0 and {name}=0.000001", obs.method))
                        .with_source("observed-traffic");
                    findings.entry((route.to_string(), title)).or_insert(finding);
                }

                if matches(COUPON_WORDS) {
                    let title = format!("Coupon stacking via {name} on {route}");
                    let finding = VulnerabilityFinding::new(Category::BusinessLogic, title.clone(), Severity::Low, BASE_CONFIDENCE - 0.1)
                        .with_module(MODULE_ID)
                        .with_evidence(evidence_keys::ENDPOINT, route)
                        .with_evidence(evidence_keys::METHOD, obs.method.clone())
                        .with_evidence(evidence_keys::PARAMETERS, name.clone())
                        .with_poc(format!("Submit {name} twice in one request and across parallel requests"))
                        .with_source("observed-traffic");
                    findings.entry((route.to_string(), title)).or_insert(finding);
                }
            }
        }

        Ok(findings.into_values().collect())
    }
}
