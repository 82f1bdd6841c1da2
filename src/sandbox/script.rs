//! Confirmation script generation
//!
//! Scripts are plain text handed to the provider; nothing here executes.

use serde::{Deserialize, Serialize};

use crate::domain::{FindingId, VulnerabilityFinding};
use crate::payload::shell_quote;

/// Text for a `#` comment line; line breaks would end the comment
fn comment(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationScript {
    pub job_id: String,
    pub target: String,
    pub candidates: Vec<FindingId>,
    pub body: String,
}

impl ConfirmationScript {
    pub fn render(job_id: &str, target: &str, findings: &[VulnerabilityFinding]) -> Self {
        let mut body = String::new();
        body.push_str("#!/bin/sh\n");
        body.push_str(&format!("# Isolated confirmation run {}\n", comment(job_id)));
        body.push_str(&format!("# Target: {}\n", comment(target)));
        body.push_str("set -u\n\n");

        for finding in findings {
            body.push_str(&format!("# --- {} ---\n", comment(&finding.id)));
            body.push_str(&format!("# {} ({})\n", comment(&finding.title), finding.severity));
            if let Some(endpoint) = finding.endpoint() {
                body.push_str(&format!("# Endpoint: {}\n", comment(endpoint)));
            }
            match &finding.poc_template {
                Some(poc) => {
                    for line in poc.split(['\r', '\n']).filter(|l| !l.is_empty()) {
                        body.push_str(&format!("#   {line}\n"));
                    }
                }
                None => body.push_str("#   no proof-of-concept template\n"),
            }
            body.push_str(&format!("confirm {}\n\n", shell_quote(&finding.id)));
        }

        Self {
            job_id: job_id.to_string(),
            target: target.to_string(),
            candidates: findings.iter().map(|f| f.id.clone()).collect(),
            body,
        }
    }
}
