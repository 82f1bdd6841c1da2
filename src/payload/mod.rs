//! Payload artifact generation
//!
//! Turns published findings into inert, tool-ready templates. Output depends
//! only on the findings, the target and the configured formats.

mod grep;

pub use grep::{DEFAULT_OWNER_FIELD, SUCCESS_PATTERN, methodology, owner_capture_pattern, pattern_for};

use std::collections::BTreeSet;

use crate::domain::{
    EnumerationStrategy, InsertionPoint, PayloadArtifact, ToolFormat, VulnerabilityFinding,
    evidence_keys,
};

/// Fuzzing position delimiter used by intercepting-proxy fuzzers
pub const MARKER: char = '§';

const DEFAULT_SAMPLE: &str = "1";

#[derive(Debug, Clone)]
pub struct PayloadGenerator {
    formats: Vec<ToolFormat>,
}

impl Default for PayloadGenerator {
    fn default() -> Self {
        Self::new(ToolFormat::ALL.to_vec())
    }
}

/// Request pieces shared by every format
struct RequestTemplate {
    method: String,
    /// Path with `{param}` placeholders
    path: String,
    /// Parameters not present in the path, sent as query or body
    extra: Vec<String>,
    sample: String,
    host: String,
}

impl RequestTemplate {
    fn from_finding(target: &str, finding: &VulnerabilityFinding) -> Self {
        let method = finding
            .evidence
            .get(evidence_keys::METHOD)
            .map(|m| m.to_uppercase())
            .unwrap_or_else(|| "GET".to_string());
        let path = finding.endpoint().unwrap_or("/").to_string();
        let extra = finding
            .parameters()
            .into_iter()
            .filter(|p| !path.contains(&format!("{{{p}}}")))
            .collect();
        let sample = finding
            .evidence
            .get(evidence_keys::SAMPLE_VALUE)
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_SAMPLE.to_string());

        Self {
            method,
            path,
            extra,
            sample,
            host: target.to_string(),
        }
    }

    fn sends_body(&self) -> bool {
        !matches!(self.method.as_str(), "GET" | "HEAD" | "DELETE")
    }

    /// Replace `{name}` placeholders, marking the finding's parameters with
    /// `fill_param` and any other placeholder with the sample value
    fn render_path(&self, params: &[String], fill_param: &dyn Fn(&str) -> String) -> String {
        let mut out = String::new();
        let mut rest = self.path.as_str();
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|c| open + c) else {
                break;
            };
            out.push_str(&rest[..open]);
            let name = &rest[open + 1..close];
            if params.iter().any(|p| p == name) {
                out.push_str(&fill_param(name));
            } else {
                out.push_str(&self.sample);
            }
            rest = &rest[close + 1..];
        }
        out.push_str(rest);
        out
    }

    fn render(&self, params: &[String], fill_param: &dyn Fn(&str) -> String) -> String {
        let mut path = self.render_path(params, fill_param);
        let pairs: Vec<String> = self
            .extra
            .iter()
            .map(|p| format!("{p}={}", fill_param(p)))
            .collect();

        let body = if self.sends_body() && !pairs.is_empty() {
            Some(pairs.join("&"))
        } else {
            if !pairs.is_empty() {
                path.push(if path.contains('?') { '&' } else { '?' });
                path.push_str(&pairs.join("&"));
            }
            None
        };

        let mut request = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\nAuthorization: Bearer {{token}}\r\nAccept: application/json\r\n",
            self.method, path, self.host
        );
        match body {
            Some(body) => {
                request.push_str("Content-Type: application/x-www-form-urlencoded\r\n");
                request.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
            }
            None => request.push_str("\r\n"),
        }
        request
    }
}

/// Byte ranges of `§name§` pairs in `body`
pub fn insertion_points(body: &str) -> Vec<InsertionPoint> {
    let mut points = Vec::new();
    let mut opened: Option<usize> = None;
    for (idx, c) in body.char_indices() {
        if c != MARKER {
            continue;
        }
        match opened.take() {
            None => opened = Some(idx),
            Some(start) => {
                let end = idx + MARKER.len_utf8();
                points.push(InsertionPoint {
                    parameter: body[start + MARKER.len_utf8()..idx].to_string(),
                    start,
                    end,
                });
            }
        }
    }
    points
}

pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Values worth trying in the marked positions
fn candidate_values(finding: &VulnerabilityFinding, sample: &str) -> Vec<String> {
    let mut values = Vec::new();
    if let Ok(n) = sample.parse::<u64>() {
        for v in [n.saturating_sub(1), n.saturating_add(1), 1, 0] {
            values.push(v.to_string());
        }
    }
    if finding.strategy == Some(EnumerationStrategy::PathTraversalCombo) {
        values.push("../".to_string());
        values.push("..%2f".to_string());
    }
    for word in ["admin", "test", "-1", "999999"] {
        values.push(word.to_string());
    }
    let mut seen = BTreeSet::new();
    values.retain(|v| v != sample && seen.insert(v.clone()));
    values
}

impl PayloadGenerator {
    pub fn new(formats: Vec<ToolFormat>) -> Self {
        let mut seen = BTreeSet::new();
        let formats = formats.into_iter().filter(|f| seen.insert(*f)).collect();
        Self { formats }
    }

    pub fn formats(&self) -> &[ToolFormat] {
        &self.formats
    }

    /// Artifacts for every finding in every configured format, ordered by
    /// finding ID then format
    pub fn build(&self, target: &str, findings: &[VulnerabilityFinding]) -> Vec<PayloadArtifact> {
        let mut sorted: Vec<&VulnerabilityFinding> = findings.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        sorted.dedup_by(|a, b| a.id == b.id);

        sorted
            .into_iter()
            .flat_map(|finding| {
                self.formats
                    .iter()
                    .map(move |format| Self::build_one(target, finding, *format))
            })
            .collect()
    }

    pub fn build_one(target: &str, finding: &VulnerabilityFinding, format: ToolFormat) -> PayloadArtifact {
        let template = RequestTemplate::from_finding(target, finding);
        let params = finding.parameters();
        let grep_pattern = pattern_for(finding);

        let body = match format {
            ToolFormat::Intruder => {
                let request = template.render(&params, &|p: &str| format!("{MARKER}{p}{MARKER}"));
                let mut body = format!(
                    "# Attack type: {}\n# Grep match: {grep_pattern}\n",
                    if params.len() > 1 { "Pitchfork" } else { "Sniper" }
                );
                body.push_str(&request);
                body
            }
            ToolFormat::Repeater => {
                let sample = template.sample.clone();
                let mut body = template.render(&params, &|_: &str| sample.clone());
                body.push_str("\n\n# Try instead of ");
                body.push_str(&template.sample);
                body.push_str(": ");
                body.push_str(&candidate_values(finding, &template.sample).join(", "));
                body.push('\n');
                body
            }
            ToolFormat::Curl => {
                let sample = template.sample.clone();
                let path = template.render_path(&params, &|_: &str| sample.clone());
                let mut cmd = format!(
                    "curl -i -s -X {} {} -H 'Authorization: Bearer {{token}}' -H 'Accept: application/json'",
                    template.method,
                    shell_quote(&format!("https://{}{}", template.host, path))
                );
                if !template.extra.is_empty() {
                    let data: Vec<String> = template
                        .extra
                        .iter()
                        .map(|p| format!("{p}={}", template.sample))
                        .collect();
                    let flag = if template.sends_body() { "--data" } else { "-G --data" };
                    cmd.push_str(&format!(" {flag} {}", shell_quote(&data.join("&"))));
                }
                cmd.push_str(&format!(" | grep -Pzo {}", shell_quote(&grep_pattern)));
                cmd
            }
            ToolFormat::Raw => {
                let sample = template.sample.clone();
                template.render(&params, &|_: &str| sample.clone())
            }
        };

        let insertion_points = if format == ToolFormat::Intruder {
            insertion_points(&body)
        } else {
            Vec::new()
        };

        PayloadArtifact {
            id: PayloadArtifact::artifact_id(&finding.id, format),
            finding_id: finding.id.clone(),
            format,
            body,
            insertion_points,
            grep_pattern,
            methodology: methodology(finding),
        }
    }
}
