//! Response match patterns for generated payloads

use crate::domain::{EnumerationStrategy, VulnerabilityFinding, evidence_keys};

pub const DEFAULT_OWNER_FIELD: &str = "owner_id";

/// Matches any 2xx status line
pub const SUCCESS_PATTERN: &str = r"^HTTP/\d(?:\.\d)? 2\d\d\b";

/// Pattern matching a 200 response and capturing the value of `owner_field`
/// in its JSON body as group 1.
///
/// A hit whose capture equals the requesting principal is an authorized
/// read; a hit with any other owner is the access-control gap.
pub fn owner_capture_pattern(owner_field: &str) -> String {
    format!(
        r#"^HTTP/\d(?:\.\d)? 200\b[\s\S]*?"{}"\s*:\s*"?([^",\s}}]+)"#,
        regex::escape(owner_field)
    )
}

/// Grep pattern for a finding: enumeration-style findings capture the owner,
/// everything else just needs a success status
pub fn pattern_for(finding: &VulnerabilityFinding) -> String {
    let enumeration = finding.strategy.is_some()
        || finding.evidence.contains_key(evidence_keys::OWNER_FIELD);
    if !enumeration {
        return SUCCESS_PATTERN.to_string();
    }

    let field = finding
        .evidence
        .get(evidence_keys::OWNER_FIELD)
        .map(|s| s.as_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_OWNER_FIELD);
    owner_capture_pattern(field)
}

/// Testing steps for one finding
pub fn methodology(finding: &VulnerabilityFinding) -> String {
    let steps = match finding.strategy {
        Some(EnumerationStrategy::Sequential) => {
            "1. Identify parameter, 2. Set payload positions, 3. Configure a number range around the observed value, 4. Compare the captured owner of each 200 response with your own"
        }
        Some(EnumerationStrategy::UuidPredictable) => {
            "1. Collect UUIDs from your own objects, 2. Derive neighbouring time-based UUIDs, 3. Request each, 4. Flag 200 responses owned by another principal"
        }
        Some(EnumerationStrategy::ParameterPollution) => {
            "1. Duplicate the identifier parameter, 2. Order own value first and victim value second, then reverse, 3. Flag responses owned by the victim"
        }
        Some(EnumerationStrategy::MethodBypass) => {
            "1. Capture the denied request, 2. Replay with each alternate method and override header, 3. Flag any 200 response"
        }
        Some(EnumerationStrategy::PathTraversalCombo) => {
            "1. Locate the file or path parameter, 2. Insert traversal sequences towards another account's objects, 3. Flag foreign owners in 200 responses"
        }
        None => {
            "1. Capture a baseline request, 2. Apply the proof-of-concept change, 3. Compare status and body against the baseline"
        }
    };
    steps.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_owner_pattern_distinguishes_principals() {
        let re = Regex::new(&owner_capture_pattern("owner_id")).unwrap();

        let own = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"wallet\": 7, \"owner_id\": \"alice\"}";
        let foreign = "HTTP/1.1 200 OK\r\n\r\n{\"owner_id\": 4242, \"balance\": 1}";
        let denied = "HTTP/1.1 403 Forbidden\r\n\r\n{\"owner_id\": \"bob\"}";

        assert_eq!(&re.captures(own).unwrap()[1], "alice");
        assert_eq!(&re.captures(foreign).unwrap()[1], "4242");
        assert!(re.captures(denied).is_none());
    }

    #[test]
    fn test_field_names_are_escaped() {
        let pattern = owner_capture_pattern("owner.id");
        assert!(pattern.contains(r"owner\.id"));
        assert!(Regex::new(&pattern).is_ok());
    }

    #[test]
    fn test_success_pattern() {
        let re = Regex::new(SUCCESS_PATTERN).unwrap();
        assert!(re.is_match("HTTP/2 204 No Content"));
        assert!(!re.is_match("HTTP/1.1 401 Unauthorized"));
    }
}
