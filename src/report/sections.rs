use crate::domain::{
    Category, ConfidenceScore, ModuleStatus, ResearchState, VulnerabilityFinding,
};
use crate::sandbox::SandboxState;

use super::{ReportSection, SectionKind};

pub(super) fn summary(state: &ResearchState) -> ReportSection {
    let completed = state.module_outcomes.iter().filter(|o| o.succeeded()).count();
    let mut s = String::new();

    s.push_str(&format!("- **Target:** {}\n", state.target));
    s.push_str(&format!("- **Tier:** {}\n", state.tier));
    s.push_str(&format!(
        "- **Requested categories:** {}\n",
        state
            .request
            .categories()
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    s.push_str(&format!(
        "- **Modules completed:** {}/{}\n",
        completed,
        state.module_outcomes.len()
    ));
    s.push_str(&format!("- **Findings:** {}", state.findings.len()));
    if state.discarded > 0 {
        s.push_str(&format!(" ({} discarded by scoring)", state.discarded));
    }
    s.push('\n');
    s.push_str(&format!(
        "- **Overall confidence:** {:.2} ({})\n",
        state.overall.calibrated, state.overall.severity
    ));
    if !state.overall.bounty.is_empty() {
        s.push_str(&format!("- **Estimated bounty:** {}\n", state.overall.bounty));
    }
    s.push_str(&format!(
        "- **Completed:** {}\n",
        state.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    ReportSection::new(SectionKind::Summary, "Summary", s)
}

fn finding_order(a: &&VulnerabilityFinding, b: &&VulnerabilityFinding) -> std::cmp::Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| b.confidence.total_cmp(&a.confidence))
        .then_with(|| a.id.cmp(&b.id))
}

pub(super) fn category(
    state: &ResearchState,
    category: &Category,
    score: &ConfidenceScore,
) -> ReportSection {
    let mut findings: Vec<&VulnerabilityFinding> = state
        .findings
        .iter()
        .filter(|f| &f.category == category)
        .collect();
    findings.sort_by(finding_order);

    let mut s = String::new();
    s.push_str(&format!(
        "**Severity:** {}  \n**Calibrated confidence:** {:.2}  \n",
        score.severity, score.calibrated
    ));
    if !score.bounty.is_empty() {
        s.push_str(&format!("**Estimated bounty:** {}  \n", score.bounty));
    }
    s.push('\n');

    for f in findings {
        s.push_str(&format!(
            "### {}: {}\n\n- Severity: {}\n- Confidence: {:.2}\n",
            f.id, f.title, f.severity, f.confidence
        ));
        if let Some(strategy) = f.strategy {
            s.push_str(&format!("- Strategy: {strategy}\n"));
        }
        if let Some(endpoint) = f.endpoint() {
            s.push_str(&format!("- Endpoint: `{endpoint}`\n"));
        }
        if let Some(ref description) = f.description {
            s.push_str(&format!("\n{description}\n"));
        }
        if let Some(ref poc) = f.poc_template {
            s.push_str(&format!("\n```\n{poc}\n```\n"));
        }
        s.push('\n');
    }

    let mut section = ReportSection::new(SectionKind::Category, category.label(), s);
    section.category = Some(category.clone());
    section
}

pub(super) fn attack_vectors(state: &ResearchState) -> Option<ReportSection> {
    let vectors: Vec<_> = state
        .attack_vectors
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .collect();
    if vectors.is_empty() {
        return None;
    }

    let mut s = String::new();
    for (category, list) in vectors {
        s.push_str(&format!("**{}**\n\n", category.label()));
        for vector in list {
            s.push_str(&format!("- {vector}\n"));
        }
        s.push('\n');
    }
    Some(ReportSection::new(SectionKind::AttackVectors, "Attack Vectors", s))
}

pub(super) fn incomplete_modules(state: &ResearchState) -> Option<ReportSection> {
    let incomplete = state.incomplete_modules();
    if incomplete.is_empty() {
        return None;
    }

    let mut s = String::from(
        "The following categories did not complete; results above are partial.\n\n",
    );
    for outcome in incomplete {
        let module = outcome.module_id.as_deref().unwrap_or("-");
        let reason = match &outcome.status {
            ModuleStatus::Failed { reason } => reason.as_str(),
            ModuleStatus::Unavailable => "no module registered",
            ModuleStatus::Completed { .. } => continue,
        };
        s.push_str(&format!(
            "- `{}` (module `{}`): {}\n",
            outcome.category, module, reason
        ));
    }
    Some(ReportSection::new(
        SectionKind::IncompleteModules,
        "Incomplete Modules",
        s,
    ))
}

pub(super) fn sandbox(state: &ResearchState) -> Option<ReportSection> {
    let s = match &state.sandbox {
        Some(summary) if summary.is_inconclusive() => {
            let mut s = format!(
                "**Status:** inconclusive ({})\n\n- Job: `{}`\n- Provision attempts: {}\n",
                summary.outcome, summary.job_id, summary.provision_attempts
            );
            if let Some(ref error) = summary.error {
                s.push_str(&format!("- Error: {error}\n"));
            }
            if summary.outcome == SandboxState::TimedOut {
                s.push_str("\nThe confirmation run hit its wall-clock limit.\n");
            }
            s
        }
        Some(summary) => {
            let mut s = format!(
                "**Status:** confirmed\n\n- Job: `{}`\n- Confirmed: {}\n- Not reproduced: {}\n",
                summary.job_id,
                summary.confirmed.len(),
                summary.refuted.len()
            );
            for id in &summary.confirmed {
                s.push_str(&format!("  - `{id}` confirmed\n"));
            }
            s
        }
        None if state.request.sandbox_opt_in() => {
            "**Status:** not run (no findings met the confirmation threshold or no sandbox is configured)\n"
                .to_string()
        }
        None => return None,
    };
    Some(ReportSection::new(SectionKind::Sandbox, "Sandbox Confirmation", s))
}

pub(super) fn recommended_tools(state: &ResearchState) -> Option<ReportSection> {
    if state.recommended_tools.is_empty() {
        return None;
    }
    let mut s = String::from("| Tool | Stars | Relevance | Description |\n|------|-------|-----------|-------------|\n");
    for tool in &state.recommended_tools {
        s.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            tool.name,
            tool.stars,
            tool.relevance.as_str(),
            tool.description
        ));
    }
    Some(ReportSection::new(
        SectionKind::RecommendedTools,
        "Recommended Tools",
        s,
    ))
}

pub(super) fn execution_plan(state: &ResearchState) -> Option<ReportSection> {
    let plan = state.execution_plan.as_ref()?;

    let mut s = format!("**Estimated time:** {}\n\n", plan.estimated_time);
    for (i, phase) in plan.testing_phases.iter().enumerate() {
        s.push_str(&format!(
            "{}. {} (`{}`), expected {}\n",
            i + 1,
            phase.title,
            phase.finding_id,
            phase.expected_bounty
        ));
        for line in phase.method.lines() {
            s.push_str(&format!("   > {line}\n"));
        }
    }
    if !plan.automation_scripts.is_empty() {
        s.push_str("\n**Automation scripts:**\n\n");
        for script in &plan.automation_scripts {
            s.push_str(&format!("- `{script}`\n"));
        }
    }
    Some(ReportSection::new(SectionKind::ExecutionPlan, "Execution Plan", s))
}

pub(super) fn payload_appendix(state: &ResearchState) -> Option<ReportSection> {
    if state.artifacts.is_empty() {
        return None;
    }

    let mut s = String::new();
    for artifact in &state.artifacts {
        s.push_str(&format!("### {}\n\n", artifact.id));
        s.push_str(&format!("- Finding: `{}`\n", artifact.finding_id));
        s.push_str(&format!("- Grep: `{}`\n", artifact.grep_pattern));
        if !artifact.insertion_points.is_empty() {
            let params: Vec<&str> = artifact
                .insertion_points
                .iter()
                .map(|p| p.parameter.as_str())
                .collect();
            s.push_str(&format!("- Positions: {}\n", params.join(", ")));
        }
        s.push_str(&format!("- Methodology: {}\n\n", artifact.methodology));
        s.push_str(&format!("```\n{}\n```\n\n", artifact.body.trim_end()));
    }
    Some(ReportSection::new(
        SectionKind::PayloadAppendix,
        "Payload Appendix",
        s,
    ))
}

fn remediation_note(category: &Category) -> &'static str {
    match category {
        Category::Idor => {
            "Enforce object-level authorization on every read and write; never trust client-supplied identifiers. Prefer unguessable identifiers in addition to, not instead of, ownership checks."
        }
        Category::AuthBypass => {
            "Apply authentication and role checks server-side on every privileged route; make OTP verification single-use and atomic; never accept credentials in URLs."
        }
        Category::BusinessLogic => {
            "Validate amounts and quantities server-side (sign, range, precision) and make coupon redemption idempotent per account."
        }
        Category::CryptoSpecific => {
            "Require a nonce or idempotency key on withdrawals, bind payout addresses to verified accounts, and restrict asset amounts to their on-chain precision."
        }
        Category::Custom(_) => "Review the findings above with the owning team.",
    }
}

pub(super) fn remediation(state: &ResearchState) -> ReportSection {
    let mut categories: Vec<&Category> = state.findings.iter().map(|f| &f.category).collect();
    categories.sort();
    categories.dedup();

    let s = if categories.is_empty() {
        "No findings were published; no remediation is required for this run.\n".to_string()
    } else {
        categories
            .into_iter()
            .map(|c| format!("- **{}:** {}\n", c.label(), remediation_note(c)))
            .collect()
    };
    ReportSection::new(SectionKind::Remediation, "Remediation", s)
}
