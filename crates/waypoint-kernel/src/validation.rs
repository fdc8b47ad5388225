const APPROVAL_THRESHOLD: f64 = 0.60;

/// Where in the pipeline a validation run gates progress (`spec.md`
/// §4.9): specs, code diffs, or generated tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationGate {
    PreApproval,
    PreCommit,
    PreVerify,
}

#[derive(Debug, Clone)]
pub struct CriticVote {
    pub critic_id: String,
    pub is_security: bool,
    pub weight: f64,
    pub approved: bool,
    pub score: f64,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub approved: bool,
    pub scores: Vec<f64>,
    pub blocking_issues: Vec<String>,
    pub consensus_summary: String,
    pub human_review_required: bool,
}

/// Runs consensus over parallel critic votes (`spec.md` §4.9). A
/// security-focused critic's rejection blocks the artifact outright, even
/// when the weighted majority approves.
pub fn validate(votes: &[CriticVote]) -> ValidationResult {
    let total_weight: f64 = votes.iter().map(|v| v.weight).sum();
    let approved_weight: f64 = votes.iter().filter(|v| v.approved).map(|v| v.weight).sum();
    let weighted_approval = if total_weight > 0.0 {
        approved_weight / total_weight
    } else {
        0.0
    };

    let security_rejections: Vec<&CriticVote> = votes
        .iter()
        .filter(|v| v.is_security && !v.approved)
        .collect();
    let security_veto = !security_rejections.is_empty();

    let approved = weighted_approval >= APPROVAL_THRESHOLD && !security_veto;

    let mut blocking_issues: Vec<String> = security_rejections
        .iter()
        .flat_map(|v| v.issues.iter().cloned())
        .collect();
    if !approved && !security_veto {
        blocking_issues.extend(
            votes
                .iter()
                .filter(|v| !v.approved)
                .flat_map(|v| v.issues.iter().cloned()),
        );
    }

    let consensus_summary = if security_veto {
        format!(
            "security veto by {}",
            security_rejections
                .iter()
                .map(|v| v.critic_id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    } else {
        format!(
            "weighted approval {:.0}% ({} of {} critics)",
            weighted_approval * 100.0,
            votes.iter().filter(|v| v.approved).count(),
            votes.len()
        )
    };

    ValidationResult {
        approved,
        scores: votes.iter().map(|v| v.score).collect(),
        blocking_issues,
        consensus_summary,
        human_review_required: !approved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(id: &str, security: bool, approved: bool, issues: Vec<&str>) -> CriticVote {
        CriticVote {
            critic_id: id.to_string(),
            is_security: security,
            weight: 1.0,
            approved,
            score: if approved { 0.9 } else { 0.2 },
            issues: issues.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn majority_approval_without_security_veto_passes() {
        let votes = vec![
            vote("style", false, true, vec![]),
            vote("tests", false, true, vec![]),
            vote("perf", false, false, vec!["minor inefficiency"]),
        ];
        let result = validate(&votes);
        assert!(result.approved);
        assert!(!result.human_review_required);
    }

    #[test]
    fn security_veto_overrides_majority_approval() {
        let votes = vec![
            vote("style", false, true, vec![]),
            vote("tests", false, true, vec![]),
            vote("security", true, false, vec!["unchecked shell invocation"]),
        ];
        let result = validate(&votes);
        assert!(!result.approved);
        assert!(result.human_review_required);
        assert!(result
            .blocking_issues
            .iter()
            .any(|issue| issue.contains("unchecked shell invocation")));
        assert!(result.consensus_summary.contains("security veto"));
    }

    #[test]
    fn minority_approval_is_rejected_without_reaching_threshold() {
        let votes = vec![
            vote("a", false, true, vec![]),
            vote("b", false, false, vec!["fails lint"]),
            vote("c", false, false, vec!["missing tests"]),
        ];
        let result = validate(&votes);
        assert!(!result.approved);
        assert_eq!(result.blocking_issues.len(), 2);
    }
}
