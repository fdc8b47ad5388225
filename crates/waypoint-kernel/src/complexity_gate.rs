use waypoint_types::ComplexityGateOutput;

const INSTANT_PASS_CRITERIA: usize = 5;
const INSTANT_PASS_METHODS: usize = 3;
const INSTANT_FAIL_CRITERIA: usize = 12;
const INSTANT_FAIL_METHODS: usize = 8;

/// Plain-text words that match the backtick/`def` heuristics below but
/// are never themselves a referenced method (`spec.md` §4.4).
const METHOD_FALSE_POSITIVES: &[&str] = &[
    "if", "for", "while", "return", "print", "true", "false", "none", "self", "async", "await",
    "class", "import", "from",
];

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    InstantPass,
    InstantFail { split_suggestions: Vec<String> },
    Borderline,
}

/// Counts markdown checkbox acceptance criteria: lines matching
/// `- [ ]` or `- [x]` (case-insensitive, any leading whitespace).
pub fn count_acceptance_criteria(body: &str) -> usize {
    body.lines()
        .map(str::trim_start)
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            lower.starts_with("- [ ]") || lower.starts_with("- [x]") || lower.starts_with("* [ ]")
                || lower.starts_with("* [x]")
        })
        .count()
}

/// Counts referenced methods: the union of backticked call syntax
/// (`` `name(...)` ``) and `def`/`async def` declarations, filtering the
/// false-positive word list. Each distinct name counts once.
pub fn count_referenced_methods(body: &str) -> usize {
    let mut names = std::collections::BTreeSet::new();

    for segment in body.split('`') {
        if let Some(paren) = segment.find('(') {
            let candidate = segment[..paren].trim();
            if is_method_name(candidate) {
                names.insert(candidate.to_string());
            }
        }
    }

    for line in body.lines() {
        let trimmed = line.trim_start();
        let after_def = trimmed
            .strip_prefix("async def ")
            .or_else(|| trimmed.strip_prefix("def "));
        if let Some(rest) = after_def {
            if let Some(paren) = rest.find('(') {
                let candidate = rest[..paren].trim();
                if is_method_name(candidate) {
                    names.insert(candidate.to_string());
                }
            }
        }
    }

    names.len()
}

fn is_method_name(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && candidate.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && !METHOD_FALSE_POSITIVES.contains(&candidate.to_ascii_lowercase().as_str())
}

/// The tiered instant pass/fail decision (`spec.md` §4.4 tiers 1–2).
/// `Borderline` means the caller must delegate to the cheap LLM
/// estimator via [`crate::agent_dispatch::AgentDispatcher::complexity_gate`].
pub fn decide(body: &str) -> GateDecision {
    let criteria = count_acceptance_criteria(body);
    let methods = count_referenced_methods(body);

    if criteria <= INSTANT_PASS_CRITERIA && methods <= INSTANT_PASS_METHODS {
        return GateDecision::InstantPass;
    }
    if criteria > INSTANT_FAIL_CRITERIA || methods > INSTANT_FAIL_METHODS {
        return GateDecision::InstantFail {
            split_suggestions: generate_split_suggestions(body, criteria),
        };
    }
    GateDecision::Borderline
}

/// Domain heuristics for split suggestions: trigger-type grouping,
/// CRUD-operation grouping, architectural-layer grouping, or an N-way
/// criterion split as a fallback (`spec.md` §4.4).
fn generate_split_suggestions(body: &str, criteria: usize) -> Vec<String> {
    let lower = body.to_ascii_lowercase();

    let crud_ops = ["create", "read", "update", "delete"];
    if crud_ops.iter().filter(|op| lower.contains(*op)).count() >= 2 {
        return crud_ops
            .iter()
            .filter(|op| lower.contains(*op))
            .map(|op| format!("{op} operations"))
            .collect();
    }

    let layers = ["api", "service", "database", "ui"];
    if layers.iter().filter(|l| lower.contains(*l)).count() >= 2 {
        return layers
            .iter()
            .filter(|l| lower.contains(*l))
            .map(|l| format!("{l} layer"))
            .collect();
    }

    let triggers = ["on create", "on update", "on delete", "scheduled", "webhook"];
    if triggers.iter().filter(|t| lower.contains(*t)).count() >= 2 {
        return triggers
            .iter()
            .filter(|t| lower.contains(*t))
            .map(|t| format!("{t} trigger"))
            .collect();
    }

    let groups = criteria.div_ceil(INSTANT_PASS_CRITERIA).max(2);
    (1..=groups).map(|n| format!("criterion group {n} of {groups}")).collect()
}

/// Converts a borderline estimator's output into a final decision (merged
/// with the deterministic tiers): the orchestrator treats `needs_split`
/// the same way regardless of which tier produced it.
pub fn needs_split(output: &ComplexityGateOutput) -> bool {
    output.needs_split
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_criteria_three_methods_is_instant_pass() {
        let body = "- [ ] a\n- [ ] b\n- [ ] c\n- [ ] d\n- [ ] e\nCalls `foo()` and `bar()` and `baz()`.";
        assert_eq!(decide(body), GateDecision::InstantPass);
    }

    #[test]
    fn thirteen_criteria_is_instant_fail() {
        let body = (1..=13).map(|i| format!("- [ ] criterion {i}\n")).collect::<String>();
        match decide(&body) {
            GateDecision::InstantFail { split_suggestions } => {
                assert!(!split_suggestions.is_empty())
            }
            other => panic!("expected instant fail, got {other:?}"),
        }
    }

    #[test]
    fn between_the_boundaries_is_borderline() {
        let body = "- [ ] a\n- [ ] b\n- [ ] c\n- [ ] d\n- [ ] e\n- [ ] f\n- [ ] g\n- [ ] h";
        assert_eq!(decide(body), GateDecision::Borderline);
    }

    #[test]
    fn false_positive_words_are_not_counted_as_methods() {
        let body = "if (`x`) { return `y` }";
        assert_eq!(count_referenced_methods(body), 0);
    }

    #[test]
    fn def_declarations_are_counted_as_methods() {
        let body = "def handle_request(req):\n    pass\nasync def fetch_data(url):\n    pass";
        assert_eq!(count_referenced_methods(body), 2);
    }

    #[test]
    fn crud_grouping_is_preferred_when_present() {
        let body = (1..=13).map(|i| format!("- [ ] criterion {i}\n")).collect::<String>()
            + "Must support create, update, and delete operations.";
        match decide(&body) {
            GateDecision::InstantFail { split_suggestions } => {
                assert!(split_suggestions.iter().any(|s| s.contains("create")));
            }
            other => panic!("expected instant fail, got {other:?}"),
        }
    }
}
