//! Prompt construction for remediation suggestions.

use serde_json::{Value, json};

const VIOLATIONS_PLACEHOLDER: &str = "<analysisResults>";

const TEMPLATE: &str = r#"You are an expert web accessibility consultant. Analyze the following axe-core accessibility violations and provide actionable, developer-friendly suggestions for each issue.

Every suggestion must match this TypeScript interface:

interface ViolationSummary {
    problem: string;
    impact: "critical" | "serious" | "moderate" | "minor";
    affectedUsers: string;
}

interface WhyMatters {
    userImpact: string;
    assistiveTechAffected: string;
}

interface HowToFix {
    step1: string;
    codeExample: string;
}

interface TestingInstructions {
    verify: string;
    tools: string;
}

interface PriorityLevel {
    urgency: "high" | "medium" | "low";
    wcagLevel: "A" | "AA" | "AAA";
}

interface AccessibilityViolation {
    issue: string;
    summary: ViolationSummary;
    whyMatters: WhyMatters;
    howToFix: HowToFix;
    testingInstructions: TestingInstructions;
    priorityLevel: PriorityLevel;
}

FORMATTING RULES:
- Use single quotes for all HTML attribute values in codeExample fields, e.g. <html lang='en'>
- The JSON must be valid and parseable
- Use the exact field names from the interfaces above
- Use only the listed values for impact, urgency and wcagLevel

Violations JSON:
<analysisResults>

Reply with a JSON array of AccessibilityViolation objects, one per violation, in the same order.
The reply must contain only the JSON array: no prose, no explanations, no markdown code fences."#;

/// Limits the violations sent upstream to the first `max` entries.
///
/// Results without a `violations` array are passed through unchanged.
pub fn shape_violations(results: &Value, max: usize) -> Value {
    match results.get("violations") {
        Some(Value::Array(items)) => Value::Array(items.iter().take(max).cloned().collect()),
        Some(other) => other.clone(),
        None => results.clone(),
    }
}

pub fn build_prompt(results: &Value, max_violations: usize) -> String {
    let analysis = json!({ "violations": shape_violations(results, max_violations) });
    TEMPLATE.replacen(VIOLATIONS_PLACEHOLDER, &analysis.to_string(), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_violation_lists() {
        let items: Vec<Value> = (0..8).map(|i| json!({ "id": format!("rule-{i}") })).collect();
        let shaped = shape_violations(&json!({ "violations": items }), 5);
        let arr = shaped.as_array().unwrap();
        assert_eq!(arr.len(), 5);
        assert_eq!(arr[4]["id"], "rule-4");
    }

    #[test]
    fn passes_through_results_without_violations() {
        let results = json!({ "passes": [1, 2] });
        assert_eq!(shape_violations(&results, 5), results);
    }

    #[test]
    fn prompt_embeds_json_literal() {
        let prompt = build_prompt(&json!({ "violations": [{ "id": "image-alt" }] }), 5);
        assert!(prompt.contains(r#"{"violations":[{"id":"image-alt"}]}"#));
        assert!(!prompt.contains(VIOLATIONS_PLACEHOLDER));
    }
}
