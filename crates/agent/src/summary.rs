//! Deterministic fallback phrasing for turns where the model returned an
//! empty answer after running tools. The traveller always gets a message.

use serde_json::Value;

use crate::orchestrator::ToolRun;
use crate::registry::ToolId;

const SOURCE_ATTRIBUTION: &str = "Source: insurer policy taxonomy.";

pub fn fallback_summary(last_run: &ToolRun) -> String {
    if last_run.name == ToolId::PolicyResearch.name() {
        return render_policy_research(&last_run.result);
    }

    format!(
        "I've completed the {} step. Here is the result: {}",
        last_run.name, last_run.result
    )
}

fn render_policy_research(result: &Value) -> String {
    let products = result
        .get("products")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if products.is_empty() {
        return format!(
            "I checked the policy taxonomy but could not find benefits matching your situation. {SOURCE_ATTRIBUTION}"
        );
    }

    let mut lines = vec!["Here is what the policy research found:".to_string()];

    for product in &products {
        let name = product.get("product").and_then(Value::as_str).unwrap_or("Unnamed product");
        let tier = product.get("tier").and_then(Value::as_str).unwrap_or("");
        if tier.is_empty() {
            lines.push(format!("\n{name}"));
        } else {
            lines.push(format!("\n{name} ({tier} tier)"));
        }

        let benefits = product
            .get("benefits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if benefits.is_empty() {
            lines.push("- No eligible benefits identified.".to_string());
            continue;
        }

        for benefit in &benefits {
            let benefit_name =
                benefit.get("name").and_then(Value::as_str).unwrap_or("Unnamed benefit");
            let mut line = format!("- {benefit_name}");
            if let Some(rationale) = benefit.get("why_eligible").and_then(Value::as_str) {
                if !rationale.trim().is_empty() {
                    line.push_str(&format!(": {rationale}"));
                }
            }
            if let Some(parameters) = benefit.get("parameters") {
                if parameters.is_object() && !parameters.as_object().map_or(true, |p| p.is_empty())
                {
                    line.push_str(&format!(" (limits: {parameters})"));
                }
            }
            lines.push(line);

            let conditions = benefit
                .get("conditions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for condition in conditions.iter().filter_map(Value::as_str) {
                if !condition.trim().is_empty() {
                    lines.push(format!("  - Condition: {condition}"));
                }
            }
        }
    }

    if let Some(reasoning) = result.get("reasoning").and_then(Value::as_str) {
        if !reasoning.trim().is_empty() {
            lines.push(format!("\n{reasoning}"));
        }
    }

    lines.push(format!("\n{SOURCE_ATTRIBUTION}"));
    lines.join("\n")
}
