//! Policy research sub-agent: filters the benefits taxonomy down to the
//! recommended products, then asks the model to reason over that excerpt
//! only. When no product survives the filter the model is never called.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use aurora_core::domain::conversation::ChatMessage;

use crate::llm::{LlmClient, ResponseFormat};
use crate::registry::{Tool, ToolId};

const RESEARCH_SYSTEM_PROMPT: &str = "You are a travel insurance policy researcher. \
Review the supplied taxonomy carefully. \
Only return benefits when the taxonomy indicates eligibility. \
Always respond with valid JSON matching the requested schema.";

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PolicyResearchOutcome {
    pub products: Vec<Value>,
    pub reasoning: Option<String>,
    pub raw: Option<String>,
}

struct TaxonomyCache {
    payload: Value,
    modified: Option<SystemTime>,
}

pub struct PolicyResearchAgent {
    llm: Arc<dyn LlmClient>,
    taxonomy_path: PathBuf,
    cache: Mutex<TaxonomyCache>,
}

impl PolicyResearchAgent {
    pub fn new(llm: Arc<dyn LlmClient>, taxonomy_path: PathBuf) -> Result<Self> {
        let (payload, modified) = load_taxonomy(&taxonomy_path)?;
        Ok(Self { llm, taxonomy_path, cache: Mutex::new(TaxonomyCache { payload, modified }) })
    }

    pub async fn run(
        &self,
        user_query: &str,
        recommended_products: &[String],
        tiers: &[String],
        chat_history: &[(String, String)],
    ) -> Result<PolicyResearchOutcome> {
        self.ensure_taxonomy_fresh()?;
        let taxonomy = self.cache.lock().expect("taxonomy cache lock").payload.clone();

        let products = normalize_products(recommended_products);
        let (products, used_fallback) = if products.is_empty() {
            (extract_all_taxonomy_products(&taxonomy), true)
        } else {
            (products, false)
        };

        if products.is_empty() {
            info!(event_name = "policy_research.no_products", user_query);
            return Ok(PolicyResearchOutcome::default());
        }
        if used_fallback {
            info!(event_name = "policy_research.fallback_products", count = products.len());
        }

        let tiers = normalize_tiers(tiers, products.len());
        let context = render_taxonomy_context(&taxonomy, &products, &tiers);
        if context.trim().is_empty() {
            warn!(event_name = "policy_research.skipping_llm", reason = "empty_context");
            return Ok(PolicyResearchOutcome::default());
        }

        let prompt = build_prompt(user_query, chat_history, &context, &products, &tiers);
        let messages =
            vec![ChatMessage::system(RESEARCH_SYSTEM_PROMPT), ChatMessage::user(prompt)];

        let raw = match self.llm.complete(&messages, ResponseFormat::JsonObject).await {
            Ok(output) => output,
            Err(source) => {
                error!(event_name = "policy_research.llm_failure", error = %source);
                return Ok(PolicyResearchOutcome {
                    products: Vec::new(),
                    reasoning: None,
                    raw: Some(
                        json!({"error": "llm_failure", "message": source.to_string()}).to_string(),
                    ),
                });
            }
        };

        let parsed: Option<Value> = serde_json::from_str(&raw).ok();
        if parsed.is_none() {
            warn!(event_name = "policy_research.parse_failure", preview = %raw.chars().take(200).collect::<String>());
        }

        let mut eligible = Vec::new();
        let mut reasoning = None;
        if let Some(Value::Object(payload)) = parsed {
            if let Some(Value::Array(items)) = payload.get("products") {
                eligible = items.iter().filter(|item| item.is_object()).cloned().collect();
            }
            reasoning =
                payload.get("reasoning").and_then(Value::as_str).map(str::to_string);
        }

        Ok(PolicyResearchOutcome { products: eligible, reasoning, raw: Some(raw) })
    }

    /// Reloads the taxonomy when the backing file's modification time has
    /// advanced, so long-lived agents observe edits without a restart.
    fn ensure_taxonomy_fresh(&self) -> Result<()> {
        let modified = fs::metadata(&self.taxonomy_path)
            .and_then(|meta| meta.modified())
            .with_context(|| {
                format!("taxonomy file not found at {}", self.taxonomy_path.display())
            })?;

        let mut cache = self.cache.lock().expect("taxonomy cache lock");
        let stale = match cache.modified {
            Some(cached) => modified > cached,
            None => true,
        };
        if stale {
            info!(event_name = "policy_research.taxonomy_reload", path = %self.taxonomy_path.display());
            let (payload, new_modified) = load_taxonomy(&self.taxonomy_path)?;
            cache.payload = payload;
            cache.modified = new_modified;
        }
        Ok(())
    }
}

fn load_taxonomy(path: &Path) -> Result<(Value, Option<SystemTime>)> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("taxonomy file not found at {}", path.display()))?;
    let payload: Value = serde_json::from_str(&raw)
        .with_context(|| format!("taxonomy at {} is not valid JSON", path.display()))?;
    if !payload.is_object() {
        bail!("taxonomy payload should be a JSON object");
    }
    let modified = fs::metadata(path).and_then(|meta| meta.modified()).ok();
    Ok((payload, modified))
}

fn normalize_products(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_tiers(raw: &[String], target_length: usize) -> Vec<String> {
    let mut tiers: Vec<String> =
        raw.iter().take(target_length).map(|tier| tier.trim().to_string()).collect();
    tiers.resize(target_length, String::new());
    tiers
}

fn taxonomy_layers(taxonomy: &Value) -> Option<&Map<String, Value>> {
    taxonomy.get("layers").and_then(Value::as_object)
}

fn extract_all_taxonomy_products(taxonomy: &Value) -> Vec<String> {
    if let Some(Value::Array(declared)) = taxonomy.get("products") {
        let names: Vec<String> = declared
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        if !names.is_empty() {
            return names;
        }
    }

    let Some(layers) = taxonomy_layers(taxonomy) else {
        return Vec::new();
    };

    let mut names: Vec<String> = Vec::new();
    for layer in layers.values() {
        let Some(entries) = layer.as_array() else {
            continue;
        };
        for entry in entries {
            let Some(products) = entry.get("products").and_then(Value::as_object) else {
                continue;
            };
            for name in products.keys() {
                let trimmed = name.trim();
                if !trimmed.is_empty() && !names.iter().any(|known| known == trimmed) {
                    names.push(trimmed.to_string());
                }
            }
        }
    }
    names.sort();
    names
}

fn render_taxonomy_context(taxonomy: &Value, products: &[String], tiers: &[String]) -> String {
    let layers = taxonomy_layers(taxonomy);
    let general_conditions = layers.and_then(|l| l.get("layer_1_general_conditions"));
    let benefits = layers.and_then(|l| l.get("layer_2_benefits"));
    let benefit_conditions = layers
        .and_then(|l| l.get("layer_3_benefit_specific_conditions"))
        .filter(|entries| !entries.is_null())
        .filter(|entries| !matches!(entries, Value::Array(items) if items.is_empty()))
        .or_else(|| layers.and_then(|l| l.get("layer_3_benefit_conditions")));

    let mut sections = Vec::with_capacity(products.len());
    for (index, product) in products.iter().enumerate() {
        let general = filter_product_entries(general_conditions, product, "condition");
        let product_benefits = filter_product_entries(benefits, product, "benefit_name");
        let conditions = filter_product_entries(benefit_conditions, product, "condition");
        // a product the taxonomy does not know contributes no context
        if general.is_empty() && product_benefits.is_empty() && conditions.is_empty() {
            continue;
        }

        let tier = tiers.get(index).cloned().unwrap_or_default();
        let section = json!({
            "product": product,
            "tier": tier,
            "general_conditions": general,
            "benefits": product_benefits,
            "benefit_conditions": conditions,
        });
        sections.push(serde_json::to_string_pretty(&section).unwrap_or_default());
    }
    sections.join("\n---\n")
}

fn filter_product_entries(entries: Option<&Value>, product: &str, key: &str) -> Vec<Value> {
    let Some(Value::Array(items)) = entries else {
        return Vec::new();
    };

    let mut filtered = Vec::new();
    for entry in items {
        let Some(entry) = entry.as_object() else {
            continue;
        };
        let Some(products) = entry.get("products").and_then(Value::as_object) else {
            continue;
        };
        let Some(details) = products.get(product) else {
            continue;
        };
        if details.is_null() {
            continue;
        }
        filtered.push(json!({
            key: entry.get(key),
            "details": details,
            "parameters": entry.get("parameters"),
            "condition_type": entry.get("condition_type"),
        }));
    }
    filtered
}

fn build_prompt(
    user_query: &str,
    chat_history: &[(String, String)],
    context: &str,
    products: &[String],
    tiers: &[String],
) -> String {
    let history_block = chat_history
        .iter()
        .map(|(speaker, message)| format!("{speaker}: {message}"))
        .collect::<Vec<_>>()
        .join("\n");

    let products_block = products
        .iter()
        .enumerate()
        .map(|(index, product)| {
            let tier = tiers.get(index).map(String::as_str).unwrap_or("");
            let tier = if tier.is_empty() { "unspecified" } else { tier };
            format!("- {product} (tier: {tier})")
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "The user has asked: {user_query}\n\n\
         Conversation history (most recent last):\n{}\n\n\
         Recommended products and tiers:\n{products_block}\n\n\
         Taxonomy excerpts relevant to these products:\n{context}\n\n\
         Please produce a JSON object with the shape:\n\
         {{\n  \"products\": [\n    {{\n      \"product\": string,\n      \"tier\": string,\n      \
         \"benefits\": [\n        {{\n          \"name\": string,\n          \"why_eligible\": string,\n          \
         \"parameters\": object | null,\n          \"conditions\": [string]\n        }}\n      ]\n    }}\n  ],\n  \
         \"reasoning\": string\n}}\n\
         Only include benefits that the user appears eligible for.",
        if history_block.is_empty() { "No previous context." } else { &history_block },
    )
}

/// Orchestrator-facing wrapper. Tolerates the looser argument shapes the
/// model tends to produce (bare strings instead of arrays, missing tiers).
pub struct PolicyResearchTool {
    agent: Arc<PolicyResearchAgent>,
}

impl PolicyResearchTool {
    pub fn new(agent: Arc<PolicyResearchAgent>) -> Self {
        Self { agent }
    }
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value {
        Some(Value::String(text)) => Some(vec![text.clone()]),
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

fn history_pairs(value: Option<&Value>) -> Vec<(String, String)> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(map) => {
                let speaker = map
                    .get("speaker")
                    .or_else(|| map.get("role"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let message = map
                    .get("message")
                    .or_else(|| map.get("content"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                Some((speaker.to_string(), message.to_string()))
            }
            Value::Array(pair) if pair.len() >= 2 => Some((
                pair[0].as_str().unwrap_or("unknown").to_string(),
                pair[1].as_str().unwrap_or("").to_string(),
            )),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl Tool for PolicyResearchTool {
    fn id(&self) -> ToolId {
        ToolId::PolicyResearch
    }

    fn description(&self) -> &'static str {
        "Agentic policy researcher that maps recommended products to eligible benefits."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_query": {
                    "type": "string",
                    "description": "Latest user request the agent should address",
                },
                "recommended_products": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Names of products the user is eligible for",
                },
                "tiers": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Corresponding tier labels for each product",
                },
                "chat_history": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "speaker": {"type": "string"},
                            "message": {"type": "string"},
                        },
                        "required": ["speaker", "message"],
                    },
                    "description": "Optional recent conversation snippets to provide context",
                },
            },
            "required": ["user_query", "recommended_products", "tiers"],
        })
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        let user_query = input
            .get("user_query")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("policy_research requires a user_query string"))?
            .to_string();

        let mut missing = Vec::new();
        let products = string_list(input.get("recommended_products")).unwrap_or_else(|| {
            missing.push("recommended_products");
            Vec::new()
        });
        let tiers = string_list(input.get("tiers")).unwrap_or_else(|| {
            missing.push("tiers");
            Vec::new()
        });
        if !missing.is_empty() {
            warn!(
                event_name = "policy_research.missing_tool_arguments",
                missing = ?missing,
                user_query_preview = %user_query.chars().take(80).collect::<String>(),
            );
        }

        let history = history_pairs(input.get("chat_history"));
        let outcome = self.agent.run(&user_query, &products, &tiers, &history).await?;

        info!(
            event_name = "policy_research.completed",
            products = outcome.products.len(),
            has_reasoning = outcome.reasoning.is_some(),
        );

        Ok(json!({
            "products": outcome.products,
            "reasoning": outcome.reasoning,
            "raw": outcome.raw,
        }))
    }
}
