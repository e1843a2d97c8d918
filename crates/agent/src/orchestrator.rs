//! The conversational state machine: ask the model for a structured
//! decision, execute the tools it requested in order, feed the results
//! back, and repeat until the model answers without actions or the round
//! cap is hit.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use aurora_core::domain::client::ClientDatum;
use aurora_core::domain::conversation::ChatMessage;
use aurora_core::guidance::compose_profile_guidance;
use aurora_core::readiness::PaymentReadiness;
use aurora_store::{SessionBackend, SessionStore, StoreError};

use crate::llm::{LlmClient, ResponseFormat};
use crate::protocol::{parse_assistant_reply, ActionRequest, AssistantPayload, ParseAnomaly};
use crate::registry::{ToolId, ToolRegistry};
use crate::summary::fallback_summary;

pub const DEFAULT_MAX_ROUNDS: usize = 6;

const TOOL_INSTRUCTION: &str = "You have access to specialized tools.\n\
Respond using a JSON object shaped as:\n\
{\"output\": \"<assistant reply or empty string>\", \"actions\": [{\"tool\": \"tool_name\", \"input\": { ... }}]}\n\
List every required tool in execution order inside the actions array.\n\
When you need to call tools, set `output` to an empty string and populate `actions`.\n\
After tool results are available, produce the final answer by setting `output` and an empty `actions` array.\n\
Always cite policy sources in `output` when giving direct answers.";

const UNKNOWN_TOOL_REPLY: &str = "I'm sorry, I can't access the requested capability right now. \
Could you try rephrasing your question?";

const ROUND_LIMIT_REPLY: &str = "I'm sorry, I'm having trouble completing that request right now. \
Let's try again in a moment.";

const LLM_FAILURE_REPLY: &str = "I'm sorry, something went wrong while preparing a response. \
Please try again shortly.";

#[derive(Clone, Debug, Serialize)]
pub struct ToolRun {
    pub name: String,
    pub input: Value,
    pub result: Value,
    pub tool_call_id: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct TurnFailure {
    pub kind: &'static str,
    pub message: String,
}

/// Everything one turn produced: the final reply, the ordered tool runs
/// across all rounds, and a structured failure marker when the provider
/// itself went down.
#[derive(Clone, Debug, Serialize)]
pub struct TurnOutcome {
    pub output: String,
    pub actions: Vec<ActionRequest>,
    pub tool_used: Option<String>,
    pub tool_result: Option<Value>,
    pub tool_runs: Vec<ToolRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TurnFailure>,
}

pub struct Orchestrator<B> {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    sessions: SessionStore<B>,
    max_rounds: usize,
}

impl<B: SessionBackend> Orchestrator<B> {
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolRegistry, sessions: SessionStore<B>) -> Self {
        Self { llm, tools, sessions, max_rounds: DEFAULT_MAX_ROUNDS }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn sessions(&self) -> &SessionStore<B> {
        &self.sessions
    }

    pub async fn merge_clients(
        &self,
        session_id: &str,
        clients: &[ClientDatum],
        source: Option<&str>,
    ) -> Result<Vec<ClientDatum>, StoreError> {
        self.sessions.merge_clients(session_id, clients, source).await
    }

    pub async fn handle_message(
        &self,
        session_id: &str,
        user_message: &str,
        channel: &str,
    ) -> Result<TurnOutcome, StoreError> {
        let session = self.sessions.get(session_id).await?;
        let system_prompt = self.build_system_prompt(
            channel,
            &session.clients,
            session.tool_results.get(ToolId::ClaimsRecommendation.name()),
        );

        let mut messages = Vec::with_capacity(session.messages.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(session.messages.iter().cloned());
        messages.push(ChatMessage::user(user_message));

        info!(event_name = "orchestrator.invoke", session_id, channel);

        self.sessions.append_message(session_id, ChatMessage::user(user_message)).await?;
        self.sessions.try_mark_verification(session_id, user_message).await?;

        let mut tool_runs: Vec<ToolRun> = Vec::new();

        for round in 1..=self.max_rounds {
            let reply = match self.llm.complete(&messages, ResponseFormat::JsonObject).await {
                Ok(reply) => reply,
                Err(source) => {
                    error!(
                        event_name = "orchestrator.llm_failure",
                        session_id,
                        round,
                        error = %source,
                    );
                    let failure =
                        TurnFailure { kind: "llm_failure", message: source.to_string() };
                    return self
                        .finalize(
                            session_id,
                            LLM_FAILURE_REPLY.to_string(),
                            Vec::new(),
                            tool_runs,
                            Some(failure),
                        )
                        .await;
                }
            };

            let parsed = parse_assistant_reply(&reply);
            match parsed.anomaly {
                Some(ParseAnomaly::NonJsonReply) => warn!(
                    event_name = "orchestrator.non_json_reply_coerced",
                    session_id,
                    round,
                    reply_preview = %preview(&reply),
                ),
                Some(ParseAnomaly::NonObjectJson) => warn!(
                    event_name = "orchestrator.unexpected_json_shape",
                    session_id,
                    round,
                ),
                None => {}
            }
            let payload = parsed.payload;

            if payload.actions.is_empty() {
                return self
                    .finalize(session_id, payload.output, payload.actions, tool_runs, None)
                    .await;
            }

            // the model gets to see its own prior calls on the next round
            messages.push(ChatMessage::assistant(payload.to_transcript_json()));

            let total = payload.actions.len();
            for (index, action) in payload.actions.iter().enumerate() {
                let Some(tool_name) = action.tool.as_deref() else {
                    warn!(
                        event_name = "orchestrator.tool_missing_name",
                        session_id,
                        sequence = index + 1,
                    );
                    continue;
                };

                let Some(tool) = self.tools.get(tool_name) else {
                    error!(event_name = "orchestrator.unknown_tool", session_id, tool = tool_name);
                    return self
                        .finalize(
                            session_id,
                            UNKNOWN_TOOL_REPLY.to_string(),
                            Vec::new(),
                            tool_runs,
                            None,
                        )
                        .await;
                };

                info!(
                    event_name = "orchestrator.tool_call",
                    session_id,
                    tool = tool_name,
                    sequence = index + 1,
                    total,
                );

                if tool.id() == ToolId::PaymentCheckout {
                    self.sessions.apply_payment_context(session_id, &action.input).await?;
                    let readiness = self.sessions.evaluate_payment_readiness(session_id).await?;
                    if !readiness.is_ready() {
                        info!(
                            event_name = "orchestrator.payment_guard_block",
                            session_id,
                            status = readiness.status_label(),
                        );
                        let guard_reply = compose_payment_guard_reply(&readiness);
                        if let PaymentReadiness::Unverified { client_id, fields } = &readiness {
                            self.sessions
                                .request_verification(session_id, client_id.as_deref(), fields)
                                .await?;
                        }
                        return self
                            .finalize(session_id, guard_reply, Vec::new(), tool_runs, None)
                            .await;
                    }
                }

                let result = match tool.invoke(action.input.clone()).await {
                    Ok(result) => result,
                    Err(source) => {
                        error!(
                            event_name = "orchestrator.tool_failed",
                            session_id,
                            tool = tool_name,
                            error = %source,
                        );
                        json!({"status": "error", "message": source.to_string()})
                    }
                };

                let tool_call_id = action
                    .tool_call_id
                    .clone()
                    .unwrap_or_else(|| format!("toolcall-{}", Uuid::new_v4().simple()));

                self.sessions.set_tool_result(session_id, tool_name, result.clone()).await?;
                messages.push(ChatMessage::tool(tool_name, &tool_call_id, result.to_string()));
                tool_runs.push(ToolRun {
                    name: tool_name.to_string(),
                    input: action.input.clone(),
                    result,
                    tool_call_id,
                });
            }
        }

        error!(
            event_name = "orchestrator.max_rounds_exceeded",
            session_id,
            max_rounds = self.max_rounds,
        );
        self.finalize(session_id, ROUND_LIMIT_REPLY.to_string(), Vec::new(), tool_runs, None).await
    }

    async fn finalize(
        &self,
        session_id: &str,
        output: String,
        actions: Vec<ActionRequest>,
        tool_runs: Vec<ToolRun>,
        error: Option<TurnFailure>,
    ) -> Result<TurnOutcome, StoreError> {
        let output = if output.trim().is_empty() {
            match tool_runs.last() {
                Some(last_run) => fallback_summary(last_run),
                None => output,
            }
        } else {
            output
        };

        let transcript =
            AssistantPayload { output: output.clone(), actions: actions.clone() }
                .to_transcript_json();
        self.sessions.append_message(session_id, ChatMessage::assistant(transcript)).await?;

        let (tool_used, tool_result) = tool_runs
            .last()
            .map(|run| (run.name.clone(), run.result.clone()))
            .unzip();

        Ok(TurnOutcome { output, actions, tool_used, tool_result, tool_runs, error })
    }

    fn build_system_prompt(
        &self,
        channel: &str,
        clients: &[ClientDatum],
        cached_risk: Option<&Value>,
    ) -> String {
        let mut prompt = format!(
            "You are Aurora, a warm and knowledgeable travel insurance concierge. \
             Match the traveller's tone, keep answers concise yet thorough, and always \
             explain your reasoning with citations when referencing policies.\n\n\
             Channel: {channel}.\n\
             Available Tools:\n{}\n\n{TOOL_INSTRUCTION}",
            self.tools.catalog(),
        );

        if let Some(guidance) = compose_profile_guidance(clients) {
            prompt.push_str("\n\n");
            prompt.push_str(&guidance.summary_text);
        }
        if let Some(risk) = cached_risk {
            prompt.push_str("\n\n[Risk Forecast Snapshot]\n");
            prompt.push_str(&risk.to_string());
        }
        prompt
    }
}

fn compose_payment_guard_reply(readiness: &PaymentReadiness) -> String {
    match readiness {
        PaymentReadiness::MissingClients => {
            "Before we can secure a policy, I need the traveller's profile - \
             name, contacts, passport and trip itinerary. \
             Please share those details, or pass them through the integration payload."
                .to_string()
        }
        PaymentReadiness::MissingFields { missing, .. } => {
            let fields_text = match missing.as_slice() {
                [] => "some required fields".to_string(),
                [only] => only.clone(),
                [head @ .., last] => format!("{} and {last}", head.join(", ")),
            };
            format!(
                "I still need a few details before the payment step: {fields_text}. \
                 Once you share them, I can prepare checkout."
            )
        }
        PaymentReadiness::Unverified { fields, .. } => {
            const LABELS: &[(&str, &str)] = &[
                ("name", "Name"),
                ("destination", "Destination"),
                ("trip_type", "Trip type"),
                ("trip_cost", "Trip cost"),
                ("travel_dates", "Travel dates"),
                ("email_address", "Email"),
                ("phone_number", "Phone"),
                ("passport_number", "Passport number"),
            ];
            let lines: Vec<String> = LABELS
                .iter()
                .filter_map(|(key, label)| {
                    fields.get(*key).map(|value| {
                        let rendered = match value {
                            Value::String(text) => text.clone(),
                            other => other.to_string(),
                        };
                        format!("- {label}: {rendered}")
                    })
                })
                .collect();
            let summary = if lines.is_empty() {
                "- Traveller details on file".to_string()
            } else {
                lines.join("\n")
            };
            format!(
                "Let's double-check the traveller info before payment:\n{summary}\n\
                 Please confirm everything is correct (a simple 'Confirmed' works) so I can continue."
            )
        }
        PaymentReadiness::Ready { .. } => {
            "I need a complete and confirmed traveller profile before creating the checkout link. \
             Could you review the details and update anything that's missing?"
                .to_string()
        }
    }
}

fn preview(reply: &str) -> String {
    reply.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;

    use aurora_core::domain::client::{
        ClientDatum, PersonalInfo, TripDetails, TripType, VerificationStatus,
    };
    use aurora_core::domain::conversation::{ChatMessage, ChatRole};
    use aurora_store::{InMemorySessionBackend, SessionStore};

    use crate::llm::{LlmClient, ResponseFormat};
    use crate::registry::testing::{full_registry, StubTool};
    use crate::registry::{ToolId, ToolRegistry};

    use super::Orchestrator;

    /// Replays scripted replies in order, repeating the last one forever.
    struct ScriptedLlm {
        replies: Vec<String>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl ScriptedLlm {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: replies.iter().map(|r| r.to_string()).collect(),
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { replies: Vec::new(), calls: AtomicUsize::new(0), fail: true })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _format: ResponseFormat,
        ) -> Result<String> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("connection reset by provider");
            }
            let clamped = index.min(self.replies.len().saturating_sub(1));
            Ok(self.replies.get(clamped).cloned().unwrap_or_default())
        }
    }

    fn orchestrator(
        llm: Arc<ScriptedLlm>,
        registry: ToolRegistry,
    ) -> Orchestrator<InMemorySessionBackend> {
        Orchestrator::new(llm, registry, SessionStore::new(InMemorySessionBackend::default()))
    }

    fn complete_client(id: &str) -> ClientDatum {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).expect("valid date");
        ClientDatum {
            client_id: Some(id.to_string()),
            personal_info: PersonalInfo {
                name: Some("Aisha Tan".to_string()),
                email_address: Some("aisha@example.com".to_string()),
                phone_number: Some("+6598765432".to_string()),
                date_of_birth: Some(date(1991, 6, 15)),
                place_of_residence: Some("Singapore".to_string()),
                passport_number: Some("E1234567".to_string()),
            },
            trips: vec![TripDetails {
                destination: Some("Bali".to_string()),
                start_date: Some(date(2025, 12, 1)),
                end_date: Some(date(2025, 12, 10)),
                trip_type: Some(TripType::Single),
                trip_cost: Some(1800.0),
                ..TripDetails::default()
            }],
            ..ClientDatum::default()
        }
    }

    #[tokio::test]
    async fn unknown_tool_terminates_round_one_with_apology() {
        let llm = ScriptedLlm::new(&[
            r#"{"output": "", "actions": [{"tool": "quantum_oracle", "input": {}}]}"#,
        ]);
        let agent = orchestrator(llm.clone(), full_registry(Vec::new()));

        let outcome = agent.handle_message("s-1", "hello", "web").await.expect("turn");

        assert_eq!(llm.call_count(), 1);
        assert!(outcome.output.contains("can't access the requested capability"));
        assert!(outcome.tool_runs.is_empty());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn single_tool_call_then_final_answer() {
        let claims = StubTool::ok(
            ToolId::ClaimsRecommendation,
            json!({"recommendation": "gold", "reason": "elevated average claim cost"}),
        );
        let llm = ScriptedLlm::new(&[
            r#"{"output": "", "actions": [{"tool": "claims_recommendation", "input": {"destination": "Bali"}}]}"#,
            r#"{"output": "done", "actions": []}"#,
        ]);
        let agent = orchestrator(llm.clone(), full_registry(vec![claims.clone()]));

        let outcome = agent.handle_message("s-1", "what plan suits Bali?", "web").await.expect("turn");

        assert_eq!(llm.call_count(), 2);
        assert_eq!(claims.call_count(), 1);
        assert_eq!(outcome.output, "done");
        assert_eq!(outcome.tool_runs.len(), 1);
        assert_eq!(outcome.tool_used.as_deref(), Some("claims_recommendation"));
        assert_eq!(outcome.tool_result.as_ref().expect("result")["recommendation"], "gold");

        let cached = agent
            .sessions()
            .get_tool_result("s-1", "claims_recommendation")
            .await
            .expect("cache")
            .expect("cached result");
        assert_eq!(cached["recommendation"], "gold");
    }

    #[tokio::test]
    async fn endless_actions_stop_at_the_round_cap() {
        let claims = StubTool::ok(ToolId::ClaimsRecommendation, json!({"status": "ok"}));
        let llm = ScriptedLlm::new(&[
            r#"{"output": "", "actions": [{"tool": "claims_recommendation", "input": {}}]}"#,
        ]);
        let agent = orchestrator(llm.clone(), full_registry(vec![claims.clone()]));

        let outcome = agent.handle_message("s-1", "loop forever", "web").await.expect("turn");

        assert_eq!(llm.call_count(), 6, "exactly max_rounds model calls");
        assert_eq!(claims.call_count(), 6);
        assert!(outcome.output.contains("try again"));
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn checkout_is_blocked_without_any_profile() {
        let payment = StubTool::ok(ToolId::PaymentCheckout, json!({"session_id": "cs_1"}));
        let llm = ScriptedLlm::new(&[
            r#"{"output": "", "actions": [{"tool": "payment_checkout", "input": {"plan_code": "GOLD", "amount": 4100}}]}"#,
        ]);
        let agent = orchestrator(llm.clone(), full_registry(vec![payment.clone()]));

        let outcome = agent.handle_message("s-1", "buy it", "web").await.expect("turn");

        assert_eq!(payment.call_count(), 0, "gate fires before the tool runs");
        assert!(outcome.output.contains("I need the traveller's profile"));
        assert!(outcome.tool_runs.is_empty());
    }

    #[tokio::test]
    async fn checkout_against_unverified_profile_requests_confirmation() {
        let payment = StubTool::ok(ToolId::PaymentCheckout, json!({"session_id": "cs_1"}));
        let llm = ScriptedLlm::new(&[
            r#"{"output": "", "actions": [{"tool": "payment_checkout", "input": {"plan_code": "GOLD", "amount": 4100}}]}"#,
        ]);
        let agent = orchestrator(llm.clone(), full_registry(vec![payment.clone()]));
        agent
            .merge_clients("s-1", &[complete_client("C-1")], Some("web"))
            .await
            .expect("seed roster");

        let outcome = agent.handle_message("s-1", "buy it", "web").await.expect("turn");

        assert_eq!(payment.call_count(), 0);
        assert!(outcome.output.contains("double-check the traveller info"));
        assert!(outcome.output.contains("Bali"));

        let clients = agent.sessions().get_clients("s-1").await.expect("clients");
        assert_eq!(clients[0].verification.status, VerificationStatus::Pending);
        assert!(clients[0].verification.requested_at.is_some());
    }

    #[tokio::test]
    async fn checkout_payload_backfills_missing_profile_fields_before_the_gate() {
        let payment = StubTool::ok(ToolId::PaymentCheckout, json!({"session_id": "cs_1"}));
        let llm = ScriptedLlm::new(&[
            r#"{"output": "", "actions": [{"tool": "payment_checkout", "input": {
                "plan_code": "GOLD", "amount": 50000,
                "customer_email": "j4vierwong0605@gmail.com",
                "metadata": {
                    "customer_name": "Javier Wong",
                    "customer_phone": "+6591234567",
                    "passport_number": "E1281932",
                    "date_of_birth": "06 April 1999",
                    "place_of_residence": "Singapore",
                    "trip_destination": "Osaka",
                    "trip_start_date": "2025-11-03",
                    "trip_end_date": "2025-11-10",
                    "trip_type": "Single",
                    "trip_cost": "500.00"
                }}}]}"#,
        ]);
        let agent = orchestrator(llm.clone(), full_registry(vec![payment.clone()]));
        agent
            .merge_clients("s-1", &[ClientDatum::default()], Some("payment"))
            .await
            .expect("seed roster");

        let outcome = agent.handle_message("s-1", "buy it", "web").await.expect("turn");

        assert_eq!(payment.call_count(), 0, "backfilled profile still needs confirmation");
        assert!(outcome.output.contains("double-check"));

        let clients = agent.sessions().get_clients("s-1").await.expect("clients");
        assert!(clients[0].required_missing_fields().is_empty(), "payload completed the profile");
        assert_eq!(clients[0].personal_info.name.as_deref(), Some("Javier Wong"));
    }

    #[tokio::test]
    async fn ready_profile_lets_checkout_run() {
        let payment = StubTool::ok(
            ToolId::PaymentCheckout,
            json!({"session_id": "cs_1", "checkout_url": "https://pay.example/cs_1"}),
        );
        let llm = ScriptedLlm::new(&[
            r#"{"output": "", "actions": [{"tool": "payment_checkout", "input": {"plan_code": "GOLD", "amount": 4100}}]}"#,
            r#"{"output": "Here is your checkout link.", "actions": []}"#,
        ]);
        let agent = orchestrator(llm.clone(), full_registry(vec![payment.clone()]));

        let mut confirmed = complete_client("C-1");
        confirmed.verification.status = VerificationStatus::Confirmed;
        agent.merge_clients("s-1", &[confirmed], Some("web")).await.expect("seed roster");

        let outcome = agent.handle_message("s-1", "buy it", "web").await.expect("turn");

        assert_eq!(payment.call_count(), 1);
        assert_eq!(outcome.output, "Here is your checkout link.");
        assert_eq!(outcome.tool_runs.len(), 1);
    }

    #[tokio::test]
    async fn action_without_tool_name_is_skipped_not_fatal() {
        let claims = StubTool::ok(ToolId::ClaimsRecommendation, json!({"status": "ok"}));
        let llm = ScriptedLlm::new(&[
            r#"{"output": "", "actions": [{"input": {"x": 1}}, {"tool": "claims_recommendation", "input": {}}]}"#,
            r#"{"output": "done", "actions": []}"#,
        ]);
        let agent = orchestrator(llm.clone(), full_registry(vec![claims.clone()]));

        let outcome = agent.handle_message("s-1", "go", "web").await.expect("turn");

        assert_eq!(claims.call_count(), 1);
        assert_eq!(outcome.tool_runs.len(), 1);
        assert_eq!(outcome.output, "done");
    }

    #[tokio::test]
    async fn tool_failure_becomes_an_error_result_for_the_model() {
        let claims = StubTool::failing(ToolId::ClaimsRecommendation, "claims service unavailable");
        let llm = ScriptedLlm::new(&[
            r#"{"output": "", "actions": [{"tool": "claims_recommendation", "input": {}}]}"#,
            r#"{"output": "done without claims data", "actions": []}"#,
        ]);
        let agent = orchestrator(llm.clone(), full_registry(vec![claims.clone()]));

        let outcome = agent.handle_message("s-1", "go", "web").await.expect("turn");

        assert_eq!(outcome.output, "done without claims data");
        assert_eq!(outcome.tool_runs.len(), 1);
        assert_eq!(outcome.tool_runs[0].result["status"], "error");
        assert!(outcome.tool_runs[0].result["message"]
            .as_str()
            .expect("message")
            .contains("claims service unavailable"));
    }

    #[tokio::test]
    async fn provider_failure_yields_a_structured_error_outcome() {
        let agent = orchestrator(ScriptedLlm::failing(), full_registry(Vec::new()));

        let outcome = agent.handle_message("s-1", "hello", "web").await.expect("turn");

        let failure = outcome.error.expect("failure marker");
        assert_eq!(failure.kind, "llm_failure");
        assert!(failure.message.contains("connection reset"));
        assert!(!outcome.output.is_empty());

        let session = agent.sessions().get("s-1").await.expect("session");
        assert_eq!(session.messages.len(), 2, "session transcript stays consistent");
    }

    #[tokio::test]
    async fn blank_final_output_falls_back_to_a_tool_summary() {
        let research = StubTool::ok(
            ToolId::PolicyResearch,
            json!({
                "products": [{
                    "product": "TravelSecure",
                    "tier": "gold",
                    "benefits": [{"name": "Emergency medical", "why_eligible": "destination covered"}],
                }],
                "reasoning": "Matched against the taxonomy.",
            }),
        );
        let llm = ScriptedLlm::new(&[
            r#"{"output": "", "actions": [{"tool": "policy_research", "input": {"user_query": "coverage?"}}]}"#,
            r#"{"output": "", "actions": []}"#,
        ]);
        let agent = orchestrator(llm.clone(), full_registry(vec![research.clone()]));

        let outcome = agent.handle_message("s-1", "what am I covered for?", "web").await.expect("turn");

        assert!(outcome.output.contains("TravelSecure"));
        assert!(outcome.output.contains("Source: insurer policy taxonomy."));
    }

    #[tokio::test]
    async fn transcript_records_user_then_final_assistant_turn() {
        let llm = ScriptedLlm::new(&[r#"{"output": "hi there", "actions": []}"#]);
        let agent = orchestrator(llm.clone(), full_registry(Vec::new()));

        agent.handle_message("s-1", "hello", "web").await.expect("turn");

        let session = agent.sessions().get("s-1").await.expect("session");
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, ChatRole::User);
        assert_eq!(session.messages[0].content, "hello");
        assert_eq!(session.messages[1].role, ChatRole::Assistant);
        assert!(session.messages[1].content.contains("hi there"));
    }

    #[tokio::test]
    async fn confirmation_message_promotes_pending_verification() {
        let llm = ScriptedLlm::new(&[r#"{"output": "thanks, confirmed!", "actions": []}"#]);
        let agent = orchestrator(llm.clone(), full_registry(Vec::new()));

        let mut pending = complete_client("C-1");
        pending.verification.status = VerificationStatus::Pending;
        agent.merge_clients("s-1", &[pending], Some("web")).await.expect("seed roster");

        agent.handle_message("s-1", "Confirmed", "web").await.expect("turn");

        let clients = agent.sessions().get_clients("s-1").await.expect("clients");
        assert_eq!(clients[0].verification.status, VerificationStatus::Confirmed);
    }
}
