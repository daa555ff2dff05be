//! Consultation engine: the tool-calling fixed-point loop behind the chat
//! endpoint. One outer LLM call per turn, tool_result round-trips until the
//! model returns plain text or a terminal tool ends the turn.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::agent::tools::{
    self, LookupInput, RecommendationsInput, ResearchInput, StructuredQuestionInput,
    ASK_STRUCTURED_QUESTION, GENERATE_RECOMMENDATIONS, LOOKUP_EXISTING_CLIENT, RESEARCH_VENUE,
};
use crate::brief::{matcher, BriefInput, RecommendationBundle};
use crate::catalog::Catalog;
use crate::error::LlmError;
use crate::llm::{AnthropicClient, ContentBlock, Message, MessagesRequest, Role};
use crate::platform::accounts::AccountCache;
use crate::platform::PlatformClient;
use crate::search::SearchClient;
use crate::store::Store;

/// Iteration cap for one turn's tool loop.
const MAX_TOOL_ITERATIONS: usize = 8;
const TURN_MAX_TOKENS: u32 = 2048;
const FOLLOWUP_MAX_TOKENS: u32 = 1024;

/// System prompt for the consultation persona.
const CONSULTATION_PROMPT: &str = "You are a music design consultant for hospitality \
venues. You run a short, warm consultation to capture an atmospheric music brief: \
venue type, operating hours, target energy (1-10), vibes, vocal preference, genres \
to avoid, and anything about guests worth knowing. Ask one thing at a time using \
ask_structured_question; the card carries the question, so your accompanying text \
must never repeat it. Use lookup_existing_client early for SYB venues, and \
research_venue when the venue name and location could tell us about its style. \
When the brief is complete, call generate_recommendations. Stay concise and \
conversational; never mention tools or internal systems to the customer.";

/// One message as the chat client sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    pub role: String,
    pub content: String,
}

/// The structured-question blob echoed back by the client on the next turn.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingToolUse {
    pub tool_use_id: String,
    /// Opaque assistant content, returned verbatim.
    pub assistant_content: serde_json::Value,
    pub answer: String,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ClientMessage>,
    #[serde(default)]
    pub pending_tool_use: Option<PendingToolUse>,
}

/// SSE frames produced by the chat stream, §6.2 wire shapes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Text {
        content: String,
    },
    TextDelta {
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    StructuredQuestion {
        tool_use_id: String,
        assistant_content: serde_json::Value,
        #[serde(flatten)]
        question: StructuredQuestionInput,
    },
    #[serde(rename_all = "camelCase")]
    Recommendations {
        #[serde(flatten)]
        bundle: RecommendationBundle,
        extracted_brief: BriefInput,
    },
    Error {
        content: String,
    },
    Done,
}

/// Everything the engine needs to run one chat turn.
pub struct ConsultationEngine {
    pub llm: Arc<AnthropicClient>,
    pub catalog: Arc<Catalog>,
    pub search: Option<Arc<SearchClient>>,
    pub accounts: Option<Arc<AccountCache>>,
    pub platform: Option<Arc<PlatformClient>>,
    pub store: Option<Arc<Store>>,
}

/// Rebuild the conversation from the client's message history plus the
/// echoed structured-question round-trip.
pub fn reconstruct_messages(request: &ChatRequest) -> Vec<Message> {
    let mut messages: Vec<Message> = request
        .messages
        .iter()
        .filter(|m| !m.content.is_empty())
        .map(|m| match m.role.as_str() {
            "assistant" => Message::assistant(vec![ContentBlock::text(&m.content)]),
            _ => Message::user_text(&m.content),
        })
        .collect();

    if let Some(pending) = &request.pending_tool_use {
        let assistant_blocks: Vec<ContentBlock> =
            serde_json::from_value(pending.assistant_content.clone()).unwrap_or_default();
        if !assistant_blocks.is_empty() {
            messages.push(Message::assistant(assistant_blocks));
            messages.push(Message::user(vec![ContentBlock::tool_result(
                &pending.tool_use_id,
                format!("The customer selected: \"{}\"", pending.answer),
            )]));
        }
    }

    messages
}

impl ConsultationEngine {
    /// Run one chat turn, emitting SSE frames on `tx`. Every path ends with
    /// a single `Done`; send failures mean the client went away and the turn
    /// unwinds silently.
    pub async fn run_chat(&self, request: ChatRequest, tx: mpsc::Sender<ChatEvent>) {
        if let Err(e) = self.turn(&request, &tx).await {
            warn!(error = %e, "chat turn failed");
            let _ = tx
                .send(ChatEvent::Error {
                    content: "Something went wrong on our side. Please try again."
                        .to_string(),
                })
                .await;
        }
        let _ = tx.send(ChatEvent::Done).await;
    }

    async fn turn(
        &self,
        request: &ChatRequest,
        tx: &mpsc::Sender<ChatEvent>,
    ) -> Result<(), LlmError> {
        let mut messages = reconstruct_messages(request);
        if messages.is_empty() {
            messages.push(Message::user_text("Hello"));
        }

        for iteration in 0..MAX_TOOL_ITERATIONS {
            let response = self
                .llm
                .messages(MessagesRequest {
                    model: String::new(),
                    max_tokens: TURN_MAX_TOKENS,
                    system: Some(CONSULTATION_PROMPT.to_string()),
                    messages: messages.clone(),
                    tools: tools::tool_definitions(),
                })
                .await?;

            if !response.wants_tools() {
                let text = response.text();
                if !text.is_empty() {
                    let _ = tx.send(ChatEvent::Text { content: text }).await;
                }
                return Ok(());
            }

            let tool_uses: Vec<(String, String, serde_json::Value)> = response
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();
            debug!(
                iteration,
                tools = ?tool_uses.iter().map(|(_, n, _)| n.as_str()).collect::<Vec<_>>(),
                "tool round"
            );

            // generate_recommendations is terminal: emit the event, then
            // stream a follow-up narration that also carries any batched
            // non-terminal tool results.
            if let Some((gen_id, _, gen_input)) = tool_uses
                .iter()
                .find(|(_, name, _)| name == GENERATE_RECOMMENDATIONS)
            {
                return self
                    .finish_with_recommendations(
                        tx,
                        messages,
                        response.content.clone(),
                        gen_id,
                        gen_input,
                        &tool_uses,
                    )
                    .await;
            }

            // ask_structured_question is terminal: relay the card and the
            // opaque assistant content for the client to echo back.
            if let Some((id, _, input)) = tool_uses
                .iter()
                .find(|(_, name, _)| name == ASK_STRUCTURED_QUESTION)
            {
                let question: StructuredQuestionInput =
                    serde_json::from_value(input.clone()).unwrap_or_default();
                let intro = response.text();
                if !intro.is_empty() {
                    let _ = tx.send(ChatEvent::Text { content: intro }).await;
                }
                let _ = tx
                    .send(ChatEvent::StructuredQuestion {
                        tool_use_id: id.clone(),
                        assistant_content: serde_json::to_value(&response.content)
                            .unwrap_or(serde_json::Value::Null),
                        question,
                    })
                    .await;
                return Ok(());
            }

            // Non-terminal tools fan out in parallel; results feed the next
            // LLM call.
            let results = join_all(
                tool_uses
                    .iter()
                    .map(|(id, name, input)| self.execute_tool(id, name, input)),
            )
            .await;

            messages.push(Message::assistant(response.content.clone()));
            messages.push(Message::user(
                results
                    .into_iter()
                    .map(|(id, content)| ContentBlock::tool_result(id, content))
                    .collect(),
            ));
        }

        Err(LlmError::InvalidResponse(format!(
            "exceeded {MAX_TOOL_ITERATIONS} tool iterations"
        )))
    }

    async fn execute_tool(
        &self,
        id: &str,
        name: &str,
        input: &serde_json::Value,
    ) -> (String, String) {
        let content = match name {
            RESEARCH_VENUE => {
                let input: ResearchInput =
                    serde_json::from_value(input.clone()).unwrap_or_default();
                tools::execute_research(self.search.as_ref(), &input).await
            }
            LOOKUP_EXISTING_CLIENT => {
                let input: LookupInput =
                    serde_json::from_value(input.clone()).unwrap_or_default();
                tools::execute_lookup(
                    self.accounts.as_ref(),
                    self.platform.as_ref(),
                    self.store.as_ref(),
                    &input,
                )
                .await
            }
            other => format!("Unknown tool: {other}"),
        };
        (id.to_string(), content)
    }

    async fn finish_with_recommendations(
        &self,
        tx: &mpsc::Sender<ChatEvent>,
        mut messages: Vec<Message>,
        assistant_content: Vec<ContentBlock>,
        gen_id: &str,
        gen_input: &serde_json::Value,
        tool_uses: &[(String, String, serde_json::Value)],
    ) -> Result<(), LlmError> {
        let input: RecommendationsInput =
            serde_json::from_value(gen_input.clone()).unwrap_or_default();
        let zones = if input.multi_zone { input.zones.clone() } else { Vec::new() };
        let bundle = matcher::build_bundle(
            &self.catalog,
            &input.brief,
            &zones,
            input.weekend_mode.as_ref(),
        );

        let _ = tx
            .send(ChatEvent::Recommendations {
                bundle: bundle.clone(),
                extracted_brief: input.brief.clone(),
            })
            .await;

        // Every tool_use in the assistant turn needs a result in the
        // follow-up message, the batched non-terminal ones included.
        let mut result_blocks = Vec::new();
        for (id, name, tool_input) in tool_uses {
            let content = if id == gen_id {
                summarize_bundle(&bundle)
            } else if name == ASK_STRUCTURED_QUESTION {
                "Question skipped: recommendations were generated this turn.".to_string()
            } else {
                self.execute_tool(id, name, tool_input).await.1
            };
            result_blocks.push(ContentBlock::tool_result(id, content));
        }

        messages.push(Message::assistant(assistant_content));
        messages.push(Message {
            role: Role::User,
            content: result_blocks,
        });

        // Stream the narration token by token.
        let mut rx = self
            .llm
            .stream_text(MessagesRequest {
                model: String::new(),
                max_tokens: FOLLOWUP_MAX_TOKENS,
                system: Some(CONSULTATION_PROMPT.to_string()),
                messages,
                tools: Vec::new(),
            })
            .await?;
        while let Some(delta) = rx.recv().await {
            match delta {
                Ok(text) => {
                    if tx.send(ChatEvent::TextDelta { content: text }).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Summary the follow-up call narrates from.
fn summarize_bundle(bundle: &RecommendationBundle) -> String {
    let daypart_labels = match &bundle.dayparts {
        crate::brief::Dayparts::Single(parts) => parts
            .iter()
            .map(|p| p.label.clone())
            .collect::<Vec<_>>()
            .join("; "),
        crate::brief::Dayparts::Multi(map) => map
            .iter()
            .map(|(zone, parts)| {
                format!(
                    "{zone}: {}",
                    parts
                        .iter()
                        .map(|p| p.label.clone())
                        .collect::<Vec<_>>()
                        .join("; ")
                )
            })
            .collect::<Vec<_>>()
            .join(" | "),
    };
    let top: Vec<String> = bundle
        .recommendations
        .iter()
        .take(6)
        .map(|r| format!("{} ({}, {}%)", r.playlist_name, r.daypart, r.match_score))
        .collect();
    format!(
        "Recommendations generated and already shown to the customer as cards.\n\
         Dayparts: {daypart_labels}\nTop picks: {}\n{}\n\
         Present this conversationally in 2-3 sentences: explain how the energy \
         arcs across the day and invite them to tap the playlists they like. Do \
         not list every playlist.",
        top.join(", "),
        bundle.designer_notes
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_events_serialize_to_wire_shapes() {
        let event = ChatEvent::StructuredQuestion {
            tool_use_id: "tu_1".into(),
            assistant_content: serde_json::json!([{"type": "text", "text": "hi"}]),
            question: StructuredQuestionInput {
                question: "Which vibe?".into(),
                options: vec!["warm".into(), "zen".into()],
                ..Default::default()
            },
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "structured_question");
        assert_eq!(v["toolUseId"], "tu_1");
        assert!(v["assistantContent"].is_array());
        assert_eq!(v["options"][1], "zen");

        let done = serde_json::to_value(ChatEvent::Done).unwrap();
        assert_eq!(done["type"], "done");

        let delta = serde_json::to_value(ChatEvent::TextDelta {
            content: "to".into(),
        })
        .unwrap();
        assert_eq!(delta["type"], "text_delta");
    }

    #[test]
    fn reconstruction_appends_the_pending_round_trip() {
        let request = ChatRequest {
            messages: vec![
                ClientMessage {
                    role: "user".into(),
                    content: "Hi, I run a rooftop bar".into(),
                },
                ClientMessage {
                    role: "assistant".into(),
                    content: "Lovely!".into(),
                },
            ],
            pending_tool_use: Some(PendingToolUse {
                tool_use_id: "tu_7".into(),
                assistant_content: serde_json::json!([
                    {"type": "text", "text": "One quick question."},
                    {"type": "tool_use", "id": "tu_7", "name": "ask_structured_question",
                     "input": {"question": "Energy?", "options": ["Low", "High"]}}
                ]),
                answer: "High".into(),
            }),
        };

        let messages = reconstruct_messages(&request);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].role, Role::Assistant);
        assert!(matches!(
            &messages[2].content[1],
            ContentBlock::ToolUse { id, .. } if id == "tu_7"
        ));
        match &messages[3].content[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => {
                assert_eq!(tool_use_id, "tu_7");
                assert_eq!(content, "The customer selected: \"High\"");
            }
            other => panic!("expected tool_result, got {other:?}"),
        }
    }

    #[test]
    fn malformed_pending_blob_is_dropped() {
        let request = ChatRequest {
            messages: vec![ClientMessage {
                role: "user".into(),
                content: "Hello".into(),
            }],
            pending_tool_use: Some(PendingToolUse {
                tool_use_id: "tu_1".into(),
                assistant_content: serde_json::json!("not-an-array"),
                answer: "x".into(),
            }),
        };
        assert_eq!(reconstruct_messages(&request).len(), 1);
    }

    #[test]
    fn bundle_summary_mentions_dayparts_and_notes() {
        let catalog = Catalog::from_playlists(vec![crate::catalog::Playlist {
            id: "p1".into(),
            name: "Deep House Sunset".into(),
            description: "deep house".into(),
            categories: ["bar"].iter().map(|s| s.to_string()).collect(),
            syb_id: None,
        }])
        .unwrap();
        let brief = BriefInput {
            venue_type: "bar-lounge".into(),
            vibes: vec!["trendy".into()],
            energy: 7,
            hours: "18:00-00:00".into(),
            ..Default::default()
        };
        let bundle = matcher::build_bundle(&catalog, &brief, &[], None);
        let summary = summarize_bundle(&bundle);
        assert!(summary.contains("Dayparts:"));
        assert!(summary.contains("conversationally"));
    }
}
