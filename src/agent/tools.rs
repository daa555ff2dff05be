//! The four consultation tools: definitions the model sees, typed inputs,
//! and executors for the two non-terminal ones.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::brief::{BriefInput, ZoneSpec};
use crate::llm::ToolDefinition;
use crate::platform::accounts::AccountCache;
use crate::platform::PlatformClient;
use crate::search::SearchClient;
use crate::store::Store;

pub const ASK_STRUCTURED_QUESTION: &str = "ask_structured_question";
pub const RESEARCH_VENUE: &str = "research_venue";
pub const LOOKUP_EXISTING_CLIENT: &str = "lookup_existing_client";
pub const GENERATE_RECOMMENDATIONS: &str = "generate_recommendations";

/// Terminal tools end the turn instead of feeding a tool_result back.
pub fn is_terminal(name: &str) -> bool {
    matches!(name, ASK_STRUCTURED_QUESTION | GENERATE_RECOMMENDATIONS)
}

/// Input of `ask_structured_question`, relayed verbatim to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructuredQuestionInput {
    pub question: String,
    pub options: Vec<String>,
    pub allow_custom: bool,
    pub allow_skip: bool,
    pub allow_multiple: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<u32>,
}

impl Default for StructuredQuestionInput {
    fn default() -> Self {
        Self {
            question: String::new(),
            options: Vec::new(),
            allow_custom: true,
            allow_skip: false,
            allow_multiple: false,
            question_index: None,
            total_questions: None,
        }
    }
}

/// Input of `research_venue`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResearchInput {
    pub queries: Vec<String>,
}

/// Input of `lookup_existing_client`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LookupInput {
    pub venue_name: String,
    pub product: String,
}

/// Input of `generate_recommendations`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendationsInput {
    #[serde(flatten)]
    pub brief: BriefInput,
    pub multi_zone: bool,
    pub zones: Vec<ZoneSpec>,
    pub weekend_mode: Option<ZoneSpec>,
}

/// Tool definitions advertised to the model.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: ASK_STRUCTURED_QUESTION.into(),
            description: "Present one multiple-choice question card to the customer. \
                The card IS the question: never repeat the question text in your \
                accompanying message. This ends your turn."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string" },
                    "options": { "type": "array", "items": { "type": "string" } },
                    "allowCustom": { "type": "boolean" },
                    "allowSkip": { "type": "boolean" },
                    "allowMultiple": { "type": "boolean" },
                    "questionIndex": { "type": "integer" },
                    "totalQuestions": { "type": "integer" }
                },
                "required": ["question", "options"]
            }),
        },
        ToolDefinition {
            name: RESEARCH_VENUE.into(),
            description: "Research the venue on the web (location, style, reviews, \
                competitors). Provide up to 4 focused search queries."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "queries": {
                        "type": "array",
                        "items": { "type": "string" },
                        "maxItems": 4
                    }
                },
                "required": ["queries"]
            }),
        },
        ToolDefinition {
            name: LOOKUP_EXISTING_CLIENT.into(),
            description: "Check whether this venue already has an account with us. \
                Only meaningful for the SYB product."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "venueName": { "type": "string" },
                    "product": { "type": "string", "enum": ["syb", "beatbreeze"] }
                },
                "required": ["venueName"]
            }),
        },
        ToolDefinition {
            name: GENERATE_RECOMMENDATIONS.into(),
            description: "Generate the daypart schedule and playlist recommendations \
                from the collected brief. Call once the brief is complete. This ends \
                your turn."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "venueType": { "type": "string" },
                    "vibes": { "type": "array", "items": { "type": "string" } },
                    "energy": { "type": "integer", "minimum": 1, "maximum": 10 },
                    "hours": { "type": "string" },
                    "vocals": { "type": "string" },
                    "avoidList": { "type": "string" },
                    "genreHints": { "type": "array", "items": { "type": "string" } },
                    "multiZone": { "type": "boolean" },
                    "zones": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string" },
                                "hours": { "type": "string" },
                                "energy": { "type": "integer" },
                                "vibes": { "type": "array", "items": { "type": "string" } },
                                "genreHints": { "type": "array", "items": { "type": "string" } }
                            },
                            "required": ["name"]
                        }
                    },
                    "weekendMode": {
                        "type": "object",
                        "properties": {
                            "hours": { "type": "string" },
                            "energy": { "type": "integer" },
                            "vibes": { "type": "array", "items": { "type": "string" } }
                        }
                    }
                },
                "required": ["venueType", "vibes", "energy"]
            }),
        },
    ]
}

/// Run the research tool. Never fatal: an unconfigured or failing search
/// becomes a benign directive.
pub async fn execute_research(
    search: Option<&Arc<SearchClient>>,
    input: &ResearchInput,
) -> String {
    let Some(search) = search else {
        return "No research available. Continue the consultation without research."
            .to_string();
    };
    let summary = search.research(&input.queries).await;
    if summary.is_empty() {
        return "No research results found. Continue the consultation without research."
            .to_string();
    }
    format!(
        "{summary}\n\nDraw a short design conclusion from this research for the \
         music direction. Do not repeat the facts back to the customer."
    )
}

/// Run the existing-client lookup. Never fatal: every failure path collapses
/// into a "continue as new client" directive.
pub async fn execute_lookup(
    accounts: Option<&Arc<AccountCache>>,
    platform: Option<&Arc<PlatformClient>>,
    store: Option<&Arc<Store>>,
    input: &LookupInput,
) -> String {
    if !input.product.is_empty() && input.product != "syb" {
        return "Account lookup only applies to SYB. Continue as a new client."
            .to_string();
    }

    let matches = match accounts {
        Some(cache) => match cache.search(&input.venue_name).await {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "account lookup failed");
                return "Account lookup unavailable. Continue as a new client without \
                    mentioning the lookup."
                    .to_string();
            }
        },
        None => Vec::new(),
    };

    match matches.len() {
        1 => {
            let account = &matches[0];
            let zones = match platform {
                Some(p) => p.zones(&account.id).await.unwrap_or_default(),
                None => Vec::new(),
            };
            let zone_list = if zones.is_empty() {
                "(no zones found)".to_string()
            } else {
                zones
                    .iter()
                    .map(|z| z.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!(
                "EXISTING CLIENT FOUND.\nAccount: {} (accountId: {})\nZones: {}\n\
                 Welcome them back warmly and confirm this is their venue. Carry the \
                 accountId through to the final brief.",
                account.business_name, account.id, zone_list
            )
        }
        2..=5 => {
            let mapping = matches
                .iter()
                .map(|a| format!("- \"{}\" => accountId: {}", a.business_name, a.id))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "ACCOUNT ID MAPPING — multiple possible accounts:\n{mapping}\n\
                 Present a structured question asking which of these is their venue, \
                 then echo the matching accountId exactly."
            )
        }
        n if n >= 6 => "Too many similar accounts found. Ask the customer to copy the \
            exact business name as registered with us."
            .to_string(),
        _ => {
            // Fall back to local history before declaring a new client.
            if let Some(store) = store {
                if let Ok(Some(venue)) = store.venues.get(&input.venue_name) {
                    return format!(
                        "No platform account found, but we have local history for \
                         \"{}\" ({} approved briefs). Treat them as a returning venue.",
                        venue.venue_name, venue.approved_brief_count
                    );
                }
            }
            "No existing account found. This is a new client; continue the \
             consultation without mentioning the lookup."
                .to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_tools_are_defined() {
        let defs = tool_definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                ASK_STRUCTURED_QUESTION,
                RESEARCH_VENUE,
                LOOKUP_EXISTING_CLIENT,
                GENERATE_RECOMMENDATIONS
            ]
        );
    }

    #[test]
    fn terminal_tools_are_the_two_turn_enders() {
        assert!(is_terminal(ASK_STRUCTURED_QUESTION));
        assert!(is_terminal(GENERATE_RECOMMENDATIONS));
        assert!(!is_terminal(RESEARCH_VENUE));
        assert!(!is_terminal(LOOKUP_EXISTING_CLIENT));
    }

    #[test]
    fn question_input_parses_from_camel_case() {
        let input: StructuredQuestionInput = serde_json::from_value(json!({
            "question": "What energy level fits your space?",
            "options": ["Calm", "Balanced", "Lively"],
            "allowMultiple": false,
            "questionIndex": 2,
            "totalQuestions": 6
        }))
        .unwrap();
        assert_eq!(input.options.len(), 3);
        assert_eq!(input.question_index, Some(2));
        assert!(input.allow_custom); // default
    }

    #[test]
    fn recommendations_input_flattens_brief_fields() {
        let input: RecommendationsInput = serde_json::from_value(json!({
            "venueType": "bar-lounge",
            "vibes": ["sophisticated"],
            "energy": 7,
            "hours": "17:00-02:00",
            "multiZone": true,
            "zones": [{"name": "Rooftop", "energy": 8}]
        }))
        .unwrap();
        assert_eq!(input.brief.venue_type, "bar-lounge");
        assert_eq!(input.brief.energy, 7);
        assert!(input.multi_zone);
        assert_eq!(input.zones[0].name, "Rooftop");
        assert_eq!(input.zones[0].energy, Some(8));
    }

    #[tokio::test]
    async fn research_without_a_client_is_benign() {
        let out = execute_research(None, &ResearchInput { queries: vec!["q".into()] }).await;
        assert!(out.contains("without research"));
    }

    #[tokio::test]
    async fn lookup_for_beatbreeze_short_circuits() {
        let out = execute_lookup(
            None,
            None,
            None,
            &LookupInput {
                venue_name: "Cafe X".into(),
                product: "beatbreeze".into(),
            },
        )
        .await;
        assert!(out.contains("new client"));
    }

    #[tokio::test]
    async fn lookup_with_nothing_configured_is_new_client() {
        let out = execute_lookup(
            None,
            None,
            None,
            &LookupInput {
                venue_name: "Cafe X".into(),
                product: "syb".into(),
            },
        )
        .await;
        assert!(out.contains("new client"));
    }
}
