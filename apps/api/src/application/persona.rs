use strum::{AsRefStr, Display, EnumString};
use switchboard_types::{ChatMessage, Role};

/// Tone of the system prompt prepended to a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum PersonaTag {
    #[default]
    Default,
    Friendly,
    Professional,
    Concise,
    Creative,
}

const BASE: &str = "You are Switchboard, an AI assistant.";

const TEMPLATES: &[(PersonaTag, &str)] = &[
    (
        PersonaTag::Default,
        "Answer helpfully and accurately. Say so when you are unsure.",
    ),
    (
        PersonaTag::Friendly,
        "Be warm and conversational. Keep explanations approachable and encouraging.",
    ),
    (
        PersonaTag::Professional,
        "Use a precise, formal tone. Structure longer answers with headings or lists.",
    ),
    (
        PersonaTag::Concise,
        "Answer in as few words as possible. Skip pleasantries and restating the question.",
    ),
    (
        PersonaTag::Creative,
        "Be imaginative and expressive. Offer unexpected angles when they help.",
    ),
];

pub fn build_persona(tag: PersonaTag) -> String {
    let template = TEMPLATES
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, template)| *template)
        .unwrap_or(TEMPLATES[0].1);
    format!("{BASE} {template}")
}

/// Prepend the persona unless the caller already set a system prompt.
pub fn with_persona(history: &[ChatMessage], tag: PersonaTag) -> Vec<ChatMessage> {
    if history.iter().any(|m| m.role == Role::System) {
        return history.to_vec();
    }

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(build_persona(tag)));
    messages.extend_from_slice(history);
    messages
}
