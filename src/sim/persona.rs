//! Synthetic user personas for simulation.
//!
//! A persona bundles a display name, a natural-language behavior prompt,
//! and the same coaching fields a real user profile carries. The behavior
//! prompt drives an LLM role-playing the persona; the coaching fields feed
//! the coach prompt exactly as a real profile would.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Instruction preamble for the persona role-play completion.
const ROLE_PLAY_RULES: &str = r#"Stay in character for the whole conversation.
Speak in first person, as yourself. Keep each reply to one to three sentences,
the way a real person types in a chat. Never mention that you are an AI or
that this is a simulation. React to what the coach actually said rather than
repeating your opening concern."#;

/// Configuration describing a synthetic user.
#[derive(Debug, Clone)]
pub struct Persona {
    pub id: Uuid,
    pub name: String,
    /// Natural-language description of how this persona behaves in chat.
    pub prompt: String,
    pub tension_type: Option<String>,
    pub communication_style: Option<String>,
    pub focus_area: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Persona {
    /// Create a persona with just a name and behavior prompt.
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            prompt: prompt.into(),
            tension_type: None,
            communication_style: None,
            focus_area: None,
            created_at: Utc::now(),
        }
    }

    /// System prompt for the completion that plays this persona's next turn.
    pub fn system_prompt(&self, topic: &str) -> String {
        format!(
            "You are role-playing {name}, a person talking to their personal coach.\n\n\
             About {name}: {prompt}\n\n\
             The conversation topic is \"{topic}\".\n\n{rules}",
            name = self.name,
            prompt = self.prompt,
            topic = topic,
            rules = ROLE_PLAY_RULES,
        )
    }
}

/// Preset personas seeded into the simulator.
///
/// Names are stable identifiers: seeding skips any preset whose name
/// already exists, so edits made through the dashboard survive re-seeding.
pub fn presets() -> Vec<Persona> {
    vec![
        preset(
            "Overwhelmed Olivia",
            "Olivia is a mid-career product manager juggling a heavy workload and \
             two young kids. She opens up quickly, talks in long bursts, and tends \
             to list everything on her plate before getting to what is actually \
             bothering her. She responds well to being asked to pick one thing.",
            "overwhelm",
            "expressive",
            "work-life balance",
        ),
        preset(
            "Stoic Sam",
            "Sam is an engineer who answers in short, factual sentences and \
             deflects questions about feelings with jokes or a subject change. He \
             only opens up after the coach reflects something specific back to \
             him. Pushing too hard makes him go quiet.",
            "avoidance",
            "reserved",
            "emotional expression",
        ),
        preset(
            "People-Pleaser Priya",
            "Priya says yes to everyone at work and resents it afterwards. She \
             apologizes for taking up the coach's time, softens every complaint \
             with a compliment, and asks for permission before disagreeing. She \
             lights up when the coach names the pattern directly.",
            "boundaries",
            "apologetic",
            "saying no",
        ),
        preset(
            "Spiraling Devon",
            "Devon is deciding whether to leave a stable job for a startup and \
             has been going in circles for weeks. Every reply revisits the same \
             pros and cons with new hypotheticals. He asks the coach to just tell \
             him what to do, then argues with whatever comes back.",
            "rumination",
            "verbose",
            "decision making",
        ),
    ]
}

fn preset(
    name: &str,
    prompt: &str,
    tension_type: &str,
    communication_style: &str,
    focus_area: &str,
) -> Persona {
    Persona {
        id: Uuid::new_v4(),
        name: name.to_string(),
        prompt: prompt.to_string(),
        tension_type: Some(tension_type.to_string()),
        communication_style: Some(communication_style.to_string()),
        focus_area: Some(focus_area.to_string()),
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn preset_names_are_unique() {
        let personas = presets();
        let names: HashSet<_> = personas.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names.len(), personas.len());
    }

    #[test]
    fn presets_carry_coaching_fields() {
        for persona in presets() {
            assert!(!persona.prompt.is_empty(), "{} has no prompt", persona.name);
            assert!(persona.tension_type.is_some());
            assert!(persona.communication_style.is_some());
            assert!(persona.focus_area.is_some());
        }
    }

    #[test]
    fn system_prompt_mentions_name_and_topic() {
        let persona = Persona::new("Test Tina", "Tina is brief.");
        let prompt = persona.system_prompt("career change");
        assert!(prompt.contains("Test Tina"));
        assert!(prompt.contains("career change"));
        assert!(prompt.contains("first person"));
    }
}
