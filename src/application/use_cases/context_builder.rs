use crate::domain::{Message, Sender, Turn, UserProfile};

/// Persona instruction that opens every context window.
pub const TUFTI_SYSTEM_PROMPT: &str = "\
You are Tufti the Priestess, guide of the Reality Film. You speak to the user as \
a playful, slightly theatrical director who has seen every scene of their film.

Rules:
1. Address the user warmly, now and then as \"my dear\".
2. Ground your guidance in Reality Transurfing: the film, the frames, the plait \
   of intention, pendulums, importance and the mirror of the world.
3. Remind the user to wake up inside the scene and to compose the next frame \
   instead of reacting to the current one.
4. Keep answers practical: end with one small action the user can take today.
5. Never claim certainty about the future, and never give medical, legal or \
   financial advice.";

/// Default number of trailing history messages kept in the context window.
pub const DEFAULT_MAX_HISTORY_TURNS: usize = 40;

/// Assembles the ordered turns submitted for one completion:
/// persona, optional profile summary, trailing history, then the new user turn.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    max_history_turns: Option<usize>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            max_history_turns: Some(DEFAULT_MAX_HISTORY_TURNS),
        }
    }

    /// `None` keeps the whole history.
    pub fn with_max_history_turns(mut self, max: Option<usize>) -> Self {
        self.max_history_turns = max;
        self
    }

    pub fn max_history_turns(&self) -> Option<usize> {
        self.max_history_turns
    }

    pub fn build(
        &self,
        profile: Option<&UserProfile>,
        history: &[Message],
        new_text: &str,
    ) -> Vec<Turn> {
        let window = match self.max_history_turns {
            Some(max) if history.len() > max => &history[history.len() - max..],
            _ => history,
        };

        let mut turns = Vec::with_capacity(window.len() + 3);
        turns.push(Turn::system(TUFTI_SYSTEM_PROMPT));

        if let Some(profile) = profile {
            turns.push(Turn::system(profile_summary(profile)));
        }

        // The backend only knows user/assistant in the conversation body;
        // system-origin history (welcome, apologies) is replayed as assistant.
        turns.extend(window.iter().map(|message| match message.sender() {
            Sender::User => Turn::user(message.text()),
            Sender::Assistant | Sender::System => Turn::assistant(message.text()),
        }));

        turns.push(Turn::user(new_text));
        turns
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn profile_summary(profile: &UserProfile) -> String {
    let mut summary = format!(
        "Current user: {}\nExperience level: {}\nFocus area: {}\nTransformation goal: {}",
        profile.name(),
        profile.experience().label(),
        profile.reality_focus().label(),
        profile.transformation_intent().label(),
    );

    if !profile.focus_details().trim().is_empty() {
        summary.push_str(&format!("\nFocus details: {}", profile.focus_details().trim()));
    }
    if !profile.intent_details().trim().is_empty() {
        summary.push_str(&format!("\nGoal details: {}", profile.intent_details().trim()));
    }

    summary
}
