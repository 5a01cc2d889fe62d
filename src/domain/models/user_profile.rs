use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Generates `as_str`, `label`, `Display` and `FromStr` for the profile enums.
/// Labels are the wire value with underscores turned into spaces.
macro_rules! profile_enum {
    ($name:ident { $($variant:ident => $value:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }

            pub fn label(&self) -> String {
                self.as_str().replace('_', " ")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
                match normalized.as_str() {
                    $($value => Ok($name::$variant),)+
                    unknown => Err(DomainError::invalid_input(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        unknown
                    ))),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Newcomer,
    Aware,
    #[default]
    Beginner,
    Practitioner,
    Advanced,
}

profile_enum!(ExperienceLevel {
    Newcomer => "newcomer",
    Aware => "aware",
    Beginner => "beginner",
    Practitioner => "practitioner",
    Advanced => "advanced",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Book {
    #[serde(rename = "transurfing_1_5")]
    Transurfing1To5,
    Tufti,
    #[serde(rename = "none")]
    NotYet,
    Other,
}

profile_enum!(Book {
    Transurfing1To5 => "transurfing_1_5",
    Tufti => "tufti",
    NotYet => "none",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RealityFocus {
    #[default]
    Purpose,
    LifeChanges,
    Relationships,
    Career,
    Balance,
    Other,
}

profile_enum!(RealityFocus {
    Purpose => "purpose",
    LifeChanges => "life_changes",
    Relationships => "relationships",
    Career => "career",
    Balance => "balance",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransformationIntent {
    #[default]
    Understanding,
    SpecificSituations,
    Practice,
    Awareness,
    BreakingPatterns,
    Other,
}

profile_enum!(TransformationIntent {
    Understanding => "understanding",
    SpecificSituations => "specific_situations",
    Practice => "practice",
    Awareness => "awareness",
    BreakingPatterns => "breaking_patterns",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_notifications")]
    pub notifications: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            notifications: default_notifications(),
        }
    }
}

fn default_notifications() -> bool {
    true
}

/// Who the user is, as captured by onboarding. Read-only for the lifetime of
/// a chat session; the session trusts its shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    name: String,
    #[serde(default, rename = "rtExperience")]
    experience: ExperienceLevel,
    #[serde(default)]
    books_read: BTreeSet<Book>,
    #[serde(default)]
    reality_focus: RealityFocus,
    #[serde(default)]
    focus_details: String,
    #[serde(default)]
    transformation_intent: TransformationIntent,
    #[serde(default)]
    intent_details: String,
    #[serde(default)]
    preferences: Preferences,
}

impl UserProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            experience: ExperienceLevel::default(),
            books_read: BTreeSet::new(),
            reality_focus: RealityFocus::default(),
            focus_details: String::new(),
            transformation_intent: TransformationIntent::default(),
            intent_details: String::new(),
            preferences: Preferences::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_experience(mut self, experience: ExperienceLevel) -> Self {
        self.experience = experience;
        self
    }

    pub fn with_books(mut self, books: impl IntoIterator<Item = Book>) -> Self {
        self.books_read = books.into_iter().collect();
        self
    }

    pub fn with_reality_focus(mut self, focus: RealityFocus) -> Self {
        self.reality_focus = focus;
        self
    }

    pub fn with_focus_details(mut self, details: impl Into<String>) -> Self {
        self.focus_details = details.into();
        self
    }

    pub fn with_transformation_intent(mut self, intent: TransformationIntent) -> Self {
        self.transformation_intent = intent;
        self
    }

    pub fn with_intent_details(mut self, details: impl Into<String>) -> Self {
        self.intent_details = details.into();
        self
    }

    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn experience(&self) -> ExperienceLevel {
        self.experience
    }

    pub fn books_read(&self) -> &BTreeSet<Book> {
        &self.books_read
    }

    pub fn reality_focus(&self) -> RealityFocus {
        self.reality_focus
    }

    pub fn focus_details(&self) -> &str {
        &self.focus_details
    }

    pub fn transformation_intent(&self) -> TransformationIntent {
        self.transformation_intent
    }

    pub fn intent_details(&self) -> &str {
        &self.intent_details
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }
}
