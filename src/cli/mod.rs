use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::domain::{
    Book, DomainError, ExperienceLevel, RealityFocus, TransformationIntent, UserProfile,
};

/// Who is chatting. Either a JSON profile from onboarding, inline flags, or
/// both (flags override the file).
#[derive(Args, Debug, Clone, Default)]
pub struct ProfileArgs {
    /// JSON file with a completed onboarding profile
    #[arg(long)]
    pub profile: Option<PathBuf>,

    #[arg(long)]
    pub name: Option<String>,

    /// newcomer, aware, beginner, practitioner or advanced
    #[arg(long)]
    pub experience: Option<ExperienceLevel>,

    /// purpose, life_changes, relationships, career, balance or other
    #[arg(long)]
    pub focus: Option<RealityFocus>,

    #[arg(long)]
    pub focus_details: Option<String>,

    /// understanding, specific_situations, practice, awareness, breaking_patterns or other
    #[arg(long)]
    pub intent: Option<TransformationIntent>,

    #[arg(long)]
    pub intent_details: Option<String>,

    /// Books read (repeatable): transurfing_1_5, tufti, none or other
    #[arg(long = "book")]
    pub books: Vec<Book>,
}

impl ProfileArgs {
    pub async fn resolve(&self) -> Result<UserProfile, DomainError> {
        let base = match &self.profile {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path).await?;
                serde_json::from_str::<UserProfile>(&raw).map_err(|e| {
                    DomainError::invalid_input(format!(
                        "invalid profile file {}: {e}",
                        path.display()
                    ))
                })?
            }
            None => {
                let name = self.name.as_deref().ok_or_else(|| {
                    DomainError::invalid_input("either --profile or --name is required")
                })?;
                UserProfile::new(name)
            }
        };

        Ok(self.apply_overrides(base))
    }

    fn apply_overrides(&self, mut profile: UserProfile) -> UserProfile {
        if let Some(name) = &self.name {
            profile = profile.with_name(name.as_str());
        }
        if let Some(experience) = self.experience {
            profile = profile.with_experience(experience);
        }
        if let Some(focus) = self.focus {
            profile = profile.with_reality_focus(focus);
        }
        if let Some(details) = &self.focus_details {
            profile = profile.with_focus_details(details.as_str());
        }
        if let Some(intent) = self.intent {
            profile = profile.with_transformation_intent(intent);
        }
        if let Some(details) = &self.intent_details {
            profile = profile.with_intent_details(details.as_str());
        }
        if !self.books.is_empty() {
            profile = profile.with_books(self.books.iter().copied());
        }
        profile
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive conversation with Tufti
    Chat {
        #[command(flatten)]
        profile: ProfileArgs,

        /// Wait for complete replies instead of streaming them
        #[arg(long)]
        no_stream: bool,
    },

    /// Ask a single question and print the reply
    Ask {
        text: String,

        #[command(flatten)]
        profile: ProfileArgs,

        #[arg(long)]
        stream: bool,
    },

    /// Validate the backend configuration and show session settings
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_requires_a_name() {
        let err = ProfileArgs::default().resolve().await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_flags_override_profile_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(
            &path,
            r#"{"name": "Alice", "rtExperience": "advanced", "transformationIntent": "practice"}"#,
        )
        .unwrap();

        let args = ProfileArgs {
            profile: Some(path),
            intent: Some(TransformationIntent::Awareness),
            ..ProfileArgs::default()
        };
        let profile = args.resolve().await.unwrap();

        assert_eq!(profile.name(), "Alice");
        assert_eq!(profile.experience(), ExperienceLevel::Advanced);
        assert_eq!(
            profile.transformation_intent(),
            TransformationIntent::Awareness
        );
    }
}
