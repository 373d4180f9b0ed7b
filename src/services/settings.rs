use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::Result;
use crate::models::AiSettings;
use crate::utils::{read_json, write_json_atomic};

/// Built-in rewrite instructions, used when the stored prompt is too short to be meaningful.
pub const DEFAULT_REWRITE_INSTRUCTIONS: &str = "\
Rewrite the following passage with a focus on enhancing its novel-like qualities.
1. Rewrite the contents in shorter sentences but don't summarize the paragraphs.
2. Rewrite paragraph by paragraph. Do not remove any paragraphs. Keep dialogues in dialogue format and just rephrase for better comprehension. Replace with commonly used words if necessary. Do not change the names of the characters.
3. Shift from 'telling' to 'showing' by illustrating emotions, actions, and intentions through character behavior and dialogue.
4. Make the dialogue natural, engaging, and reflective of the characters' personalities, with subtle hints of subtext.
5. Adjust the style and voice to align with the intended tone, such as lyrical, dark, or whimsical.
6. Ensure the stakes and conflict feel more gripping and emotionally charged.";

const MIN_PROMPT_LEN: usize = 10;

impl AiSettings {
    pub fn effective_prompt(&self) -> &str {
        if self.prompt.trim().chars().count() < MIN_PROMPT_LEN {
            DEFAULT_REWRITE_INSTRUCTIONS
        } else {
            &self.prompt
        }
    }
}

/// File-backed AI settings. Every `load` reads the file again; there is no
/// in-memory copy to go stale.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> AiSettings {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return AiSettings::default();
        }

        match read_json(&self.path).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load AI settings from {}: {}", self.path.display(), e);
                AiSettings::default()
            }
        }
    }

    pub async fn save(&self, settings: &AiSettings) -> Result<()> {
        write_json_atomic(&self.path, settings).await?;
        info!(enabled = settings.enabled, "AI settings saved");
        Ok(())
    }

    /// Applies a partial update; an omitted prompt keeps the stored one.
    pub async fn update(&self, enabled: bool, prompt: Option<String>) -> Result<AiSettings> {
        let current = self.load().await;
        let settings = AiSettings {
            enabled,
            prompt: prompt.unwrap_or(current.prompt),
        };
        self.save(&settings).await?;
        Ok(settings)
    }
}
