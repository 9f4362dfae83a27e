use std::path::Path;

use serde::Deserialize;

use crate::store::LastMessageTieBreak;

/// Optional knobs read from `inbox_config.json` in the data dir. Missing
/// file or unknown keys fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct InboxConfig {
    /// "strictly-newer" (default, observed behavior) or "newer-or-equal".
    /// Governs whether a message whose send time equals the watermark becomes
    /// the conversation preview.
    pub(crate) last_message_tie_break: Option<String>,
    // Used to keep tests deterministic and offline.
    pub(crate) disable_network: Option<bool>,
}

impl InboxConfig {
    pub(crate) fn tie_break(&self) -> LastMessageTieBreak {
        match self.last_message_tie_break.as_deref() {
            Some("newer-or-equal") => LastMessageTieBreak::NewerOrEqual,
            _ => LastMessageTieBreak::StrictlyNewer,
        }
    }
}

pub(crate) fn load_inbox_config(data_dir: &str) -> InboxConfig {
    let path = Path::new(data_dir).join("inbox_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return InboxConfig::default();
    };
    serde_json::from_slice::<InboxConfig>(&bytes).unwrap_or_default()
}
