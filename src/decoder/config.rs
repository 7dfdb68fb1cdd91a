use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Search manager tuning. Beam widths are linear factors relative to the best
/// score; they are converted to log offsets at construction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Minimum score of word tokens relative to the best token.
    pub relative_word_beam_width: f64,
    /// Skip growth every N frames. 0 disables skipping.
    pub grow_skip_interval: usize,
    /// Apply the beams to arc entry scores before creating tokens.
    pub want_entry_pruning: bool,
    pub build_word_lattice: bool,
    /// Keep every token in predecessor chains rather than just word tokens.
    pub keep_all_tokens: bool,
    /// Drop unreachable tokens every N frames. 0 disables compaction.
    pub compact_interval_frames: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            relative_word_beam_width: 1e-40,
            grow_skip_interval: 0,
            want_entry_pruning: false,
            build_word_lattice: true,
            keep_all_tokens: true,
            compact_interval_frames: 64,
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides("SEARCH_");
        config
    }

    fn apply_env_overrides(&mut self, prefix: &str) {
        if let Some(v) = env_override(prefix, "RELATIVE_WORD_BEAM_WIDTH") {
            self.relative_word_beam_width = v;
        }
        if let Some(v) = env_override(prefix, "GROW_SKIP_INTERVAL") {
            self.grow_skip_interval = v;
        }
        if let Some(v) = env_override(prefix, "COMPACT_INTERVAL_FRAMES") {
            self.compact_interval_frames = v;
        }
        if let Some(v) = env_override(prefix, "WANT_ENTRY_PRUNING") {
            self.want_entry_pruning = v;
        }
        if let Some(v) = env_override(prefix, "BUILD_WORD_LATTICE") {
            self.build_word_lattice = v;
        }
        if let Some(v) = env_override(prefix, "KEEP_ALL_TOKENS") {
            self.keep_all_tokens = v;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActiveListConfig {
    /// Maximum tokens kept per frame. Zero or negative keeps everything.
    pub absolute_beam_width: i64,
    /// Linear factor relative to the best score below which tokens are pruned.
    pub relative_beam_width: f64,
}

impl Default for ActiveListConfig {
    fn default() -> Self {
        Self {
            absolute_beam_width: 20_000,
            relative_beam_width: 1e-60,
        }
    }
}

impl ActiveListConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides("ACTIVE_LIST_");
        config
    }

    fn apply_env_overrides(&mut self, prefix: &str) {
        if let Some(v) = env_override(prefix, "ABSOLUTE_BEAM_WIDTH") {
            self.absolute_beam_width = v;
        }
        if let Some(v) = env_override(prefix, "RELATIVE_BEAM_WIDTH") {
            self.relative_beam_width = v;
        }
    }
}

/// Reads `{prefix}{suffix}` from the environment. A value that does not parse
/// is logged and ignored.
pub(crate) fn env_override<T>(prefix: &str, suffix: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let name = format!("{prefix}{suffix}");
    let raw = std::env::var(&name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("Ignoring invalid {name} value '{raw}': {err}");
            None
        }
    }
}
