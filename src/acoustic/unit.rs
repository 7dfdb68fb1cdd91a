use std::sync::{Arc, LazyLock};

use regex::Regex;

pub const SILENCE: &str = "SIL";

static FILLER_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(SIL|<sil>|\+[A-Za-z_]+\+)$"));

/// Filler units (silence, breath, noise) by naming convention.
pub fn looks_like_filler(name: &str) -> bool {
    match FILLER_RE.as_ref() {
        Ok(re) => re.is_match(name),
        Err(_) => name == SILENCE,
    }
}

/// A phonetic unit, optionally in a left/right context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Unit {
    pub base: Arc<str>,
    pub left: Option<Arc<str>>,
    pub right: Option<Arc<str>>,
    pub filler: bool,
}

impl Unit {
    pub fn context_independent(base: &str, filler: bool) -> Self {
        Self {
            base: Arc::from(base),
            left: None,
            right: None,
            filler,
        }
    }

    pub fn with_context(base: &str, left: &str, right: &str) -> Self {
        Self {
            base: Arc::from(base),
            left: Some(Arc::from(left)),
            right: Some(Arc::from(right)),
            filler: looks_like_filler(base),
        }
    }

    pub fn is_context_dependent(&self) -> bool {
        self.left.is_some() || self.right.is_some()
    }

    pub fn is_silence(&self) -> bool {
        &*self.base == SILENCE
    }

    /// Left context, with no context read as silence.
    pub fn left_context(&self) -> &str {
        self.left.as_deref().unwrap_or(SILENCE)
    }

    /// Right context, with no context read as silence.
    pub fn right_context(&self) -> &str {
        self.right.as_deref().unwrap_or(SILENCE)
    }

    pub fn name(&self) -> String {
        match (&self.left, &self.right) {
            (None, None) => self.base.to_string(),
            _ => format!(
                "{}({},{})",
                self.base,
                self.left_context(),
                self.right_context()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filler_names() {
        assert!(looks_like_filler("SIL"));
        assert!(looks_like_filler("+BREATH+"));
        assert!(!looks_like_filler("AH"));
        assert!(!looks_like_filler("+AH"));
    }

    #[test]
    fn context_names() {
        let u = Unit::with_context("AH", "B", "T");
        assert!(u.is_context_dependent());
        assert_eq!(u.name(), "AH(B,T)");
        assert_eq!(Unit::context_independent("AH", false).name(), "AH");
    }
}
