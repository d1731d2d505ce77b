//! Configuration mode shared by the pool, the prompts and the wire format

use serde::{Deserialize, Serialize};

/// Which agent configuration a request runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Plain agent with the fixed system prompt
    #[serde(alias = "plain")]
    Baseline,
    /// Agent primed with the domain-skills document
    #[serde(alias = "skills")]
    Enhanced,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Baseline, Mode::Enhanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Baseline => "baseline",
            Mode::Enhanced => "enhanced",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_wire_names() {
        assert_eq!(serde_json::to_string(&Mode::Baseline).unwrap(), "\"baseline\"");
        assert_eq!(serde_json::to_string(&Mode::Enhanced).unwrap(), "\"enhanced\"");
    }

    #[test]
    fn test_mode_aliases() {
        let plain: Mode = serde_json::from_str("\"plain\"").unwrap();
        let skills: Mode = serde_json::from_str("\"skills\"").unwrap();
        assert_eq!(plain, Mode::Baseline);
        assert_eq!(skills, Mode::Enhanced);
    }
}
