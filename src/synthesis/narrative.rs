//! Global narrative parameters: tone, analysis mode, length and custom
//! instructions.
//!
//! These only change phrasing (section intros, prompt wording) and which
//! sections or how many claims are shown. They never change which facts are
//! asserted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::persona::SectionKind;
use crate::utilities::errors::ConfigError;

/// Voice of the generated narrative.
///
/// Written as `professional`, `roast` or `{humorous: <level>}` in every
/// serde format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "ToneRepr", into = "ToneRepr")]
pub enum Tone {
    #[default]
    Professional,
    /// Humor level 1 to 100.
    Humorous(u8),
    Roast,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ToneName {
    Professional,
    Roast,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum ToneRepr {
    Named(ToneName),
    Humorous { humorous: u8 },
}

impl From<ToneRepr> for Tone {
    fn from(repr: ToneRepr) -> Self {
        match repr {
            ToneRepr::Named(ToneName::Professional) => Self::Professional,
            ToneRepr::Named(ToneName::Roast) => Self::Roast,
            ToneRepr::Humorous { humorous } => Self::Humorous(humorous),
        }
    }
}

impl From<Tone> for ToneRepr {
    fn from(tone: Tone) -> Self {
        match tone {
            Tone::Professional => Self::Named(ToneName::Professional),
            Tone::Roast => Self::Named(ToneName::Roast),
            Tone::Humorous(humorous) => Self::Humorous { humorous },
        }
    }
}

impl Tone {
    /// Tone from the CLI-style knobs: roast wins, humor 0 is professional.
    pub fn from_levels(humor: u8, roast: bool) -> Self {
        match (roast, humor) {
            (true, _) => Self::Roast,
            (false, 0) => Self::Professional,
            (false, level) => Self::Humorous(level),
        }
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        match self {
            Self::Humorous(level) if !(1..=100).contains(&level) => Err(ConfigError::out_of_range(
                format!("humor level must be between 1 and 100, got {level}"),
            )),
            other => Ok(other),
        }
    }

    /// Extra system-prompt paragraph for this tone, if any.
    pub fn prompt_directive(&self) -> Option<String> {
        match self {
            Self::Professional => None,
            Self::Humorous(level) => Some(format!(
                "TONE: Humorous (level {level}/100). Add wit and technical jokes in \
                 proportion to the level; 100 is stand-up comedy, 50 is dry sarcasm. \
                 Jokes go in the summary only; claims stay literal and accurate."
            )),
            Self::Roast => Some(
                "TONE: Roast. Write the summary as a cynical senior engineer reviewing \
                 this work: mock over-engineering and missing tests, concede quality \
                 grudgingly. Claims stay literal and accurate."
                    .to_string(),
            ),
        }
    }

    /// Section introduction. Never states a fact about the subject.
    pub fn intro(&self, kind: SectionKind) -> &'static str {
        use SectionKind::*;
        match (self, kind) {
            (Self::Roast, Summary) => "The verdict, delivered without anesthesia.",
            (Self::Roast, Profile) => "Who is responsible for all this.",
            (Self::Roast, PrimaryRoles) => "What they would put on a conference badge.",
            (Self::Roast, TechnicalDna) => "Every stack tells a story. Here is this one.",
            (Self::Roast, ProjectHighlights) => "Exhibits for the prosecution.",
            (Self::Roast, Ecosystem) => "How far the blast radius reaches.",
            (Self::Humorous(level), kind) if *level >= 50 => match kind {
                Summary => "The short version, for people with a standup in five minutes.",
                Profile => "Meet the human behind the commits.",
                PrimaryRoles => "What the compiler would call them, if compilers had opinions.",
                TechnicalDna => "The tools of the trade, as confessed by the commit history.",
                ProjectHighlights => "Repositories that survived contact with production.",
                Ecosystem => "Friends, followers and fellow travellers.",
            },
            (Self::Humorous(_), kind) => match kind {
                Summary => "The condensed version.",
                Profile => "A quick introduction.",
                PrimaryRoles => "The roles that stand out.",
                TechnicalDna => "Technologies that keep showing up.",
                ProjectHighlights => "Projects worth a closer look.",
                Ecosystem => "Where the work meets the wider community.",
            },
            (Self::Professional, kind) => match kind {
                Summary => "Overview of the analyzed footprint.",
                Profile => "Profile information published by the developer.",
                PrimaryRoles => "Roles inferred from the analyzed repositories.",
                TechnicalDna => "Technologies observed across the analyzed repositories.",
                ProjectHighlights => "Notable repositories, most complex first.",
                Ecosystem => "Community reach and ecosystem position.",
            },
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Professional => write!(f, "professional"),
            Self::Humorous(level) => write!(f, "humorous ({level}%)"),
            Self::Roast => write!(f, "roast"),
        }
    }
}

/// Which view of the developer the persona emphasizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisMode {
    /// Balanced overview.
    #[default]
    Summary,
    /// Every analyzed repository, secondary mentions included.
    DeepDive,
    /// Community reach and ecosystem position.
    Connections,
}

impl AnalysisMode {
    /// Sections emitted for this mode, in order.
    pub fn sections(&self) -> &'static [SectionKind] {
        use SectionKind::*;
        match self {
            Self::Summary => &[Summary, Profile, PrimaryRoles, TechnicalDna, ProjectHighlights],
            Self::DeepDive => &[Summary, PrimaryRoles, TechnicalDna, ProjectHighlights, Profile],
            Self::Connections => &[Summary, Profile, Ecosystem, PrimaryRoles, ProjectHighlights],
        }
    }

    /// Whether demoted (secondary) claims are listed.
    pub fn shows_secondary(&self) -> bool {
        !matches!(self, Self::Connections)
    }
}

impl FromStr for AnalysisMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summary" => Ok(Self::Summary),
            "deep-dive" | "deep_dive" | "deepdive" => Ok(Self::DeepDive),
            "connections" => Ok(Self::Connections),
            other => Err(ConfigError::InvalidValue {
                key: "mode".to_string(),
                value: other.to_string(),
                reason: "expected summary, deep-dive or connections".to_string(),
            }),
        }
    }
}

fn default_max_claims_per_section() -> usize {
    12
}

/// Style and selection knobs applied by the synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeParams {
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub mode: AnalysisMode,
    /// Target length: claims listed per section. Deep-dive lists everything.
    #[serde(default = "default_max_claims_per_section")]
    pub max_claims_per_section: usize,
    /// Free-form instructions appended to prompts.
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

impl Default for NarrativeParams {
    fn default() -> Self {
        Self {
            tone: Tone::default(),
            mode: AnalysisMode::default(),
            max_claims_per_section: default_max_claims_per_section(),
            custom_instructions: None,
        }
    }
}

impl NarrativeParams {
    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    pub fn with_mode(mut self, mode: AnalysisMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_claims_per_section(mut self, max: usize) -> Self {
        self.max_claims_per_section = max;
        self
    }

    pub fn with_custom_instructions(mut self, instructions: impl Into<String>) -> Self {
        let instructions = instructions.into();
        self.custom_instructions = (!instructions.trim().is_empty()).then_some(instructions);
        self
    }

    /// Claim limit for one section; `None` means unlimited.
    pub fn claim_limit(&self) -> Option<usize> {
        match self.mode {
            AnalysisMode::DeepDive => None,
            _ => Some(self.max_claims_per_section.max(1)),
        }
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        self.tone.validated()?;
        if self.max_claims_per_section == 0 {
            return Err(ConfigError::out_of_range("max_claims_per_section must be positive"));
        }
        Ok(self)
    }
}
