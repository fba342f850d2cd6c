use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use zyquence_core::{ConversationBuilder, Expect};
use zyquence_model::CompletionProvider;

/// The chat features that stream assistant responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Assistant {
    /// General chat inside the Atlas workspace.
    AtlasChat,
    /// The AI panel of the code studio, which answers with files.
    CodeStudio,
    /// Budgeting and investment guidance.
    FinancialAdvisor,
}

impl Assistant {
    /// Every preset, in menu order.
    pub const ALL: [Assistant; 3] = [
        Assistant::AtlasChat,
        Assistant::CodeStudio,
        Assistant::FinancialAdvisor,
    ];

    /// Returns the feature name sent with every request.
    pub fn feature(self) -> &'static str {
        match self {
            Assistant::AtlasChat => "atlas-chat",
            Assistant::CodeStudio => "code-studio",
            Assistant::FinancialAdvisor => "financial-advisor",
        }
    }

    /// Returns the instructions this feature starts every conversation
    /// with.
    pub fn system_prompt(self) -> &'static str {
        match self {
            Assistant::AtlasChat => {
                "You are Atlas, a friendly assistant. Answer clearly and \
                 keep replies short unless asked for detail."
            }
            Assistant::CodeStudio => {
                "You are a coding assistant. When you write or change a \
                 file, put it in a fenced block whose info string is the \
                 language followed by the file path, like ```rust \
                 src/main.rs."
            }
            Assistant::FinancialAdvisor => {
                "You are a careful financial advisor. Explain trade-offs in \
                 plain words and never promise returns."
            }
        }
    }

    /// Returns what this feature expects a finished reply to contain.
    pub fn expects(self) -> Expect {
        match self {
            Assistant::CodeStudio => Expect::Files,
            Assistant::AtlasChat | Assistant::FinancialAdvisor => Expect::Text,
        }
    }

    /// Returns a conversation builder preconfigured for this feature.
    pub fn builder<P: CompletionProvider + 'static>(
        self,
        provider: P,
    ) -> ConversationBuilder {
        ConversationBuilder::with_provider(provider)
            .with_system_prompt(self.system_prompt())
            .with_context_field("feature", self.feature())
    }
}

impl Display for Assistant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.feature())
    }
}

impl FromStr for Assistant {
    type Err = UnknownAssistant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|assistant| assistant.feature().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownAssistant(s.to_owned()))
    }
}

/// The error returned when parsing an unknown assistant name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownAssistant(String);

impl Display for UnknownAssistant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown assistant `{}`, expected one of: ", self.0)?;
        for (idx, assistant) in Assistant::ALL.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            f.write_str(assistant.feature())?;
        }
        Ok(())
    }
}

impl StdError for UnknownAssistant {}
