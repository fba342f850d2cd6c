use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

use serde::de::DeserializeOwned;
use serde_json::Value;
use zyquence_model::ErrorKind;

use crate::text::{GeneratedFile, extract_files, fenced_blocks};

/// What a feature expects the completion text to contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Expect {
    /// Free-form prose.
    Text,
    /// A JSON object.
    Structured,
    /// One or more fenced file blocks.
    Files,
}

/// A completion text validated against what the feature expects.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedCompletion {
    /// Free-form prose.
    Text(String),
    /// The JSON object found in the text.
    Structured(Value),
    /// Files found in the text, in order of appearance.
    Files(Vec<GeneratedFile>),
}

impl ParsedCompletion {
    /// Validates `text` against `expect`.
    ///
    /// Missing or malformed content is an error rather than an empty
    /// value.
    pub fn parse(text: &str, expect: Expect) -> Result<Self, SchemaMismatch> {
        match expect {
            Expect::Text => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(SchemaMismatch::new("the completion is empty"));
                }
                Ok(Self::Text(text.to_owned()))
            }
            Expect::Structured => find_json_object(text).map(Self::Structured),
            Expect::Files => {
                let files = extract_files(text);
                if files.is_empty() {
                    return Err(SchemaMismatch::new(
                        "no file blocks in the completion",
                    ));
                }
                Ok(Self::Files(files))
            }
        }
    }
}

/// Finds a JSON object in `text` and deserializes it into `T`.
///
/// A fenced ```` ```json ```` block wins over a bare object in the prose.
pub fn parse_structured<T: DeserializeOwned>(
    text: &str,
) -> Result<T, SchemaMismatch> {
    let value = find_json_object(text)?;
    serde_json::from_value(value).map_err(|err| SchemaMismatch {
        message: "the JSON object does not have the expected shape".to_owned(),
        source: Some(err),
    })
}

fn find_json_object(text: &str) -> Result<Value, SchemaMismatch> {
    let fenced = fenced_blocks(text)
        .filter(|(info, _)| info.eq_ignore_ascii_case("json"))
        .filter_map(|(_, body)| serde_json::from_str::<Value>(body).ok())
        .find(Value::is_object);
    if let Some(value) = fenced {
        return Ok(value);
    }

    // Try every opening brace until one starts a complete object.
    for (idx, _) in text.match_indices('{') {
        let mut values =
            serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
        if let Some(Ok(value @ Value::Object(_))) = values.next() {
            return Ok(value);
        }
    }
    Err(SchemaMismatch::new("no JSON object in the completion"))
}

/// A completion did not have the shape its feature expects.
#[derive(Debug)]
pub struct SchemaMismatch {
    message: String,
    source: Option<serde_json::Error>,
}

impl SchemaMismatch {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_owned(),
            source: None,
        }
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::SchemaMismatch
    }
}

impl Display for SchemaMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {source}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl StdError for SchemaMismatch {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|err| err as &(dyn StdError + 'static))
    }
}
