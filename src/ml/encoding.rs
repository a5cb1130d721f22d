use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Registry misuse
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncoderError {
    #[error("encoder '{0}' is already fitted; reset it first")]
    AlreadyFitted(String),

    #[error("no encoder registered for feature '{0}'")]
    UnknownFeature(String),
}

/// Recoverable failure to map a code back to its value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no encoder registered for feature '{0}'")]
    UnknownFeature(String),

    #[error("code {code} is not mapped by encoder '{feature}'")]
    UnmappedCode { feature: String, code: usize },
}

/// Bijection between a categorical domain and `0..n` codes.
///
/// Codes are positions in `classes`; growth only appends, so a code never
/// changes once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelEncoder {
    /// Encoder over the distinct `values`, coded in sorted order
    pub fn fit<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classes: Vec<String> = values.into_iter().map(|v| v.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();
        Self::from(classes)
    }

    /// Code for `value`, assigning the next free code if unseen
    pub fn encode_or_extend(&mut self, value: &str) -> usize {
        if let Some(code) = self.index.get(value) {
            return *code;
        }
        let code = self.classes.len();
        self.classes.push(value.to_string());
        self.index.insert(value.to_string(), code);
        code
    }

    pub fn code(&self, value: &str) -> Option<usize> {
        self.index.get(value).copied()
    }

    pub fn value(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl From<Vec<String>> for LabelEncoder {
    fn from(classes: Vec<String>) -> Self {
        let index = classes
            .iter()
            .enumerate()
            .map(|(code, value)| (value.clone(), code))
            .collect();
        Self { classes, index }
    }
}

impl From<LabelEncoder> for Vec<String> {
    fn from(encoder: LabelEncoder) -> Self {
        encoder.classes
    }
}

/// One encoder per categorical feature
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderRegistry {
    encoders: BTreeMap<String, LabelEncoder>,
}

impl EncoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the encoder of `feature` on `values`.
    ///
    /// Refitting requires an explicit [`reset`](Self::reset) so codes held
    /// by trained models are never silently reassigned.
    pub fn fit<I, S>(&mut self, feature: &str, values: I) -> Result<&LabelEncoder, EncoderError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.encoders.contains_key(feature) {
            return Err(EncoderError::AlreadyFitted(feature.to_string()));
        }
        let encoder = self
            .encoders
            .entry(feature.to_string())
            .or_insert_with(|| LabelEncoder::fit(values));
        Ok(encoder)
    }

    /// Extend the domain with unseen values, then encode every value
    pub fn encode<S: AsRef<str>>(&mut self, feature: &str, values: &[S]) -> Result<Vec<usize>, EncoderError> {
        let encoder = self
            .encoders
            .get_mut(feature)
            .ok_or_else(|| EncoderError::UnknownFeature(feature.to_string()))?;

        Ok(values
            .iter()
            .map(|v| encoder.encode_or_extend(v.as_ref()))
            .collect())
    }

    /// Map codes back to values
    pub fn decode(&self, feature: &str, codes: &[usize]) -> Result<Vec<String>, DecodeError> {
        let encoder = self
            .encoders
            .get(feature)
            .ok_or_else(|| DecodeError::UnknownFeature(feature.to_string()))?;

        codes
            .iter()
            .map(|&code| {
                encoder
                    .value(code)
                    .map(str::to_string)
                    .ok_or_else(|| DecodeError::UnmappedCode {
                        feature: feature.to_string(),
                        code,
                    })
            })
            .collect()
    }

    /// Read-only code lookup; never grows the domain
    pub fn lookup(&self, feature: &str, value: &str) -> Option<usize> {
        self.encoders.get(feature).and_then(|e| e.code(value))
    }

    /// Forget the encoder of `feature`, returning it if present
    pub fn reset(&mut self, feature: &str) -> Option<LabelEncoder> {
        self.encoders.remove(feature)
    }

    pub fn get(&self, feature: &str) -> Option<&LabelEncoder> {
        self.encoders.get(feature)
    }

    /// Install a previously persisted encoder
    pub fn insert(&mut self, feature: impl Into<String>, encoder: LabelEncoder) {
        self.encoders.insert(feature.into(), encoder);
    }

    pub fn classes(&self, feature: &str) -> Option<&[String]> {
        self.encoders.get(feature).map(LabelEncoder::classes)
    }

    pub fn feature_names(&self) -> Vec<&str> {
        self.encoders.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LabelEncoder)> {
        self.encoders.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of registered encoders
    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}
