use crate::{ClsResult, Result, SentenceResult};

/// Where a benchmark run sends its requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointInfo {
    pub address: String,
    pub model_name: String,
    pub model_version: String,
}

impl EndpointInfo {
    pub fn new(
        address: impl Into<String>,
        model_name: impl Into<String>,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            model_name: model_name.into(),
            model_version: model_version.into(),
        }
    }
}

/// A remote text classifier answering one request at a time.
pub trait InferenceEndpoint {
    fn info(&self) -> &EndpointInfo;

    fn is_ready(&mut self) -> Result<bool>;

    /// Sends a single-example request and returns the predicted label.
    fn classify(&mut self, text: &str) -> Result<String>;
}

/// Classifies many texts in one request, returning labels with scores.
pub trait BatchClassifier: InferenceEndpoint {
    fn classify_batch(&mut self, texts: &[String]) -> Result<Vec<ClsResult>>;
}

/// Splits texts into sentences tagged with the index of their source text.
pub trait SentenceSplitter {
    fn split_sentences(&mut self, texts: &[String]) -> Result<Vec<SentenceResult>>;
}
