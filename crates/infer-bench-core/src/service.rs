use tracing::debug;

use crate::{
    group_sentence_preds, BatchClassifier, ClsResult, PredResult, Result, SentenceSplitter,
};

/// Document classification on top of a sentence splitter and a batch
/// classifier, both usually remote models on the same inference server.
pub struct ClassifierService<S, C> {
    splitter: S,
    classifier: C,
}

impl<S, C> ClassifierService<S, C>
where
    S: SentenceSplitter,
    C: BatchClassifier,
{
    pub fn new(splitter: S, classifier: C) -> Self {
        Self {
            splitter,
            classifier,
        }
    }

    pub fn preds(&mut self, texts: &[String]) -> Result<Vec<ClsResult>> {
        self.classifier.classify_batch(texts)
    }

    /// One [`PredResult`] per input text, holding a prediction for each of
    /// its sentences in splitter order.
    pub fn preds_per_sentence(&mut self, texts: &[String]) -> Result<Vec<PredResult>> {
        let sents = self.splitter.split_sentences(texts)?;
        let sent_texts: Vec<String> = sents.iter().map(|s| s.text.clone()).collect();
        debug!(texts = texts.len(), sentences = sents.len(), "classifying sentences");

        let preds = if sent_texts.is_empty() {
            Vec::new()
        } else {
            self.classifier.classify_batch(&sent_texts)?
        };
        group_sentence_preds(texts.len(), sents, preds)
    }

    pub fn is_ready(&mut self) -> Result<bool> {
        self.classifier.is_ready()
    }
}
