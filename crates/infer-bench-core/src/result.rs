use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClsResult {
    pub predict: String,
    pub score: f32,
}

/// One sentence cut out of the input text at `group_index`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceResult {
    pub text: String,
    pub sent_index: i64,
    pub group_index: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SentClsResult {
    pub index: i64,
    pub text: String,
    pub predict: String,
    pub score: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PredResult {
    pub sent_preds: Vec<SentClsResult>,
}

/// Pairs each sentence with its prediction and files it under the text it
/// came from. Texts without sentences get an empty [`PredResult`].
pub fn group_sentence_preds(
    num_texts: usize,
    sents: Vec<SentenceResult>,
    preds: Vec<ClsResult>,
) -> Result<Vec<PredResult>> {
    if sents.len() != preds.len() {
        return Err(Error::Decode(format!(
            "got {} predictions for {} sentences",
            preds.len(),
            sents.len()
        )));
    }

    let mut grouped = vec![PredResult::default(); num_texts];
    for (sent, pred) in sents.into_iter().zip(preds) {
        let slot = usize::try_from(sent.group_index)
            .ok()
            .and_then(|i| grouped.get_mut(i))
            .ok_or_else(|| {
                Error::Decode(format!(
                    "sentence group index {} out of range for {num_texts} texts",
                    sent.group_index
                ))
            })?;
        slot.sent_preds.push(SentClsResult {
            index: sent.sent_index,
            text: sent.text,
            predict: pred.predict,
            score: pred.score,
        });
    }
    Ok(grouped)
}
