use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::{Error, Result};

/// One line of a newline-delimited JSON test file.
///
/// Fields other than `text` and `pred` are kept in `extra`, in input order,
/// and written back unchanged next to the prediction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(
        default,
        deserialize_with = "existing_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub pred: Option<String>,
}

/// An incoming `pred` of any JSON type is accepted; only a string survives,
/// and inference replaces it either way.
fn existing_label<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(label) => Some(label),
        _ => None,
    })
}

impl TestCase {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            extra: Map::new(),
            pred: None,
        }
    }
}

/// Number of cases kept out of `total` for a requested `limit`.
/// A non-positive limit keeps everything.
pub fn select_count(total: usize, limit: i64) -> usize {
    if limit > 0 {
        total.min(usize::try_from(limit).unwrap_or(usize::MAX))
    } else {
        total
    }
}

/// Reads every line of `path` as a [`TestCase`] and keeps the first
/// `select_count(total, limit)` of them.
///
/// The whole file is parsed before truncation, so a malformed line anywhere
/// fails the load.
pub fn load_cases(path: impl AsRef<Path>, limit: i64) -> Result<Vec<TestCase>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;

    let mut cases = Vec::new();
    for (idx, line) in BufReader::new(file).split(b'\n').enumerate() {
        let mut line = line.map_err(|e| Error::io(path, e))?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        // from_slice validates UTF-8, so bad bytes surface as a parse error
        // with the line number.
        let case = serde_json::from_slice::<TestCase>(&line).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        cases.push(case);
    }

    let total = cases.len();
    let selected = select_count(total, limit);
    cases.truncate(selected);
    info!(selected, total, file = %path.display(), "loaded test cases");
    Ok(cases)
}

/// Writes `cases` as newline-delimited JSON, replacing any existing file.
pub fn write_predictions(path: impl AsRef<Path>, cases: &[TestCase]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut out = BufWriter::new(file);
    for case in cases {
        serde_json::to_writer(&mut out, case)?;
        out.write_all(b"\n").map_err(|e| Error::io(path, e))?;
    }
    out.flush().map_err(|e| Error::io(path, e))?;
    Ok(())
}
