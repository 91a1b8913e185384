//! Tensor payload encoding for the KServe v2 protocol.
//!
//! BYTES elements are serialized as a little-endian `u32` length followed by
//! the raw bytes; numeric tensors are packed little-endian. Outputs arrive
//! either in `raw_output_contents` (one buffer per output, same order as
//! `outputs`) or in the typed `contents` of each output tensor.

use bytes::{Buf, BufMut};
use infer_bench_core::{Error, Result};
use infer_bench_proto::inference as pb;

pub const BYTES: &str = "BYTES";
pub const FP32: &str = "FP32";
pub const INT64: &str = "INT64";

pub fn encode_bytes<T: AsRef<[u8]>>(elements: &[T]) -> Vec<u8> {
    let len: usize = elements.iter().map(|e| 4 + e.as_ref().len()).sum();
    let mut raw: Vec<u8> = Vec::with_capacity(len);
    for element in elements {
        let element = element.as_ref();
        raw.put_u32_le(element.len() as u32);
        raw.put_slice(element);
    }
    raw
}

pub fn decode_bytes(mut raw: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut elements = Vec::new();
    while raw.has_remaining() {
        if raw.remaining() < 4 {
            return Err(Error::Decode(format!(
                "BYTES element length prefix truncated to {} bytes",
                raw.remaining()
            )));
        }
        let len = raw.get_u32_le() as usize;
        if raw.remaining() < len {
            return Err(Error::Decode(format!(
                "BYTES element of {len} bytes truncated to {}",
                raw.remaining()
            )));
        }
        elements.push(raw[..len].to_vec());
        raw.advance(len);
    }
    Ok(elements)
}

fn decode_f32(raw: &[u8]) -> Result<Vec<f32>> {
    if raw.len() % 4 != 0 {
        return Err(Error::Decode(format!(
            "FP32 output has {} bytes, not a multiple of 4",
            raw.len()
        )));
    }
    let mut raw = raw;
    let mut out = Vec::with_capacity(raw.len() / 4);
    while raw.has_remaining() {
        out.push(raw.get_f32_le());
    }
    Ok(out)
}

fn decode_i64(raw: &[u8]) -> Result<Vec<i64>> {
    if raw.len() % 8 != 0 {
        return Err(Error::Decode(format!(
            "INT64 output has {} bytes, not a multiple of 8",
            raw.len()
        )));
    }
    let mut raw = raw;
    let mut out = Vec::with_capacity(raw.len() / 8);
    while raw.has_remaining() {
        out.push(raw.get_i64_le());
    }
    Ok(out)
}

/// A named output of a [`pb::ModelInferResponse`], with its raw buffer if
/// the server used raw contents.
struct Output<'a> {
    tensor: &'a pb::model_infer_response::InferOutputTensor,
    raw: Option<&'a [u8]>,
}

fn find_output<'a>(response: &'a pb::ModelInferResponse, name: &str) -> Result<Output<'a>> {
    let idx = response
        .outputs
        .iter()
        .position(|o| o.name == name)
        .ok_or_else(|| Error::Decode(format!("response has no output named {name:?}")))?;
    Ok(Output {
        tensor: &response.outputs[idx],
        raw: response.raw_output_contents.get(idx).map(Vec::as_slice),
    })
}

fn check_datatype(output: &Output<'_>, expected: &str) -> Result<()> {
    let datatype = output.tensor.datatype.as_str();
    if !datatype.is_empty() && datatype != expected {
        return Err(Error::Decode(format!(
            "output {:?} has datatype {datatype}, expected {expected}",
            output.tensor.name
        )));
    }
    Ok(())
}

pub fn output_strings(response: &pb::ModelInferResponse, name: &str) -> Result<Vec<String>> {
    let output = find_output(response, name)?;
    check_datatype(&output, BYTES)?;
    let elements = match output.raw {
        Some(raw) => decode_bytes(raw)?,
        None => output
            .tensor
            .contents
            .as_ref()
            .map(|c| c.bytes_contents.clone())
            .unwrap_or_default(),
    };
    elements
        .into_iter()
        .map(|e| {
            String::from_utf8(e)
                .map_err(|e| Error::Decode(format!("output {name:?} is not UTF-8: {e}")))
        })
        .collect()
}

pub fn output_f32(response: &pb::ModelInferResponse, name: &str) -> Result<Vec<f32>> {
    let output = find_output(response, name)?;
    check_datatype(&output, FP32)?;
    match output.raw {
        Some(raw) => decode_f32(raw),
        None => Ok(output
            .tensor
            .contents
            .as_ref()
            .map(|c| c.fp32_contents.clone())
            .unwrap_or_default()),
    }
}

pub fn output_i64(response: &pb::ModelInferResponse, name: &str) -> Result<Vec<i64>> {
    let output = find_output(response, name)?;
    check_datatype(&output, INT64)?;
    match output.raw {
        Some(raw) => decode_i64(raw),
        None => Ok(output
            .tensor
            .contents
            .as_ref()
            .map(|c| c.int64_contents.clone())
            .unwrap_or_default()),
    }
}
