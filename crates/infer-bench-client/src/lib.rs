use std::future::Future;
use std::time::Duration;

use infer_bench_core::{
    BatchClassifier, ClsResult, EndpointInfo, Error, InferenceEndpoint, Result, SentenceResult,
    SentenceSplitter,
};
use infer_bench_proto::inference as pb;
use infer_bench_proto::inference::grpc_inference_service_client::GrpcInferenceServiceClient;
use tokio::runtime::Runtime;
use tonic::transport::{Channel, Endpoint};
use tracing::{info, instrument};

pub mod codec;

pub const TEXT_INPUT: &str = "text";
pub const PREDICT_OUTPUT: &str = "predict";
pub const SCORE_OUTPUT: &str = "score";
pub const SENT_TEXT_OUTPUT: &str = "text";
pub const SENT_INDEX_OUTPUT: &str = "sent_index";
pub const GROUP_INDEX_OUTPUT: &str = "group_index";

#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    /// Per-request deadline. `None` leaves the transport default in place.
    pub timeout: Option<Duration>,
}

/// Blocking client for one model on a KServe v2 / Triton gRPC endpoint.
///
/// Owns a current-thread runtime and blocks on every call, so requests go
/// out strictly one at a time. Must not be used from inside another tokio
/// runtime.
pub struct TritonClient {
    info: EndpointInfo,
    client: GrpcInferenceServiceClient<Channel>,
    runtime: Runtime,
    timeout: Option<Duration>,
}

impl TritonClient {
    /// Connects, checks server liveness, server readiness and model
    /// readiness, then logs the model metadata and configuration.
    pub fn connect(info: EndpointInfo, options: ConnectOptions) -> Result<Self> {
        info!(
            endpoint = %info.address,
            model = %info.model_name,
            version = %info.model_version,
            "create triton client"
        );

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| transport_error("runtime", e))?;

        let endpoint = Endpoint::from_shared(endpoint_uri(&info.address))
            .map_err(|e| transport_error("connect", e))?;
        let channel = runtime
            .block_on(endpoint.connect())
            .map_err(|e| transport_error("connect", e))?;

        let client = Self {
            info,
            client: GrpcInferenceServiceClient::new(channel),
            runtime,
            timeout: options.timeout,
        };

        client.ensure_ready()?;

        let metadata = client.model_metadata()?;
        info!(?metadata, "model metadata");
        let config = client.model_config()?;
        info!(?config, "model config");

        Ok(client)
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.server_live()? {
            return Err(self.unavailable("server not live"));
        }
        if !self.server_ready()? {
            return Err(self.unavailable("server not ready"));
        }
        if !self.model_ready()? {
            return Err(self.unavailable("model not ready"));
        }
        Ok(())
    }

    fn unavailable(&self, reason: &str) -> Error {
        Error::Unavailable {
            endpoint: self.info.address.clone(),
            model: self.info.model_name.clone(),
            version: self.info.model_version.clone(),
            reason: reason.to_string(),
        }
    }

    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        if let Some(timeout) = self.timeout {
            request.set_timeout(timeout);
        }
        request
    }

    fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<tonic::Response<T>, tonic::Status>>,
    {
        self.runtime
            .block_on(fut)
            .map(tonic::Response::into_inner)
            .map_err(|status| Error::Transport {
                op,
                message: status.to_string(),
            })
    }

    pub fn server_live(&self) -> Result<bool> {
        let mut client = self.client.clone();
        let request = self.request(pb::ServerLiveRequest {});
        let response = self.call("ServerLive", async move { client.server_live(request).await })?;
        Ok(response.live)
    }

    pub fn server_ready(&self) -> Result<bool> {
        let mut client = self.client.clone();
        let request = self.request(pb::ServerReadyRequest {});
        let response =
            self.call("ServerReady", async move { client.server_ready(request).await })?;
        Ok(response.ready)
    }

    pub fn model_ready(&self) -> Result<bool> {
        let mut client = self.client.clone();
        let request = self.request(pb::ModelReadyRequest {
            name: self.info.model_name.clone(),
            version: self.info.model_version.clone(),
        });
        let response = self.call("ModelReady", async move { client.model_ready(request).await })?;
        Ok(response.ready)
    }

    pub fn model_metadata(&self) -> Result<pb::ModelMetadataResponse> {
        let mut client = self.client.clone();
        let request = self.request(pb::ModelMetadataRequest {
            name: self.info.model_name.clone(),
            version: self.info.model_version.clone(),
        });
        self.call("ModelMetadata", async move {
            client.model_metadata(request).await
        })
    }

    pub fn model_config(&self) -> Result<pb::ModelConfigResponse> {
        let mut client = self.client.clone();
        let request = self.request(pb::ModelConfigRequest {
            name: self.info.model_name.clone(),
            version: self.info.model_version.clone(),
        });
        self.call("ModelConfig", async move { client.model_config(request).await })
    }

    /// Sends `texts` as one BYTES tensor and asks for the named outputs.
    #[instrument(name = "ModelInfer", level = "debug", skip_all, fields(texts = texts.len()))]
    pub fn infer_texts<T: AsRef<str>>(
        &self,
        texts: &[T],
        outputs: &[&str],
    ) -> Result<pb::ModelInferResponse> {
        let request = self.request(self.text_request(texts, outputs));
        let mut client = self.client.clone();
        self.call("ModelInfer", async move { client.model_infer(request).await })
    }

    #[instrument(name = "encode_request", level = "debug", skip_all)]
    fn text_request<T: AsRef<str>>(&self, texts: &[T], outputs: &[&str]) -> pb::ModelInferRequest {
        let elements: Vec<&[u8]> = texts.iter().map(|t| t.as_ref().as_bytes()).collect();
        pb::ModelInferRequest {
            model_name: self.info.model_name.clone(),
            model_version: self.info.model_version.clone(),
            inputs: vec![pb::model_infer_request::InferInputTensor {
                name: TEXT_INPUT.to_string(),
                datatype: codec::BYTES.to_string(),
                shape: vec![texts.len() as i64],
                ..Default::default()
            }],
            outputs: outputs
                .iter()
                .map(|name| pb::model_infer_request::InferRequestedOutputTensor {
                    name: (*name).to_string(),
                    ..Default::default()
                })
                .collect(),
            raw_input_contents: vec![codec::encode_bytes(&elements)],
            ..Default::default()
        }
    }
}

impl InferenceEndpoint for TritonClient {
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn is_ready(&mut self) -> Result<bool> {
        Ok(self.server_live()? && self.server_ready()?)
    }

    #[instrument(name = "classify", level = "debug", skip_all)]
    fn classify(&mut self, text: &str) -> Result<String> {
        let response = self.infer_texts(&[text], &[PREDICT_OUTPUT])?;
        let _span = tracing::debug_span!("decode_response").entered();
        codec::output_strings(&response, PREDICT_OUTPUT)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Decode("empty predict output".to_string()))
    }
}

impl BatchClassifier for TritonClient {
    #[instrument(name = "classify_batch", level = "debug", skip_all)]
    fn classify_batch(&mut self, texts: &[String]) -> Result<Vec<ClsResult>> {
        let response = self.infer_texts(texts, &[PREDICT_OUTPUT, SCORE_OUTPUT])?;
        let predicts = codec::output_strings(&response, PREDICT_OUTPUT)?;
        let scores = codec::output_f32(&response, SCORE_OUTPUT)?;
        if predicts.len() != scores.len() || predicts.len() != texts.len() {
            return Err(Error::Decode(format!(
                "{} texts got {} predictions and {} scores",
                texts.len(),
                predicts.len(),
                scores.len()
            )));
        }
        Ok(predicts
            .into_iter()
            .zip(scores)
            .map(|(predict, score)| ClsResult { predict, score })
            .collect())
    }
}

impl SentenceSplitter for TritonClient {
    #[instrument(name = "split_sentences", level = "debug", skip_all)]
    fn split_sentences(&mut self, texts: &[String]) -> Result<Vec<SentenceResult>> {
        let response = self.infer_texts(
            texts,
            &[SENT_TEXT_OUTPUT, SENT_INDEX_OUTPUT, GROUP_INDEX_OUTPUT],
        )?;
        let sents = codec::output_strings(&response, SENT_TEXT_OUTPUT)?;
        let sent_index = codec::output_i64(&response, SENT_INDEX_OUTPUT)?;
        let group_index = codec::output_i64(&response, GROUP_INDEX_OUTPUT)?;
        if sents.len() != sent_index.len() || sents.len() != group_index.len() {
            return Err(Error::Decode(format!(
                "sentence outputs disagree: {} texts, {} sentence indices, {} group indices",
                sents.len(),
                sent_index.len(),
                group_index.len()
            )));
        }
        Ok(sents
            .into_iter()
            .zip(sent_index)
            .zip(group_index)
            .map(|((text, sent_index), group_index)| SentenceResult {
                text,
                sent_index,
                group_index,
            })
            .collect())
    }
}

/// Accepts bare `host:port` addresses as well as full URIs.
pub fn endpoint_uri(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

fn transport_error(op: &'static str, err: impl std::error::Error) -> Error {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    Error::Transport { op, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_addresses_get_http_scheme() {
        assert_eq!(endpoint_uri("localhost:8001"), "http://localhost:8001");
        assert_eq!(endpoint_uri("https://triton:8001"), "https://triton:8001");
    }
}
