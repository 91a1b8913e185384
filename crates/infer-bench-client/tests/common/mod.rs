//! In-process stand-in for a Triton server.
//!
//! The `splitter` model cuts texts on '.' and answers with typed tensor
//! contents. Every other model upper-cases its input as `predict`, returns
//! the text length as `score` and answers with raw output buffers. The text
//! `boom` makes inference fail.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use bytes::BufMut;
use infer_bench_client::codec;
use infer_bench_proto::inference as pb;
use infer_bench_proto::inference::grpc_inference_service_server::{
    GrpcInferenceService, GrpcInferenceServiceServer,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};

pub const SPLITTER_MODEL: &str = "splitter";

#[derive(Clone, Copy, Debug)]
pub struct MockConfig {
    pub live: bool,
    pub ready: bool,
    pub model_ready: bool,
}

impl MockConfig {
    pub fn healthy() -> Self {
        Self {
            live: true,
            ready: true,
            model_ready: true,
        }
    }
}

struct MockInference {
    config: MockConfig,
    requests: Arc<Mutex<Vec<pb::ModelInferRequest>>>,
}

impl MockInference {
    fn texts(request: &pb::ModelInferRequest) -> Result<Vec<String>, Status> {
        let raw = request
            .raw_input_contents
            .first()
            .ok_or_else(|| Status::invalid_argument("missing raw input"))?;
        codec::decode_bytes(raw)
            .map_err(|e| Status::invalid_argument(e.to_string()))?
            .into_iter()
            .map(|b| String::from_utf8(b).map_err(|e| Status::invalid_argument(e.to_string())))
            .collect()
    }

    fn split(request: &pb::ModelInferRequest, texts: &[String]) -> pb::ModelInferResponse {
        let mut sents = Vec::new();
        let mut sent_index = Vec::new();
        let mut group_index = Vec::new();
        for (group, text) in texts.iter().enumerate() {
            let parts = text.split('.').map(str::trim).filter(|s| !s.is_empty());
            for (idx, part) in parts.enumerate() {
                sents.push(part.as_bytes().to_vec());
                sent_index.push(idx as i64);
                group_index.push(group as i64);
            }
        }

        let outputs = request
            .outputs
            .iter()
            .map(|o| {
                let (datatype, contents) = match o.name.as_str() {
                    "text" => (
                        codec::BYTES,
                        pb::InferTensorContents {
                            bytes_contents: sents.clone(),
                            ..Default::default()
                        },
                    ),
                    "sent_index" => (
                        codec::INT64,
                        pb::InferTensorContents {
                            int64_contents: sent_index.clone(),
                            ..Default::default()
                        },
                    ),
                    _ => (
                        codec::INT64,
                        pb::InferTensorContents {
                            int64_contents: group_index.clone(),
                            ..Default::default()
                        },
                    ),
                };
                pb::model_infer_response::InferOutputTensor {
                    name: o.name.clone(),
                    datatype: datatype.to_string(),
                    shape: vec![sents.len() as i64],
                    contents: Some(contents),
                    ..Default::default()
                }
            })
            .collect();

        pb::ModelInferResponse {
            model_name: request.model_name.clone(),
            model_version: request.model_version.clone(),
            outputs,
            ..Default::default()
        }
    }

    fn classify(request: &pb::ModelInferRequest, texts: &[String]) -> pb::ModelInferResponse {
        let mut outputs = Vec::new();
        let mut raw_output_contents = Vec::new();
        for o in &request.outputs {
            let (datatype, raw) = if o.name == "score" {
                let mut raw: Vec<u8> = Vec::new();
                for text in texts {
                    raw.put_f32_le(text.len() as f32);
                }
                (codec::FP32, raw)
            } else {
                let labels: Vec<String> = texts.iter().map(|t| t.to_uppercase()).collect();
                (codec::BYTES, codec::encode_bytes(&labels))
            };
            outputs.push(pb::model_infer_response::InferOutputTensor {
                name: o.name.clone(),
                datatype: datatype.to_string(),
                shape: vec![texts.len() as i64],
                ..Default::default()
            });
            raw_output_contents.push(raw);
        }

        pb::ModelInferResponse {
            model_name: request.model_name.clone(),
            model_version: request.model_version.clone(),
            outputs,
            raw_output_contents,
            ..Default::default()
        }
    }
}

#[tonic::async_trait]
impl GrpcInferenceService for MockInference {
    async fn server_live(
        &self,
        _req: Request<pb::ServerLiveRequest>,
    ) -> Result<Response<pb::ServerLiveResponse>, Status> {
        Ok(Response::new(pb::ServerLiveResponse {
            live: self.config.live,
        }))
    }

    async fn server_ready(
        &self,
        _req: Request<pb::ServerReadyRequest>,
    ) -> Result<Response<pb::ServerReadyResponse>, Status> {
        Ok(Response::new(pb::ServerReadyResponse {
            ready: self.config.ready,
        }))
    }

    async fn model_ready(
        &self,
        _req: Request<pb::ModelReadyRequest>,
    ) -> Result<Response<pb::ModelReadyResponse>, Status> {
        Ok(Response::new(pb::ModelReadyResponse {
            ready: self.config.model_ready,
        }))
    }

    async fn model_metadata(
        &self,
        req: Request<pb::ModelMetadataRequest>,
    ) -> Result<Response<pb::ModelMetadataResponse>, Status> {
        let req = req.into_inner();
        let tensor = |name: &str, datatype: &str| pb::model_metadata_response::TensorMetadata {
            name: name.to_string(),
            datatype: datatype.to_string(),
            shape: vec![-1],
        };
        Ok(Response::new(pb::ModelMetadataResponse {
            name: req.name,
            versions: vec![req.version],
            platform: "python".to_string(),
            inputs: vec![tensor("text", codec::BYTES)],
            outputs: vec![tensor("predict", codec::BYTES), tensor("score", codec::FP32)],
        }))
    }

    async fn model_infer(
        &self,
        req: Request<pb::ModelInferRequest>,
    ) -> Result<Response<pb::ModelInferResponse>, Status> {
        let req = req.into_inner();
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(req.clone());
        }

        let texts = Self::texts(&req)?;
        if texts.iter().any(|t| t == "boom") {
            return Err(Status::internal("model raised an exception"));
        }

        let response = if req.model_name == SPLITTER_MODEL {
            Self::split(&req, &texts)
        } else {
            Self::classify(&req, &texts)
        };
        Ok(Response::new(response))
    }

    async fn model_config(
        &self,
        req: Request<pb::ModelConfigRequest>,
    ) -> Result<Response<pb::ModelConfigResponse>, Status> {
        Ok(Response::new(pb::ModelConfigResponse {
            config: Some(pb::ModelConfig {
                name: req.into_inner().name,
                backend: "python".to_string(),
                max_batch_size: 8,
                input: vec![pb::ModelInput {
                    name: "text".to_string(),
                    data_type: pb::DataType::TypeString as i32,
                    dims: vec![1],
                }],
                ..Default::default()
            }),
        }))
    }
}

pub struct MockServer {
    pub address: String,
    requests: Arc<Mutex<Vec<pb::ModelInferRequest>>>,
    shutdown: Option<oneshot::Sender<()>>,
    _thread: JoinHandle<()>,
}

impl MockServer {
    pub fn start(config: MockConfig) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let svc = MockInference {
            config,
            requests: Arc::clone(&requests),
        };
        let (addr_tx, addr_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("mock runtime");
            runtime.block_on(async move {
                let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
                addr_tx
                    .send(listener.local_addr().expect("local addr"))
                    .expect("report addr");
                tonic::transport::Server::builder()
                    .add_service(GrpcInferenceServiceServer::new(svc))
                    .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .expect("mock server");
            });
        });

        let addr = addr_rx.recv().expect("mock server address");
        Self {
            address: addr.to_string(),
            requests,
            shutdown: Some(shutdown_tx),
            _thread: thread,
        }
    }

    pub fn requests(&self) -> Vec<pb::ModelInferRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
