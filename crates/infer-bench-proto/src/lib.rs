//! Protobuf types and gRPC stubs for the subset of the KServe v2
//! `GRPCInferenceService` that the benchmark client talks to.

pub mod inference {
    tonic::include_proto!("inference");
}
