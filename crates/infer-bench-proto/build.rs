fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(
            &["src/grpc_service.proto", "src/model_config.proto"],
            &["src"],
        )?;
    Ok(())
}
