fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .compile_well_known_types(true)
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[
                "proto/orchestration.proto",
                "proto/streaming.proto",
                "proto/engine.proto",
            ],
            &["proto"],
        )?;
    Ok(())
}
