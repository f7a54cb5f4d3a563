fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/muninn.proto");

    // Compile protobuf when server or client feature is enabled
    #[cfg(any(feature = "server", feature = "client"))]
    {
        let proto_file = "proto/muninn.proto";
        if std::path::Path::new(proto_file).exists() {
            tonic_build::configure()
                .build_server(cfg!(feature = "server"))
                .build_client(cfg!(feature = "client"))
                .compile_protos(&[proto_file], &["proto"])?;
        }
    }

    Ok(())
}
