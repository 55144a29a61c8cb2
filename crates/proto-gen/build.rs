// Build script to compile Protocol Buffer definitions

use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);

    // Compile protobuf files (client stubs and server traits), plus the
    // descriptor set served through gRPC reflection
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .file_descriptor_set_path(out_dir.join("monitoring_descriptor.bin"))
        .compile_protos(&["../../proto/monitoring.proto"], &["../../proto/"])?;

    // Tell Cargo to rerun if proto files change
    println!("cargo:rerun-if-changed=../../proto/monitoring.proto");

    Ok(())
}
