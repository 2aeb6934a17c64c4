//! Generates the `download.DownloadService` messages and server/client stubs
//! from `proto/download.proto`. protox parses the schema, so no system `protoc`
//! is needed.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/download.proto");

    let descriptors = protox::compile(["download.proto"], ["proto"])?;
    tonic_build::configure()
        .bytes(["."])
        .compile_fds(descriptors)?;

    Ok(())
}
