fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/order.proto");
    println!("cargo:rerun-if-changed=proto/item.proto");

    // Use the vendored protoc unless the environment names one.
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/order.proto", "proto/item.proto"], &["proto"])?;
    Ok(())
}
