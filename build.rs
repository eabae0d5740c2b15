fn main() {
    // Use vendored protoc so builds don't depend on a system install.
    std::env::set_var("PROTOC", protobuf_src::protoc());

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/plugin.proto"], &["proto"])
        .unwrap_or_else(|e| panic!("failed to compile plugin.proto: {}", e));

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/plugin.proto");
}
