// Build script generating the gRPC service stubs for the gate package.
//
// Messages are declared by hand in src/lib.rs and only the service plumbing
// is generated here, from the method table below. Nothing reads
// proto/gate.proto at build time; it documents the wire contract for
// non-Rust clients.

use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic::codec::ProstCodec";

fn method(
    name: &str,
    route: &str,
    input: &str,
    output: &str,
) -> tonic_build::manual::MethodBuilder {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::gate::{input}"))
        .output_type(format!("crate::gate::{output}"))
        .codec_path(CODEC)
}

fn main() {
    let admin = Service::builder()
        .name("Admin")
        .package("gate")
        .method(
            method("logging", "Logging", "Nothing", "Event")
                .server_streaming()
                .build(),
        )
        .method(
            method("statistics", "Statistics", "StatInterval", "Stat")
                .server_streaming()
                .build(),
        )
        .build();

    let biz = Service::builder()
        .name("Biz")
        .package("gate")
        .method(method("check", "Check", "Nothing", "Nothing").build())
        .method(method("add", "Add", "Nothing", "Nothing").build())
        .method(method("test", "Test", "Nothing", "Nothing").build())
        .build();

    Builder::new().compile(&[admin, biz]);

    println!("cargo:rerun-if-changed=build.rs");
}
