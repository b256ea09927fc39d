// Generates the `metrics.Metrics` RPC service stubs.
//
// Messages are hand-written prost structs in `src/rpc/mod.rs`, so only the
// service glue is generated here and no protoc is needed.

fn method(name: &str, route: &str, input: &str, output: &str) -> tonic_build::manual::Method {
    tonic_build::manual::Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::rpc::{}", input))
        .output_type(format!("crate::rpc::{}", output))
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() {
    let service = tonic_build::manual::Service::builder()
        .name("Metrics")
        .package("metrics")
        .method(method(
            "update_metric",
            "UpdateMetric",
            "UpdateMetricRequest",
            "UpdateMetricResponse",
        ))
        .method(method(
            "update_metrics_batch",
            "UpdateMetricsBatch",
            "UpdateMetricsBatchRequest",
            "UpdateMetricsBatchResponse",
        ))
        .method(method("get_metric", "GetMetric", "GetMetricRequest", "GetMetricResponse"))
        .build();

    tonic_build::manual::Builder::new().compile(&[service]);
    println!("cargo:rerun-if-changed=build.rs");
}
