use std::path::Path;

#[test]
fn success_expands_without_a_tracing_dependency() {
    // This crate does not depend on `tracing` itself.
    let path = Path::new("cache/ping_results.txt");
    sweepr_common::success!("Results recorded in {}", path.display());
}
