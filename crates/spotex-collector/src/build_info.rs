use spotex_common::error::Result;
use spotex_metrics::{MetricsRegistry, fq_name};

use crate::exporter::NAMESPACE;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Registers the constant `build_info` gauge, labeled with the crate version.
pub fn register_build_info(registry: &MetricsRegistry) -> Result<()> {
    let build_info = registry.register_gauge(
        &fq_name(NAMESPACE, "build_info"),
        "A metric with a constant '1' value labeled by the exporter version.",
        &["version"],
    )?;
    build_info.set(&[VERSION], 1.0);
    Ok(())
}
