use std::path::PathBuf;

use qosgen_common::document::load_document;
use qosgen_core::{Inventory, LatencyPolicy};
use tracing::Span;

pub fn path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}

pub fn inventory() -> anyhow::Result<Inventory> {
    let document = load_document(path("inventory.yaml"))?;
    Ok(Inventory::from_value(document, Span::none())?)
}

pub fn policy() -> anyhow::Result<LatencyPolicy> {
    Ok(LatencyPolicy::from_value(load_document(path("latency.yaml"))?)?)
}
