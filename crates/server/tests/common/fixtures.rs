//! Test fixtures.

use async_compression::tokio::write::XzEncoder;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

/// Lowercase hex SHA-256, matching the stored token hash format.
#[allow(dead_code)]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// XZ-compress a corpus file body in memory.
#[allow(dead_code)]
pub async fn xz_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = XzEncoder::new(Vec::new());
    encoder.write_all(data).await.expect("xz write");
    encoder.shutdown().await.expect("xz finish");
    encoder.into_inner()
}

/// A LOC record payload as a scanner would submit it.
#[allow(dead_code)]
pub fn loc_record_json(fqdn: &str, latitude: f64, longitude: f64) -> serde_json::Value {
    serde_json::json!({
        "fqdn": fqdn,
        "raw_record": "52 22 23.000 N 4 53 32.000 E -2.00m 1m 10000m 10m",
        "latitude": latitude,
        "longitude": longitude,
        "altitude_m": -2.0,
        "size_m": 1.0,
        "horiz_prec_m": 10000.0,
        "vert_prec_m": 10.0
    })
}
