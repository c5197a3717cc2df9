//! Build script for storefront crate.
//!
//! Fingerprints the static assets so templates can reference them with a
//! cache-busting query string (`/static/css/main.css?v=<hash>`).

use std::env;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Assets whose content feeds the fingerprint.
const ASSETS: &[&str] = &["static/css/main.css", "static/js/app.js"];

fn main() {
    let manifest_dir =
        env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set by Cargo");

    let mut hasher = Sha256::new();
    for asset in ASSETS {
        let path = Path::new(&manifest_dir).join(asset);
        println!("cargo:rerun-if-changed={}", path.display());

        match fs::read(&path) {
            Ok(content) => hasher.update(&content),
            Err(e) => println!("cargo:warning=Could not read {asset}: {e}"),
        }
    }

    let hash = format!("{:x}", hasher.finalize());
    let short_hash: String = hash.chars().take(10).collect();
    println!("cargo:rustc-env=ASSET_HASH={short_hash}");
}
