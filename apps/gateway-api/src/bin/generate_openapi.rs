use std::fs;
use std::path::Path;

use utoipa::OpenApi;

use gateway_api::routes::ApiDoc;

fn main() {
    let doc = ApiDoc::openapi();
    let json = doc
        .to_pretty_json()
        .expect("failed to serialize OpenAPI document");

    let out = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../specs/gateway-api.json");
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent).expect("failed to create specs directory");
    }
    fs::write(&out, json).expect("failed to write OpenAPI document");
    println!("Wrote {}", out.display());
}
