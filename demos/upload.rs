//! Multipart upload example
//!
//! Usage: `cargo run --example upload -- <url> <file>`

use formpost::{Config, MultipartRequest};
use std::path::Path;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "https://httpbin.org/post".to_string());
    let file = args.next();

    let config = Config::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build();

    println!("Creating multipart form data...");

    let mut request = MultipartRequest::with_config(config);
    request
        .add_text("field1", "text/plain", "value1")?
        .add_text("field2", "text/plain", "value with spaces")?
        .add_file_bytes("file_field", "text/plain", "test.txt", "This is file content")?;

    if let Some(file) = file {
        let file_name = Path::new(&file)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("file")
            .to_string();
        request.add_file("upload", "application/octet-stream", file_name, &file)?;
    }

    request.set_header("User-Agent", "formpost-demo/0.1.0")?;

    println!("Sending multipart POST request to {}...", url);

    match request.send(url).await {
        Ok(body) => println!("Response body:\n{}", body),
        Err(e) if e.is_network() => {
            eprintln!("Upload failed in transit: {}", e);
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
