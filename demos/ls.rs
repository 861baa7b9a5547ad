//! List a WebDAV collection
//!
//! Prints one line per member: type, size, modification time and name.
//! Credentials are read from `WEBDAV_USER` and `WEBDAV_PASSWORD` when set.
//!
//! Run with: cargo run --example ls -- https://example.org/dav/ [path]

use anyhow::{bail, Context};
use webdav_http::{ClientConfig, Credentials, WebdavClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(base_url) = args.next() else {
        bail!("usage: ls <base-url> [path]");
    };
    let path = args.next().unwrap_or_default();

    let credentials = match (std::env::var("WEBDAV_USER"), std::env::var("WEBDAV_PASSWORD")) {
        (Ok(user), Ok(password)) => Some(Credentials::basic(user, password)),
        _ => None,
    };
    let config = ClientConfig {
        credentials,
        ..Default::default()
    };
    let client = WebdavClient::with_config(&base_url, config)
        .with_context(|| format!("invalid base url {}", base_url))?;

    let entries = client
        .ls(&path)
        .await
        .with_context(|| format!("listing {} failed", client.join_url(&path)))?;

    for entry in entries {
        let kind = if entry.is_dir() { "d" } else { "-" };
        let size = entry.size.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        let modified = entry
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{} {:>12} {:>16} {}", kind, size, modified, entry.name);
    }
    Ok(())
}
