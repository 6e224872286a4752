//! RAX FTP Client - Entry Point
//!
//! Connects with the settings from `config.toml` (or `RAX_FTP__*` environment
//! variables), prints a short session summary, and disconnects.

use log::{error, info};

use rax_ftp_client::utils::logging::setup_logging;
use rax_ftp_client::{ClientConfig, FtpClient, FtpResult};

#[tokio::main]
async fn main() {
    setup_logging();

    let config = match ClientConfig::load() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            std::process::exit(2);
        }
    };

    info!("Launching FTP client for {}", config.display_url());

    let client = match FtpClient::connect(config).await {
        Ok(c) => c,
        Err(e) => {
            error!("Connection failed: {e}");
            std::process::exit(1);
        }
    };

    let outcome = summarize(&client).await;
    client.disconnect().await;

    if let Err(e) = outcome {
        error!("Session failed: {e}");
        std::process::exit(1);
    }
}

async fn summarize(client: &FtpClient) -> FtpResult<()> {
    let cwd = client.pwd().await?;
    info!("Working directory: {cwd}");

    let features = client.features().await?;
    if features.is_empty() {
        info!("Server advertises no extensions");
    } else {
        let names: Vec<&str> = features.names().collect();
        info!("Server features: {}", names.join(", "));
    }

    for entry in client.list(None).await? {
        info!("  {entry}");
    }
    Ok(())
}
