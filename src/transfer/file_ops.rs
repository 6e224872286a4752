//! Local file helpers
//!
//! Convenience wrappers around `get`/`put` for transfers that start or end in
//! a file on the local disk.

use std::path::Path;

use log::debug;
use tokio::fs::File;

use crate::client::Session;
use crate::error::{FtpError, FtpResult};
use crate::transfer::TransferMode;

impl Session {
    /// Downloads `remote` into the file at `local`, creating or truncating it.
    /// A partially written file is removed when the transfer fails.
    pub async fn download_to_path(
        &mut self,
        remote: &str,
        local: impl AsRef<Path>,
        mode: TransferMode,
    ) -> FtpResult<u64> {
        let local = local.as_ref();
        let mut file = File::create(local).await.map_err(FtpError::LocalIo)?;

        let result = self.get(remote, &mut file, mode).await;
        if result.is_err() {
            drop(file);
            if let Err(e) = tokio::fs::remove_file(local).await {
                debug!("unable to remove partial download {}: {e}", local.display());
            }
        }
        result
    }

    /// Uploads the file at `local` to `remote`.
    pub async fn upload_from_path(
        &mut self,
        local: impl AsRef<Path>,
        remote: &str,
        mode: TransferMode,
    ) -> FtpResult<u64> {
        let mut file = File::open(local.as_ref())
            .await
            .map_err(FtpError::LocalIo)?;
        self.put(&mut file, remote, mode).await
    }
}
