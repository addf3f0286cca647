//! Transport that delivers into a local directory.

use std::path::{Path, PathBuf};

use relay_engine::{Notice, SendError, SendRequest, TransferObserver, Transport};
use relay_logging::{relay_debug, relay_info};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const FAILED_LINKS_FILE: &str = "failed_links.txt";

/// Copies each artifact into `dir`, with its caption in a `.caption.txt` sidecar.
pub struct DirectoryTransport {
    dir: PathBuf,
    chunk_size: usize,
}

impl DirectoryTransport {
    pub fn new(dir: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            dir: dir.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    async fn copy_with_progress(
        &self,
        source: &Path,
        target: &Path,
        progress: &dyn TransferObserver,
    ) -> std::io::Result<u64> {
        let mut input = File::open(source).await?;
        let total = input.metadata().await?.len();
        let mut output = File::create(target).await?;
        let mut buffer = vec![0u8; self.chunk_size];
        let mut copied = 0u64;
        progress.on_progress(0, Some(total));
        loop {
            let read = input.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            output.write_all(&buffer[..read]).await?;
            copied += read as u64;
            progress.on_progress(copied, Some(total));
        }
        output.flush().await?;
        Ok(copied)
    }

    async fn deliver(
        &self,
        request: &SendRequest<'_>,
        progress: &dyn TransferObserver,
    ) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let name = file_name(request.path)?;
        let target = self.dir.join(&name);
        let bytes = self.copy_with_progress(request.path, &target, progress).await?;

        let mut sidecar = request.caption.to_string();
        if let Some(meta) = request.metadata {
            sidecar.push_str(&format!(
                "\n\n{}x{}, {} s",
                meta.width, meta.height, meta.duration
            ));
        }
        sidecar.push('\n');
        fs::write(self.dir.join(format!("{name}.caption.txt")), sidecar).await?;

        if let Some(thumb) = request.thumbnail {
            fs::copy(thumb, self.dir.join(file_name(thumb)?)).await?;
        }
        relay_info!("Delivered {} ({} bytes) to {}", name, bytes, self.dir.display());
        Ok(())
    }
}

fn file_name(path: &Path) -> std::io::Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            )
        })
}

fn notice_entry(notice: &Notice) -> String {
    match notice {
        Notice::FailedLink {
            ordinal,
            title,
            url,
            kind,
            reason,
        } => format!("{ordinal}. {title}\n{url}\nkind: {kind}\nreason: {reason}\n\n"),
        Notice::ManualAction {
            ordinal,
            title,
            url,
            platform,
        } => format!("{ordinal}. {title}\n{url}\nmanual: {platform}\n\n"),
    }
}

#[async_trait::async_trait]
impl Transport for DirectoryTransport {
    async fn send(
        &self,
        request: SendRequest<'_>,
        progress: &dyn TransferObserver,
    ) -> Result<(), SendError> {
        self.deliver(&request, progress)
            .await
            .map_err(|err| SendError::Failed(err.to_string()))
    }

    async fn send_notice(&self, notice: &Notice) -> Result<(), SendError> {
        let append = async {
            fs::create_dir_all(&self.dir).await?;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(FAILED_LINKS_FILE))
                .await?;
            file.write_all(notice_entry(notice).as_bytes()).await?;
            file.flush().await?;
            Ok::<_, std::io::Error>(())
        };
        append
            .await
            .map_err(|err| SendError::Failed(err.to_string()))?;
        relay_debug!("Notice recorded in {}", self.dir.display());
        Ok(())
    }
}
