//! Writing download results to disk for the CLI.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const COPY_BUFFER: usize = 64 * 1024;

/// Resolve `filename` inside `root`, refusing anything that would escape it.
pub fn path_in_root(root: &Path, filename: &str) -> Result<PathBuf> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => Ok(root.join(name)),
        _ => bail!("{filename:?} is outside root path {}", root.display()),
    }
}

/// Copy `reader` into `writer`, reporting the running byte count after every
/// chunk. Returns the total.
pub async fn copy_with_progress<R, W>(
    reader: &mut R,
    writer: &mut W,
    mut on_progress: impl FnMut(u64),
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
        on_progress(total);
    }
    writer.flush().await?;
    Ok(total)
}

/// `12.34MB` style size for progress lines.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2}MB", bytes as f64 / (1024.0 * 1024.0))
}
