use futures_util::StreamExt;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::http_client::HttpClient;
use crate::error::{AppError, AppResult};
use crate::utils::paths::partial_path;

/// 一次成功下载的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub path: PathBuf,
    /// 实际写入磁盘的字节数
    pub bytes_written: u64,
    /// 写入内容的 SHA-256（十六进制）
    pub sha256: String,
}

/// 流式下载到文件，边接收边写盘，不在内存中缓存完整内容。
///
/// 数据先写入 `<dest>.downloading`，完整接收后再重命名为 `dest`。
/// 中途失败时临时文件保留原样，由启动时的清理流程删除。
/// 每写入一个非空数据块调用一次 `progress(received, total)`，`total` 未知时为 0。
pub async fn stream_download(
    http: &HttpClient,
    url: &str,
    dest: &Path,
    progress: &(dyn Fn(u64, u64) + Send + Sync),
) -> AppResult<DownloadSummary> {
    let response = http.get(url).await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(AppError::Download {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let total_size = response.content_length().unwrap_or(0);

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let temp_path = partial_path(dest);
    match tokio::fs::remove_file(&temp_path).await {
        Ok(()) => tracing::debug!(path = %temp_path.display(), "删除上次遗留的临时文件"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(AppError::Io(e)),
    }

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .await?;

    let mut hasher = Sha256::new();
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AppError::network(format!("读取数据失败: {e}")))?;
        if chunk.is_empty() {
            continue;
        }
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
        progress(downloaded, total_size);
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if total_size > 0 && downloaded != total_size {
        return Err(AppError::network(format!(
            "连接提前结束: 已接收 {downloaded} / {total_size} 字节"
        )));
    }

    // Windows 上 rename 不会覆盖已有文件
    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        tokio::fs::remove_file(dest).await?;
    }
    tokio::fs::rename(&temp_path, dest).await?;

    Ok(DownloadSummary {
        path: dest.to_path_buf(),
        bytes_written: downloaded,
        sha256: hex::encode(hasher.finalize()),
    })
}
