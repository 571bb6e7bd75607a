//! 后台任务：定期清理上传中断遗留的暂存文件。

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::STAGED_SWEEP_INTERVAL_SECS;
use crate::repository::ImageRepository;

/// 启动暂存文件清理任务，`ttl` 为 0 时不启动。
pub fn spawn_background_tasks(repository: Arc<ImageRepository>, ttl: Duration) {
    if ttl.is_zero() {
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(STAGED_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match repository.sweep_staged(ttl).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "removed stale staged uploads"),
                Err(err) => warn!(error = %err, "staged upload sweep failed"),
            }
        }
    });
}
