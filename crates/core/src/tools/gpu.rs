//! CUDA availability probe.

use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::info;

static CUDA_AVAILABLE: OnceCell<bool> = OnceCell::const_new();

/// Whether a CUDA device is visible to this machine.
///
/// Probed once per process by asking `nvidia-smi` for the device list; the
/// separators use the answer to pick GPU or CPU mode. A missing or failing
/// `nvidia-smi` simply means CPU.
pub async fn cuda_available() -> bool {
    *CUDA_AVAILABLE
        .get_or_init(|| async {
            let available = probe().await;
            info!(cuda = available, "GPU probe complete");
            available
        })
        .await
}

async fn probe() -> bool {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=name", "--format=csv,noheader"])
        .output()
        .await;

    match output {
        Ok(out) => out.status.success() && !out.stdout.is_empty(),
        Err(_) => false,
    }
}
