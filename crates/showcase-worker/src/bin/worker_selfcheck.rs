use std::path::Path;

use showcase_media::{check_ffmpeg, check_ffprobe};
use showcase_store::{StoreBackend, StoreConfig};
use showcase_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();
    let store = StoreConfig::from_env()?;

    println!(
        "worker-selfcheck: starting with media_root={}",
        config.media_root.display()
    );
    ensure_dir(&config.media_root).await?;
    if store.backend == StoreBackend::Fs {
        ensure_dir(&store.sessions_dir).await?;
    }

    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    println!(
        "worker-selfcheck: ffmpeg={} ffprobe={}",
        ffmpeg.display(),
        ffprobe.display()
    );

    ensure_env_present(&["REDIS_URL"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
