use std::path::Path;

use anyhow::bail;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

pub async fn read_io_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<u8>> {
    let path = path.as_ref();
    if !path.exists() {
        bail!("Tried to read nonexistent file {}!", path.display())
    }
    let mut bytes = Vec::new();
    BufReader::new(File::open(path).await?)
        .read_to_end(&mut bytes)
        .await?;
    Ok(bytes)
}
