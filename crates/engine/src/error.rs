#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No data directory available")]
    NoDataDir,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("请求失败 {}", .0.as_u16())]
    Status(reqwest::StatusCode),

    #[error("{0}")]
    Network(#[from] reqwest::Error),
}
