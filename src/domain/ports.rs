use crate::domain::model::{ChangeReport, DiffResult, Snapshot};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn api_endpoint(&self) -> &str;
    fn username(&self) -> &str;
    fn password(&self) -> &str;
    fn sections(&self) -> &[String];
    fn state_file(&self) -> &str;
    fn request_timeout(&self) -> Duration;
    fn retry_attempts(&self) -> u32;
    fn retry_delay(&self) -> Duration;
    fn request_delay(&self) -> Duration;
    fn min_transcript_year(&self) -> i32;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &ChangeReport) -> Result<()>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot>;
    async fn load_previous(&self) -> Result<Option<Snapshot>>;
    async fn notify(&self, diff: &DiffResult) -> Result<()>;
    async fn persist(&self, snapshot: &Snapshot) -> Result<String>;
}
