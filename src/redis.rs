use anyhow::Context;
use log::info;
use testcontainers::core::ContainerRequest;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::{Redis, REDIS_PORT};

/// An ephemeral Redis instance. Only the connection URI matters here; the
/// system under test does the actual talking.
pub struct RedisContainer {
    _container: ContainerAsync<Redis>,
    connection_uri: String,
}

impl RedisContainer {
    pub async fn start() -> anyhow::Result<Self> {
        Self::launch(Redis::default().into()).await
    }

    pub async fn start_with_tag(tag: &str) -> anyhow::Result<Self> {
        Self::launch(Redis::default().with_tag(tag)).await
    }

    async fn launch(request: ContainerRequest<Redis>) -> anyhow::Result<Self> {
        let container = request.start().await.context("start redis container")?;
        let host = container
            .get_host()
            .await
            .context("resolve redis container host")?;
        let port = container
            .get_host_port_ipv4(REDIS_PORT)
            .await
            .context("map redis port")?;

        let connection_uri = format!("redis://{host}:{port}");
        info!("redis up at {host}:{port}");

        Ok(Self {
            _container: container,
            connection_uri,
        })
    }

    pub fn connection_uri(&self) -> &str {
        &self.connection_uri
    }
}
