use crate::admin::{AdminError, RabbitAdmin};
use crate::dtos::{Message, QueueInfo, DEFAULT_VHOST};
use crate::drain::{DrainError, DrainOptions, Drainer};
use anyhow::Context;
use log::info;
use std::time::Duration;
use testcontainers::core::ContainerRequest;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::rabbitmq::RabbitMq;

const AMQP_PORT: u16 = 5672;
const MANAGEMENT_PORT: u16 = 15672;

/// An ephemeral RabbitMQ broker with the management plugin enabled. Holds
/// the container handle for its lifetime, the two derived endpoint URIs and
/// a [`RabbitAdmin`] against the management one. Dropping it tears the
/// container down.
pub struct RabbitContainer {
    _container: ContainerAsync<RabbitMq>,
    amqp_uri: String,
    admin_uri: String,
    admin: RabbitAdmin,
}

impl RabbitContainer {
    /// Starts the default management image and waits for the management
    /// port to accept connections.
    pub async fn start() -> anyhow::Result<Self> {
        Self::launch(RabbitMq::default().into()).await
    }

    /// Same as [`Self::start`] with an image tag override.
    pub async fn start_with_tag(tag: &str) -> anyhow::Result<Self> {
        Self::launch(RabbitMq::default().with_tag(tag)).await
    }

    async fn launch(request: ContainerRequest<RabbitMq>) -> anyhow::Result<Self> {
        let container = request
            .start()
            .await
            .context("start rabbitmq container")?;
        let host = container
            .get_host()
            .await
            .context("resolve rabbitmq container host")?;
        let amqp_port = container
            .get_host_port_ipv4(AMQP_PORT)
            .await
            .context("map amqp port")?;
        let management_port = container
            .get_host_port_ipv4(MANAGEMENT_PORT)
            .await
            .context("map management port")?;

        wait_for_listen(&host.to_string(), management_port).await?;

        let amqp_uri = format!("amqp://guest:guest@{host}:{amqp_port}");
        let admin_uri = format!("http://guest:guest@{host}:{management_port}/api");
        let admin = RabbitAdmin::new(&admin_uri).context("construct management client")?;

        info!("rabbitmq up, amqp at {host}:{amqp_port}, management at {host}:{management_port}");

        Ok(Self {
            _container: container,
            amqp_uri,
            admin_uri,
            admin,
        })
    }

    /// Connection URI for the broker's native protocol port; hand this to
    /// the system under test.
    pub fn amqp_uri(&self) -> &str {
        &self.amqp_uri
    }

    /// Management API endpoint, credentials included.
    pub fn admin_uri(&self) -> &str {
        &self.admin_uri
    }

    pub fn admin(&self) -> &RabbitAdmin {
        &self.admin
    }

    /// Drains every currently-ready message from `queue` on the root vhost.
    pub async fn drain_all(&self, queue: &str) -> Result<Vec<Message>, DrainError> {
        Drainer::new(&self.admin).drain_all(queue).await
    }

    /// Waits until `queue` has yielded at least `count` messages or the
    /// default wait window closes; see [`Drainer::await_messages`].
    pub async fn await_messages(
        &self,
        queue: &str,
        count: usize,
    ) -> Result<Vec<Message>, DrainError> {
        Drainer::new(&self.admin).await_messages(queue, count).await
    }

    /// [`Self::await_messages`] with explicit polling options.
    pub async fn await_messages_with(
        &self,
        queue: &str,
        count: usize,
        options: DrainOptions,
    ) -> Result<Vec<Message>, DrainError> {
        Drainer::with_options(&self.admin, options)
            .await_messages(queue, count)
            .await
    }

    pub async fn purge(&self, queue: &str) -> Result<(), AdminError> {
        self.admin.purge(queue, DEFAULT_VHOST).await
    }

    pub async fn queue_info(&self, queue: &str) -> Result<QueueInfo, AdminError> {
        self.admin.queue_info(queue, DEFAULT_VHOST).await
    }

    pub async fn publish(&self, routing_key: &str, body: &str) -> Result<(), AdminError> {
        self.admin.publish(routing_key, DEFAULT_VHOST, body).await
    }
}

async fn wait_for_listen(host: &str, port: u16) -> anyhow::Result<()> {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        match tokio::net::TcpStream::connect((host, port)).await {
            Ok(_) => return Ok(()),
            Err(e) => {
                if std::time::Instant::now() >= deadline {
                    anyhow::bail!("port {host}:{port} never accepted a connection: {e}");
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}
