//! Test-support infrastructure for systems built on RabbitMQ and Redis:
//! ephemeral containers plus a narrow client for the broker's HTTP
//! management API.
//!
//! The usual flow in an integration test:
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use rmq_testkit::RabbitContainer;
//!
//! let rabbit = RabbitContainer::start().await?;
//! // point the system under test at rabbit.amqp_uri(), let it run, then:
//! let messages = rabbit.await_messages("outbound", 3).await?;
//! assert_eq!(messages.len(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! `await_messages` polls the management API until the target count arrives
//! or its wait window closes; on timeout it returns the short result and
//! leaves the assertion to the test. Container tests require a running
//! Docker daemon.

pub mod admin;
pub mod drain;
pub mod dtos;
pub mod rabbit;
pub mod redis;

pub use admin::{AdminError, BrokerError, RabbitAdmin};
pub use drain::{DrainError, DrainOptions, Drainer, MessageSource};
pub use dtos::{AckMode, GetMessagesRequest, Message, PayloadEncoding, QueueInfo, DEFAULT_VHOST};
pub use rabbit::RabbitContainer;
pub use redis::RedisContainer;
