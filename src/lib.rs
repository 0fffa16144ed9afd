//! MQTT-SN publishing client
//!
//! Publishes a single message to an MQTT-SN gateway over UDP and exits.
//!
//! # Overview
//!
//! - [`protocol`] - packet types, flags, return codes and the datagram codec
//! - [`transport`] - the [`Transport`](transport::Transport) trait and its UDP implementation
//! - [`session`] - the publish state machine and the orchestrator driving it
//! - [`config`] - TOML defaults and command-line validation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mqtt_sn_pub::config::{ClientConfig, PublishOptions};
//!
//! let options = PublishOptions {
//!     message: Some("21.5".to_string()),
//!     topic_name: Some("sensors/temp".to_string()),
//!     ..Default::default()
//! };
//!
//! let report = tokio_test::block_on(mqtt_sn_pub::publish(options, &ClientConfig::default()))
//!     .expect("publish failed");
//! println!("published to {}", report.topic);
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{ClientConfig, PublishOptions, SessionConfig};
pub use error::{ClientError, ClientResult};
pub use protocol::*;
pub use session::{RetryPolicy, Session, SessionReport};
pub use transport::{Transport, UdpTransport};

/// Validate `options`, open a UDP transport to the gateway and run one session
pub async fn publish(
    options: PublishOptions,
    config: &ClientConfig,
) -> ClientResult<SessionReport> {
    let session_config = SessionConfig::resolve(options, config)?;

    let transport = UdpTransport::connect(
        session_config.host(),
        session_config.port(),
        config.receive_timeout(),
    )
    .await?;

    let report = Session::new(session_config, transport)
        .with_retry(RetryPolicy::from_config(config))
        .with_client_id_prefix(config.session.client_id_prefix.clone())
        .run()
        .await?;
    Ok(report)
}
