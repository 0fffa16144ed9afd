//! mqtt-sn-pub: publish one message to an MQTT-SN gateway

use clap::{CommandFactory, Parser};
use mqtt_sn_pub::config::{ClientConfig, PublishOptions};
use mqtt_sn_pub::error::ClientError;
use mqtt_sn_pub::observability::init_default_logging;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

/// Publish a message to an MQTT-SN gateway
#[derive(Parser, Debug)]
#[command(name = "mqtt-sn-pub")]
#[command(version)]
#[command(disable_help_flag = true)]
struct Cli {
    /// Enable debug logging with a hex dump of every packet
    #[arg(short = 'd')]
    debug: bool,

    /// MQTT-SN gateway host [default: 127.0.0.1]
    #[arg(short = 'h', value_name = "HOST")]
    host: Option<String>,

    /// Client id [default: mqtt-sn-pub-<pid>]
    #[arg(short = 'i', value_name = "CLIENT_ID")]
    client_id: Option<String>,

    /// Message payload
    #[arg(short = 'm', value_name = "MESSAGE", conflicts_with = "null_message")]
    message: Option<String>,

    /// Send a zero-length (null) message
    #[arg(short = 'n')]
    null_message: bool,

    /// Gateway port [default: 1883]
    #[arg(short = 'p', value_name = "PORT")]
    port: Option<u16>,

    /// Quality of service: -1, 0 or 1
    #[arg(short = 'q', value_name = "QOS", default_value_t = 0, allow_negative_numbers = true)]
    qos: i8,

    /// Ask the gateway to retain the message
    #[arg(short = 'r')]
    retain: bool,

    /// Topic name (two characters are sent as a short topic)
    #[arg(short = 't', value_name = "TOPIC")]
    topic: Option<String>,

    /// Pre-defined topic id
    #[arg(short = 'T', value_name = "TOPIC_ID")]
    topic_id: Option<u16>,

    /// Will topic (QoS 1)
    #[arg(short = 'w', value_name = "WILL_TOPIC")]
    will_topic: Option<String>,

    /// Will message (QoS 1)
    #[arg(short = 'W', value_name = "WILL_MESSAGE")]
    will_message: Option<String>,

    /// Defaults file [default: ./mqtt-sn-pub.toml if present]
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print help
    #[arg(long = "help", action = clap::ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    fn publish_options(self) -> PublishOptions {
        let message = if self.null_message {
            Some(String::new())
        } else {
            self.message
        };

        PublishOptions {
            host: self.host,
            port: self.port,
            client_id: self.client_id,
            message,
            qos: self.qos,
            retain: self.retain,
            topic_name: self.topic,
            topic_id: self.topic_id,
            will_topic: self.will_topic,
            will_message: self.will_message,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.debug);

    let config = match ClientConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => exit_with(ClientError::from(e)),
    };

    match mqtt_sn_pub::publish(cli.publish_options(), &config).await {
        Ok(report) => {
            info!(
                topic = %report.topic,
                attempts = report.publish_attempts,
                "Publish complete"
            );
        }
        Err(e) => exit_with(e),
    }
}

fn exit_with(e: ClientError) -> ! {
    error!("{e}");
    if let Some(usage) = usage_for(&e) {
        eprintln!("{usage}");
    }
    process::exit(e.exit_code());
}

/// Usage text to print after an invalid invocation
fn usage_for(e: &ClientError) -> Option<String> {
    match e {
        ClientError::Config(_) => Some(Cli::command().render_usage().to_string()),
        ClientError::Session(_) | ClientError::Transport(_) => None,
    }
}
