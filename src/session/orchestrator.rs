//! Session orchestrator
//!
//! Runs one publish end to end: connect (with the will sub-handshake at
//! QoS 1), topic resolution, publish with bounded retry, disconnect. Every
//! received packet goes through [`SessionFlow::dispatch`]; the orchestrator
//! only performs the I/O the resulting state calls for.
//!
//! The transport is closed on every exit path, successful or not.

use super::retry::{RetryPolicy, Sleeper, TokioSleeper};
use super::state::{SessionEvent, SessionFlow, SessionState, SessionWarning};
use super::SessionError;
use crate::config::{SessionConfig, TopicSpec, WillConfig};
use crate::protocol::{Flags, Packet, Qos, ResolvedTopic};
use crate::session_span;
use crate::transport::{default_client_id, Transport};
use tracing::{debug, info, warn, Instrument};

/// Prefix for generated client ids when no other is configured
pub const DEFAULT_CLIENT_ID_PREFIX: &str = "mqtt-sn-pub";

/// Outcome of a successful session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub topic: ResolvedTopic,
    /// PUBLISH sends, 1 unless QoS 1 needed retries
    pub publish_attempts: u32,
    pub warnings: Vec<SessionWarning>,
    /// Every state the session passed through, starting with `Init`
    pub trace: Vec<SessionState>,
}

impl SessionReport {
    pub fn extra_attempts(&self) -> u32 {
        self.publish_attempts.saturating_sub(1)
    }
}

pub struct Session<T, S = TokioSleeper> {
    config: SessionConfig,
    transport: T,
    sleeper: S,
    retry: RetryPolicy,
    client_id_prefix: String,
    state: SessionState,
    next_msg_id: u16,
    publish_attempts: u32,
    warnings: Vec<SessionWarning>,
    trace: Vec<SessionState>,
    /// CONNECT was acknowledged and no DISCONNECT has been sent yet
    gateway_session_open: bool,
}

impl<T: Transport> Session<T, TokioSleeper> {
    pub fn new(config: SessionConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            sleeper: TokioSleeper,
            retry: RetryPolicy::default(),
            client_id_prefix: DEFAULT_CLIENT_ID_PREFIX.to_string(),
            state: SessionState::Init,
            next_msg_id: 1,
            publish_attempts: 0,
            warnings: Vec::new(),
            trace: vec![SessionState::Init],
            gateway_session_open: false,
        }
    }
}

impl<T: Transport, S: Sleeper> Session<T, S> {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_client_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.client_id_prefix = prefix.into();
        self
    }

    /// Replace the sleeper used between publish attempts
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> Session<T, S2> {
        Session {
            config: self.config,
            transport: self.transport,
            sleeper,
            retry: self.retry,
            client_id_prefix: self.client_id_prefix,
            state: self.state,
            next_msg_id: self.next_msg_id,
            publish_attempts: self.publish_attempts,
            warnings: self.warnings,
            trace: self.trace,
            gateway_session_open: self.gateway_session_open,
        }
    }

    /// Run the session to completion, consuming it
    pub async fn run(self) -> Result<SessionReport, SessionError> {
        let span = session_span!(
            qos = %self.config.qos(),
            host = %self.config.host(),
            port = self.config.port()
        );
        self.run_to_completion().instrument(span).await
    }

    async fn run_to_completion(mut self) -> Result<SessionReport, SessionError> {
        let outcome = self.drive().await;

        if let Err(e) = &outcome {
            debug!(state = ?self.state, error = %e, "Session failed");
            self.enter(SessionState::Failed);
            self.abandon_gateway_session().await;
        }
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Failed to close transport");
        }

        let topic = outcome?;
        Ok(SessionReport {
            topic,
            publish_attempts: self.publish_attempts,
            warnings: self.warnings,
            trace: self.trace,
        })
    }

    async fn drive(&mut self) -> Result<ResolvedTopic, SessionError> {
        self.advance(SessionEvent::Start)?;

        if self.state == SessionState::Connecting {
            self.connect().await?;
            self.advance(SessionEvent::ResolveTopic)?;
        }

        let topic = self.resolve_topic().await?;
        info!(topic = %topic, "Topic resolved");

        self.publish(topic).await?;

        if self.state == SessionState::Disconnecting {
            self.disconnect().await?;
        }
        if !self.state.is_terminal() {
            return Err(SessionError::InvalidTransition {
                state: self.state,
                event: "finish",
            });
        }
        Ok(topic)
    }

    async fn connect(&mut self) -> Result<(), SessionError> {
        let with_will = self.with_will();
        let flags = if with_will {
            Flags::empty().clean_session().will()
        } else {
            Flags::empty().clean_session()
        };
        let client_id = self
            .config
            .client_id()
            .map(str::to_string)
            .unwrap_or_else(|| default_client_id(&self.client_id_prefix));

        debug!(client_id = %client_id, with_will, "Connecting to gateway");
        self.transport
            .send(&Packet::Connect {
                flags,
                duration: self.config.keep_alive_secs(),
                client_id,
            })
            .await?;

        while self.state != SessionState::Connected {
            match self.state {
                SessionState::WillTopic => self.send_will_topic().await?,
                SessionState::WillMessage => self.send_will_message().await?,
                _ => {}
            }
            let reply = self.transport.receive().await?;
            self.advance(SessionEvent::Received(reply.as_ref()))?;
        }

        self.gateway_session_open = true;
        info!("Connected to gateway");
        Ok(())
    }

    async fn send_will_topic(&mut self) -> Result<(), SessionError> {
        let topic = self.will()?.topic.clone();
        let flags = Flags::empty().qos(Qos::AtLeastOnce).retain(true);
        self.transport
            .send(&Packet::WillTopic { flags, topic })
            .await?;
        Ok(())
    }

    async fn send_will_message(&mut self) -> Result<(), SessionError> {
        let payload = self.will()?.payload.clone();
        self.transport.send(&Packet::WillMsg { payload }).await?;
        Ok(())
    }

    /// QoS 1 always runs the will exchange
    fn with_will(&self) -> bool {
        self.config.qos() == Qos::AtLeastOnce
    }

    fn will(&self) -> Result<&WillConfig, SessionError> {
        self.config.will().ok_or(SessionError::InvalidTransition {
            state: self.state,
            event: "send-will",
        })
    }

    async fn resolve_topic(&mut self) -> Result<ResolvedTopic, SessionError> {
        let (local, name) = match self.config.topic() {
            TopicSpec::Predefined(id) => (Some(ResolvedTopic::predefined(*id)), None),
            TopicSpec::Named(name) => (ResolvedTopic::short(name), Some(name.clone())),
        };
        if let Some(topic) = local {
            self.advance(SessionEvent::TopicResolvedLocally)?;
            return Ok(topic);
        }

        // QoS -1 has no gateway session to register in
        let Some(name) = name.filter(|_| self.config.qos().needs_session()) else {
            return Err(SessionError::InvalidTransition {
                state: self.state,
                event: "register",
            });
        };

        let msg_id = self.next_message_id();
        debug!(topic_name = %name, msg_id, "Registering topic");
        self.transport
            .send(&Packet::Register {
                topic_id: 0,
                msg_id,
                topic_name: name,
            })
            .await?;

        let reply = self.transport.receive().await?;
        self.advance(SessionEvent::RegisterReply {
            reply: reply.as_ref(),
            msg_id,
        })?;

        match reply {
            Some(Packet::RegAck { topic_id, .. }) => Ok(ResolvedTopic::registered(topic_id)),
            _ => Err(SessionError::InvalidTransition {
                state: self.state,
                event: "register-reply",
            }),
        }
    }

    async fn publish(&mut self, topic: ResolvedTopic) -> Result<(), SessionError> {
        let qos = self.config.qos();
        let msg_id = self.next_message_id();
        let packet = Packet::Publish {
            flags: Flags::empty()
                .retain(self.config.retain())
                .qos(qos)
                .topic_id_kind(topic.kind),
            topic_id: topic.id,
            msg_id,
            payload: self.config.payload().clone(),
        };

        while let SessionState::Publishing { attempt } = self.state {
            debug!(attempt, msg_id, "Sending PUBLISH");
            self.transport.send(&packet).await?;
            self.publish_attempts = attempt;

            if !qos.expects_ack() {
                self.advance(SessionEvent::PublishSent)?;
                break;
            }

            let reply = self.transport.receive().await?;
            self.advance(SessionEvent::PublishReply {
                reply: reply.as_ref(),
                msg_id,
            })?;

            if let SessionState::PublishRetry { .. } = self.state {
                self.sleeper.sleep(self.retry.interval).await;
                self.advance(SessionEvent::BackoffElapsed)?;
            }
        }

        info!(
            topic = %topic,
            attempts = self.publish_attempts,
            bytes = self.config.payload().len(),
            "Published"
        );
        Ok(())
    }

    /// A missing or wrong DISCONNECT reply only produces a warning
    async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.gateway_session_open = false;

        let reply = match self.transport.send(&Packet::Disconnect { duration: None }).await {
            Ok(()) => match self.transport.receive().await {
                Ok(reply) => reply,
                Err(e) => {
                    debug!(error = %e, "Receive failed while waiting for DISCONNECT");
                    None
                }
            },
            Err(e) => {
                debug!(error = %e, "Failed to send DISCONNECT");
                None
            }
        };

        self.advance(SessionEvent::Received(reply.as_ref()))
    }

    /// Best-effort DISCONNECT after a fatal error; no reply is awaited
    async fn abandon_gateway_session(&mut self) {
        if !self.gateway_session_open {
            return;
        }
        self.gateway_session_open = false;
        if let Err(e) = self
            .transport
            .send(&Packet::Disconnect { duration: None })
            .await
        {
            debug!(error = %e, "Best-effort DISCONNECT failed");
        }
    }

    fn advance(&mut self, event: SessionEvent<'_>) -> Result<(), SessionError> {
        let flow = SessionFlow::new(self.config.qos(), self.with_will(), self.retry);
        let transition = flow.dispatch(self.state, event)?;

        if let Some(warning) = transition.warning {
            warn!("{warning}");
            self.warnings.push(warning);
        }
        self.enter(transition.state);
        Ok(())
    }

    fn enter(&mut self, state: SessionState) {
        debug!(from = ?self.state, to = ?state, "Session state transition");
        self.state = state;
        self.trace.push(state);
    }

    fn next_message_id(&mut self) -> u16 {
        let id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.checked_add(1).unwrap_or(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, PublishOptions};
    use crate::protocol::{ReturnCode, TopicIdKind};
    use crate::testing::mocks::{MockTransport, RecordingSleeper};
    use std::time::Duration;

    fn options(topic: TopicSpec, qos: Qos) -> PublishOptions {
        let (topic_name, topic_id) = match topic {
            TopicSpec::Named(name) => (Some(name), None),
            TopicSpec::Predefined(id) => (None, Some(id)),
        };
        let with_will = qos == Qos::AtLeastOnce;
        PublishOptions {
            client_id: Some("tester".to_string()),
            message: Some("21.5".to_string()),
            qos: qos.level(),
            topic_name,
            topic_id,
            will_topic: with_will.then(|| "status/tester".to_string()),
            will_message: with_will.then(|| "gone".to_string()),
            ..Default::default()
        }
    }

    fn config(topic: TopicSpec, qos: Qos) -> SessionConfig {
        SessionConfig::resolve(options(topic, qos), &ClientConfig::default()).unwrap()
    }

    fn connack() -> Packet {
        Packet::ConnAck {
            return_code: ReturnCode::Accepted,
        }
    }

    #[test]
    fn test_message_ids_start_at_one_and_skip_zero() {
        let transport = MockTransport::new();
        let mut session = Session::new(
            config(TopicSpec::Predefined(1), Qos::AtMostOnce),
            transport,
        );
        assert_eq!(session.next_message_id(), 1);
        assert_eq!(session.next_message_id(), 2);
        session.next_msg_id = u16::MAX;
        assert_eq!(session.next_message_id(), u16::MAX);
        assert_eq!(session.next_message_id(), 1);
    }

    #[tokio::test]
    async fn test_qos0_registered_topic_trace() {
        let transport = MockTransport::new()
            .reply(connack())
            .reply(Packet::RegAck {
                topic_id: 42,
                msg_id: 1,
                return_code: ReturnCode::Accepted,
            })
            .reply(Packet::Disconnect { duration: None });
        let sent = transport.sent_handle();

        let report = Session::new(
            config(TopicSpec::Named("sensors/temp".to_string()), Qos::AtMostOnce),
            transport,
        )
        .run()
        .await
        .unwrap();

        assert_eq!(report.topic, ResolvedTopic::registered(42));
        assert_eq!(
            report.trace,
            vec![
                SessionState::Init,
                SessionState::Connecting,
                SessionState::Connected,
                SessionState::TopicResolving,
                SessionState::Publishing { attempt: 1 },
                SessionState::Disconnecting,
                SessionState::Done,
            ]
        );
        assert!(report.warnings.is_empty());

        let sent = sent.lock().await;
        match &sent[2] {
            Packet::Publish {
                flags,
                topic_id,
                msg_id,
                ..
            } => {
                assert_eq!(*topic_id, 42);
                assert_eq!(*msg_id, 2);
                assert_eq!(flags.topic_kind(), Some(TopicIdKind::Normal));
                assert_eq!(flags.qos_level(), Qos::AtMostOnce);
            }
            other => panic!("expected PUBLISH, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_sleeps_with_policy_interval() {
        let puback = Packet::PubAck {
            topic_id: 0x4142,
            msg_id: 1,
            return_code: ReturnCode::Accepted,
        };
        let transport = MockTransport::new()
            .reply(Packet::WillTopicReq)
            .reply(Packet::WillMsgReq)
            .reply(connack())
            .silence()
            .reply(puback)
            .reply(Packet::Disconnect { duration: None });
        let sleeper = RecordingSleeper::new();
        let slept = sleeper.slept_handle();

        let report = Session::new(
            config(TopicSpec::Named("AB".to_string()), Qos::AtLeastOnce),
            transport,
        )
        .with_retry(RetryPolicy {
            max_retries: 10,
            interval: Duration::from_millis(1500),
        })
        .with_sleeper(sleeper)
        .run()
        .await
        .unwrap();

        assert_eq!(report.publish_attempts, 2);
        assert_eq!(report.extra_attempts(), 1);
        assert_eq!(*slept.lock().await, vec![Duration::from_millis(1500)]);
    }

    #[tokio::test]
    async fn test_transport_closed_after_failure() {
        let transport = MockTransport::new().silence();
        let closed = transport.closed_handle();

        let result = Session::new(config(TopicSpec::Predefined(5), Qos::AtMostOnce), transport)
            .run()
            .await;

        assert!(matches!(result, Err(SessionError::UnexpectedPacket { .. })));
        assert_eq!(*closed.lock().await, 1);
    }

    #[tokio::test]
    async fn test_generated_client_id_uses_prefix() {
        let transport = MockTransport::new()
            .reply(connack())
            .reply(Packet::Disconnect { duration: None });
        let sent = transport.sent_handle();
        let mut options = options(TopicSpec::Predefined(5), Qos::AtMostOnce);
        options.client_id = None;
        let config = SessionConfig::resolve(options, &ClientConfig::default()).unwrap();

        Session::new(config, transport)
            .with_client_id_prefix("sensor")
            .run()
            .await
            .unwrap();

        match &sent.lock().await[0] {
            Packet::Connect { client_id, .. } => {
                assert_eq!(client_id, &format!("sensor-{}", std::process::id()))
            }
            other => panic!("expected CONNECT, got {other:?}"),
        };
    }

    #[tokio::test]
    async fn test_qos1_connect_always_requests_will_exchange() {
        // a gateway skipping the will exchange is rejected
        let transport = MockTransport::new()
            .reply(connack())
            .reply(Packet::PubAck {
                topic_id: 7,
                msg_id: 1,
                return_code: ReturnCode::Accepted,
            })
            .reply(Packet::Disconnect { duration: None });
        let sent = transport.sent_handle();

        let result = Session::new(config(TopicSpec::Predefined(7), Qos::AtLeastOnce), transport)
            .run()
            .await;

        assert!(matches!(
            result,
            Err(SessionError::UnexpectedPacket {
                expected: crate::protocol::PacketType::WillTopicReq,
                received: Some("CONNACK"),
            })
        ));
        match &sent.lock().await[0] {
            Packet::Connect { flags, .. } => {
                assert!(flags.contains(Flags::CLEAN_SESSION));
                assert!(flags.contains(Flags::WILL));
            }
            other => panic!("expected CONNECT, got {other:?}"),
        };
    }

    #[tokio::test]
    async fn test_qos0_connect_has_no_will_flag() {
        let transport = MockTransport::new()
            .reply(connack())
            .reply(Packet::Disconnect { duration: None });
        let sent = transport.sent_handle();

        Session::new(config(TopicSpec::Predefined(7), Qos::AtMostOnce), transport)
            .run()
            .await
            .unwrap();

        match &sent.lock().await[0] {
            Packet::Connect { flags, .. } => {
                assert!(flags.contains(Flags::CLEAN_SESSION));
                assert!(!flags.contains(Flags::WILL));
            }
            other => panic!("expected CONNECT, got {other:?}"),
        };
    }
}
