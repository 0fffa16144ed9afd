//! Pure session state machine
//!
//! [`SessionFlow::dispatch`] maps `(state, event)` to the next state or a
//! fatal [`SessionError`]. It performs no I/O; the orchestrator feeds it
//! whatever the transport produced and acts on the state it lands in.
//!
//! ```text
//! Init -> Connecting -> [WillTopic -> WillMessage ->] Connected
//!      -> TopicResolving -> Publishing -> (PublishRetry -> Publishing)*
//!      -> Disconnecting -> Done
//! ```
//!
//! QoS -1 goes from `Init` straight to `TopicResolving` and from
//! `Publishing` straight to `Done`. `Failed` is entered by the orchestrator
//! whenever dispatch returns an error.

use super::retry::RetryPolicy;
use super::SessionError;
use crate::protocol::{Packet, PacketType, Qos};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    /// CONNECT sent, waiting for CONNACK or WILLTOPICREQ
    Connecting,
    /// WILLTOPICREQ received; WILLTOPIC goes out, WILLMSGREQ expected back
    WillTopic,
    /// WILLMSGREQ received; WILLMSG goes out, CONNACK expected back
    WillMessage,
    Connected,
    TopicResolving,
    /// `attempt` counts PUBLISH sends, starting at 1
    Publishing { attempt: u32 },
    /// Attempt `attempt` was not acknowledged; waiting out the backoff
    PublishRetry { attempt: u32 },
    Disconnecting,
    Done,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }
}

/// Something that happened which the state machine must react to
#[derive(Debug, Clone, Copy)]
pub enum SessionEvent<'a> {
    Start,
    /// Reply during the connect handshake or to DISCONNECT; `None` means nothing arrived
    Received(Option<&'a Packet>),
    ResolveTopic,
    /// Predefined or short topic, no gateway round-trip
    TopicResolvedLocally,
    RegisterReply {
        reply: Option<&'a Packet>,
        msg_id: u16,
    },
    /// PUBLISH sent at a QoS that expects no acknowledgment
    PublishSent,
    PublishReply {
        reply: Option<&'a Packet>,
        msg_id: u16,
    },
    BackoffElapsed,
}

impl SessionEvent<'_> {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Start => "start",
            SessionEvent::Received(_) => "received",
            SessionEvent::ResolveTopic => "resolve-topic",
            SessionEvent::TopicResolvedLocally => "topic-resolved-locally",
            SessionEvent::RegisterReply { .. } => "register-reply",
            SessionEvent::PublishSent => "publish-sent",
            SessionEvent::PublishReply { .. } => "publish-reply",
            SessionEvent::BackoffElapsed => "backoff-elapsed",
        }
    }
}

/// Non-fatal conditions reported alongside a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionWarning {
    /// A QoS 1 PUBLISH attempt got no matching PUBACK and will be retried
    PublishNotAcked { attempt: u32, max_retries: u32 },
    /// The PUBLISH was acknowledged, but only after `attempts` sends
    PublishNeededRetries { attempts: u32 },
    RegAckMessageIdMismatch { expected: u16, received: u16 },
    DisconnectNotAcked,
}

impl fmt::Display for SessionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionWarning::PublishNotAcked {
                attempt,
                max_retries,
            } => write!(
                f,
                "QoS 1 and send not acked, retrying ({attempt}/{max_retries})"
            ),
            SessionWarning::PublishNeededRetries { attempts } => {
                write!(f, "send required {attempts} attempts, but was successful")
            }
            SessionWarning::RegAckMessageIdMismatch { expected, received } => write!(
                f,
                "message id in REGACK ({received}) does not equal message id sent ({expected})"
            ),
            SessionWarning::DisconnectNotAcked => f.write_str("DISCONNECT not acked"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SessionState,
    pub warning: Option<SessionWarning>,
}

impl Transition {
    fn to(state: SessionState) -> Self {
        Self {
            state,
            warning: None,
        }
    }

    fn warn(state: SessionState, warning: SessionWarning) -> Self {
        Self {
            state,
            warning: Some(warning),
        }
    }
}

/// Transition rules for one session's QoS and will settings
#[derive(Debug, Clone, Copy)]
pub struct SessionFlow {
    qos: Qos,
    with_will: bool,
    retry: RetryPolicy,
}

impl SessionFlow {
    pub fn new(qos: Qos, with_will: bool, retry: RetryPolicy) -> Self {
        Self {
            qos,
            with_will,
            retry,
        }
    }

    pub fn dispatch(
        &self,
        state: SessionState,
        event: SessionEvent<'_>,
    ) -> Result<Transition, SessionError> {
        use SessionEvent as E;
        use SessionState as S;

        match (state, event) {
            (S::Init, E::Start) if self.qos.needs_session() => Ok(Transition::to(S::Connecting)),
            (S::Init, E::Start) => Ok(Transition::to(S::TopicResolving)),

            (S::Connecting, E::Received(reply)) if self.with_will => match reply {
                Some(Packet::WillTopicReq) => Ok(Transition::to(S::WillTopic)),
                other => Err(unexpected(PacketType::WillTopicReq, other)),
            },
            (S::Connecting, E::Received(reply)) => connack(reply),
            (S::WillTopic, E::Received(reply)) => match reply {
                Some(Packet::WillMsgReq) => Ok(Transition::to(S::WillMessage)),
                other => Err(unexpected(PacketType::WillMsgReq, other)),
            },
            (S::WillMessage, E::Received(reply)) => connack(reply),

            (S::Connected, E::ResolveTopic) => Ok(Transition::to(S::TopicResolving)),

            (S::TopicResolving, E::TopicResolvedLocally) => {
                Ok(Transition::to(S::Publishing { attempt: 1 }))
            }
            (S::TopicResolving, E::RegisterReply { reply, msg_id }) if self.qos.needs_session() => {
                match reply {
                    Some(Packet::RegAck { return_code, .. }) if !return_code.is_accepted() => {
                        Err(SessionError::Rejected {
                            packet: PacketType::RegAck,
                            code: *return_code,
                        })
                    }
                    Some(Packet::RegAck {
                        msg_id: received, ..
                    }) if *received != msg_id => Ok(Transition::warn(
                        S::Publishing { attempt: 1 },
                        SessionWarning::RegAckMessageIdMismatch {
                            expected: msg_id,
                            received: *received,
                        },
                    )),
                    Some(Packet::RegAck { .. }) => Ok(Transition::to(S::Publishing { attempt: 1 })),
                    other => Err(unexpected(PacketType::RegAck, other)),
                }
            }

            (S::Publishing { .. }, E::PublishSent) if !self.qos.expects_ack() => {
                if self.qos.needs_session() {
                    Ok(Transition::to(S::Disconnecting))
                } else {
                    Ok(Transition::to(S::Done))
                }
            }
            (S::Publishing { attempt }, E::PublishReply { reply, msg_id })
                if self.qos.expects_ack() =>
            {
                if is_puback_for(reply, msg_id) {
                    if attempt > 1 {
                        Ok(Transition::warn(
                            S::Disconnecting,
                            SessionWarning::PublishNeededRetries { attempts: attempt },
                        ))
                    } else {
                        Ok(Transition::to(S::Disconnecting))
                    }
                } else if attempt < self.retry.max_attempts() {
                    Ok(Transition::warn(
                        S::PublishRetry { attempt },
                        SessionWarning::PublishNotAcked {
                            attempt,
                            max_retries: self.retry.max_retries,
                        },
                    ))
                } else {
                    Err(SessionError::PublishNotAcked { attempts: attempt })
                }
            }
            (S::PublishRetry { attempt }, E::BackoffElapsed) => Ok(Transition::to(S::Publishing {
                attempt: attempt + 1,
            })),

            (S::Disconnecting, E::Received(Some(Packet::Disconnect { .. }))) => {
                Ok(Transition::to(S::Done))
            }
            (S::Disconnecting, E::Received(_)) => Ok(Transition::warn(
                S::Done,
                SessionWarning::DisconnectNotAcked,
            )),

            (state, event) => Err(SessionError::InvalidTransition {
                state,
                event: event.name(),
            }),
        }
    }
}

fn connack(reply: Option<&Packet>) -> Result<Transition, SessionError> {
    match reply {
        Some(Packet::ConnAck { return_code }) if return_code.is_accepted() => {
            Ok(Transition::to(SessionState::Connected))
        }
        Some(Packet::ConnAck { return_code }) => Err(SessionError::Rejected {
            packet: PacketType::ConnAck,
            code: *return_code,
        }),
        other => Err(unexpected(PacketType::ConnAck, other)),
    }
}

fn is_puback_for(reply: Option<&Packet>, msg_id: u16) -> bool {
    matches!(
        reply,
        Some(Packet::PubAck { msg_id: acked, return_code, .. })
            if *acked == msg_id && return_code.is_accepted()
    )
}

fn unexpected(expected: PacketType, received: Option<&Packet>) -> SessionError {
    SessionError::UnexpectedPacket {
        expected,
        received: received.map(Packet::type_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ReturnCode;
    use std::time::Duration;

    fn flow(qos: Qos) -> SessionFlow {
        SessionFlow::new(qos, qos == Qos::AtLeastOnce, RetryPolicy::default())
    }

    fn puback(msg_id: u16, return_code: ReturnCode) -> Packet {
        Packet::PubAck {
            topic_id: 1,
            msg_id,
            return_code,
        }
    }

    const CONNACK_OK: Packet = Packet::ConnAck {
        return_code: ReturnCode::Accepted,
    };

    #[test]
    fn test_start_depends_on_qos() {
        let next = |qos| flow(qos).dispatch(SessionState::Init, SessionEvent::Start);
        assert_eq!(
            next(Qos::FireAndForget).unwrap().state,
            SessionState::TopicResolving
        );
        assert_eq!(next(Qos::AtMostOnce).unwrap().state, SessionState::Connecting);
        assert_eq!(next(Qos::AtLeastOnce).unwrap().state, SessionState::Connecting);
    }

    #[test]
    fn test_plain_connect_needs_connack() {
        let flow = flow(Qos::AtMostOnce);
        let ok = flow
            .dispatch(SessionState::Connecting, SessionEvent::Received(Some(&CONNACK_OK)))
            .unwrap();
        assert_eq!(ok.state, SessionState::Connected);

        let silent = flow.dispatch(SessionState::Connecting, SessionEvent::Received(None));
        assert!(matches!(
            silent,
            Err(SessionError::UnexpectedPacket {
                expected: PacketType::ConnAck,
                received: None
            })
        ));

        let wrong = flow.dispatch(
            SessionState::Connecting,
            SessionEvent::Received(Some(&Packet::WillTopicReq)),
        );
        assert!(matches!(
            wrong,
            Err(SessionError::UnexpectedPacket {
                expected: PacketType::ConnAck,
                received: Some("WILLTOPICREQ")
            })
        ));
    }

    #[test]
    fn test_rejected_connack() {
        let rejected = Packet::ConnAck {
            return_code: ReturnCode::Congestion,
        };
        let result = flow(Qos::AtMostOnce)
            .dispatch(SessionState::Connecting, SessionEvent::Received(Some(&rejected)));
        assert!(matches!(
            result,
            Err(SessionError::Rejected {
                packet: PacketType::ConnAck,
                code: ReturnCode::Congestion
            })
        ));
    }

    #[test]
    fn test_will_handshake_order() {
        let flow = flow(Qos::AtLeastOnce);

        let state = flow
            .dispatch(
                SessionState::Connecting,
                SessionEvent::Received(Some(&Packet::WillTopicReq)),
            )
            .unwrap()
            .state;
        assert_eq!(state, SessionState::WillTopic);

        let state = flow
            .dispatch(state, SessionEvent::Received(Some(&Packet::WillMsgReq)))
            .unwrap()
            .state;
        assert_eq!(state, SessionState::WillMessage);

        let state = flow
            .dispatch(state, SessionEvent::Received(Some(&CONNACK_OK)))
            .unwrap()
            .state;
        assert_eq!(state, SessionState::Connected);
    }

    #[test]
    fn test_will_handshake_names_missing_packet() {
        let flow = flow(Qos::AtLeastOnce);

        let skipped_topic_request = flow.dispatch(
            SessionState::Connecting,
            SessionEvent::Received(Some(&CONNACK_OK)),
        );
        assert!(matches!(
            skipped_topic_request,
            Err(SessionError::UnexpectedPacket {
                expected: PacketType::WillTopicReq,
                received: Some("CONNACK")
            })
        ));

        let skipped_message_request =
            flow.dispatch(SessionState::WillTopic, SessionEvent::Received(Some(&CONNACK_OK)));
        assert!(matches!(
            skipped_message_request,
            Err(SessionError::UnexpectedPacket {
                expected: PacketType::WillMsgReq,
                ..
            })
        ));

        let silent_after_will =
            flow.dispatch(SessionState::WillMessage, SessionEvent::Received(None));
        assert!(matches!(
            silent_after_will,
            Err(SessionError::UnexpectedPacket {
                expected: PacketType::ConnAck,
                received: None
            })
        ));
    }

    #[test]
    fn test_register_reply() {
        let flow = flow(Qos::AtMostOnce);
        let regack = |msg_id, return_code| Packet::RegAck {
            topic_id: 9,
            msg_id,
            return_code,
        };

        let ok = flow
            .dispatch(
                SessionState::TopicResolving,
                SessionEvent::RegisterReply {
                    reply: Some(&regack(1, ReturnCode::Accepted)),
                    msg_id: 1,
                },
            )
            .unwrap();
        assert_eq!(ok, Transition::to(SessionState::Publishing { attempt: 1 }));

        let mismatched = flow
            .dispatch(
                SessionState::TopicResolving,
                SessionEvent::RegisterReply {
                    reply: Some(&regack(4, ReturnCode::Accepted)),
                    msg_id: 1,
                },
            )
            .unwrap();
        assert_eq!(
            mismatched.warning,
            Some(SessionWarning::RegAckMessageIdMismatch {
                expected: 1,
                received: 4
            })
        );

        let rejected = flow.dispatch(
            SessionState::TopicResolving,
            SessionEvent::RegisterReply {
                reply: Some(&regack(1, ReturnCode::InvalidTopicId)),
                msg_id: 1,
            },
        );
        assert!(matches!(
            rejected,
            Err(SessionError::Rejected {
                packet: PacketType::RegAck,
                code: ReturnCode::InvalidTopicId
            })
        ));

        let missing = flow.dispatch(
            SessionState::TopicResolving,
            SessionEvent::RegisterReply {
                reply: None,
                msg_id: 1,
            },
        );
        assert!(matches!(
            missing,
            Err(SessionError::UnexpectedPacket {
                expected: PacketType::RegAck,
                ..
            })
        ));
    }

    #[test]
    fn test_registration_is_never_valid_without_session() {
        let result = flow(Qos::FireAndForget).dispatch(
            SessionState::TopicResolving,
            SessionEvent::RegisterReply {
                reply: None,
                msg_id: 1,
            },
        );
        assert!(matches!(result, Err(SessionError::InvalidTransition { .. })));
    }

    #[test]
    fn test_fire_and_forget_publish_ends_session() {
        let publishing = SessionState::Publishing { attempt: 1 };
        assert_eq!(
            flow(Qos::FireAndForget)
                .dispatch(publishing, SessionEvent::PublishSent)
                .unwrap()
                .state,
            SessionState::Done
        );
        assert_eq!(
            flow(Qos::AtMostOnce)
                .dispatch(publishing, SessionEvent::PublishSent)
                .unwrap()
                .state,
            SessionState::Disconnecting
        );
        assert!(flow(Qos::AtLeastOnce)
            .dispatch(publishing, SessionEvent::PublishSent)
            .is_err());
    }

    #[test]
    fn test_puback_must_match_and_be_accepted() {
        let flow = flow(Qos::AtLeastOnce);
        let publishing = SessionState::Publishing { attempt: 1 };
        let reply = |packet: &Packet| {
            flow.dispatch(
                publishing,
                SessionEvent::PublishReply {
                    reply: Some(packet),
                    msg_id: 2,
                },
            )
            .unwrap()
            .state
        };

        assert_eq!(
            reply(&puback(2, ReturnCode::Accepted)),
            SessionState::Disconnecting
        );
        assert_eq!(
            reply(&puback(3, ReturnCode::Accepted)),
            SessionState::PublishRetry { attempt: 1 }
        );
        assert_eq!(
            reply(&puback(2, ReturnCode::Congestion)),
            SessionState::PublishRetry { attempt: 1 }
        );
        assert_eq!(reply(&Packet::PingResp), SessionState::PublishRetry { attempt: 1 });
    }

    #[test]
    fn test_retry_budget() {
        let flow = flow(Qos::AtLeastOnce);
        let mut state = SessionState::Publishing { attempt: 1 };
        let mut sends = 0;

        let error = loop {
            sends += 1;
            match flow.dispatch(
                state,
                SessionEvent::PublishReply {
                    reply: None,
                    msg_id: 1,
                },
            ) {
                Ok(transition) => {
                    assert!(matches!(
                        transition.warning,
                        Some(SessionWarning::PublishNotAcked { .. })
                    ));
                    state = flow
                        .dispatch(transition.state, SessionEvent::BackoffElapsed)
                        .unwrap()
                        .state;
                }
                Err(e) => break e,
            }
        };

        assert_eq!(sends, 11);
        assert!(matches!(error, SessionError::PublishNotAcked { attempts: 11 }));
    }

    #[test]
    fn test_late_ack_warns_about_extra_attempts() {
        let transition = flow(Qos::AtLeastOnce)
            .dispatch(
                SessionState::Publishing { attempt: 4 },
                SessionEvent::PublishReply {
                    reply: Some(&puback(1, ReturnCode::Accepted)),
                    msg_id: 1,
                },
            )
            .unwrap();
        assert_eq!(transition.state, SessionState::Disconnecting);
        assert_eq!(
            transition.warning,
            Some(SessionWarning::PublishNeededRetries { attempts: 4 })
        );
    }

    #[test]
    fn test_custom_retry_budget() {
        let flow = SessionFlow::new(
            Qos::AtLeastOnce,
            true,
            RetryPolicy {
                max_retries: 0,
                interval: Duration::ZERO,
            },
        );
        let result = flow.dispatch(
            SessionState::Publishing { attempt: 1 },
            SessionEvent::PublishReply {
                reply: None,
                msg_id: 1,
            },
        );
        assert!(matches!(
            result,
            Err(SessionError::PublishNotAcked { attempts: 1 })
        ));
    }

    #[test]
    fn test_disconnect_is_lenient() {
        let flow = flow(Qos::AtMostOnce);
        let acked = flow
            .dispatch(
                SessionState::Disconnecting,
                SessionEvent::Received(Some(&Packet::Disconnect { duration: None })),
            )
            .unwrap();
        assert_eq!(acked, Transition::to(SessionState::Done));

        for reply in [None, Some(&Packet::PingResp)] {
            let unacked = flow
                .dispatch(SessionState::Disconnecting, SessionEvent::Received(reply))
                .unwrap();
            assert_eq!(
                unacked,
                Transition::warn(SessionState::Done, SessionWarning::DisconnectNotAcked)
            );
        }
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        let flow = flow(Qos::AtMostOnce);
        for state in [SessionState::Done, SessionState::Failed] {
            assert!(state.is_terminal());
            assert!(matches!(
                flow.dispatch(state, SessionEvent::Start),
                Err(SessionError::InvalidTransition { .. })
            ));
        }
        assert!(!SessionState::Connected.is_terminal());
    }

    #[test]
    fn test_warning_text() {
        assert_eq!(
            SessionWarning::PublishNeededRetries { attempts: 4 }.to_string(),
            "send required 4 attempts, but was successful"
        );
        assert_eq!(
            SessionWarning::DisconnectNotAcked.to_string(),
            "DISCONNECT not acked"
        );
    }
}
