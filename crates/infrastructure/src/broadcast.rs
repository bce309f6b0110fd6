//! 进程内投递中心
//!
//! 所有投递经由一个 `tokio::sync::broadcast` 通道分发，每个连接持有一个
//! 只接收发给自己的消息的流。

use application::{DeliveryError, DeliverySink, StatusChange};
use async_trait::async_trait;
use domain::{ChatMessageDto, ConnectionId, Destination};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryTarget {
    /// 频道内所有连接，可排除一个
    Channel {
        channel: String,
        except: Option<ConnectionId>,
    },
    Connection(ConnectionId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ChatMessageDto),
    Status(StatusChange),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryEnvelope {
    pub target: DeliveryTarget,
    pub payload: Outbound,
}

#[derive(Clone)]
pub struct LocalDeliveryHub {
    sender: broadcast::Sender<DeliveryEnvelope>,
}

impl LocalDeliveryHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 为某个频道中的连接打开接收流
    pub fn subscribe(
        &self,
        channel: impl Into<String>,
        connection_id: ConnectionId,
    ) -> ConnectionStream {
        ConnectionStream {
            receiver: self.sender.subscribe(),
            channel: channel.into(),
            connection_id,
        }
    }

    fn send(&self, envelope: DeliveryEnvelope) -> Result<(), DeliveryError> {
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(envelope)
            .map_err(|err| DeliveryError::failed(err.to_string()))?;
        Ok(())
    }
}

impl Default for LocalDeliveryHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl DeliverySink for LocalDeliveryHub {
    async fn deliver(
        &self,
        channel: &str,
        sender: ConnectionId,
        message: &ChatMessageDto,
        destination: Destination,
    ) -> Result<(), DeliveryError> {
        let target = if destination.contains(Destination::OTHERS) {
            DeliveryTarget::Channel {
                channel: channel.to_string(),
                except: (!destination.contains(Destination::SELF)).then_some(sender),
            }
        } else if destination.contains(Destination::SELF) {
            DeliveryTarget::Connection(sender)
        } else {
            return Ok(());
        };

        self.send(DeliveryEnvelope {
            target,
            payload: Outbound::Message(message.clone()),
        })
    }

    async fn broadcast_status(
        &self,
        channel: &str,
        change: &StatusChange,
    ) -> Result<(), DeliveryError> {
        self.send(DeliveryEnvelope {
            target: DeliveryTarget::Channel {
                channel: channel.to_string(),
                except: None,
            },
            payload: Outbound::Status(change.clone()),
        })
    }

    async fn send_status(
        &self,
        connection_id: ConnectionId,
        change: &StatusChange,
    ) -> Result<(), DeliveryError> {
        self.send(DeliveryEnvelope {
            target: DeliveryTarget::Connection(connection_id),
            payload: Outbound::Status(change.clone()),
        })
    }
}

/// 单个连接的接收流
pub struct ConnectionStream {
    receiver: broadcast::Receiver<DeliveryEnvelope>,
    channel: String,
    connection_id: ConnectionId,
}

impl ConnectionStream {
    pub async fn recv(&mut self) -> Option<Outbound> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => {
                    if self.accepts(&envelope.target) {
                        return Some(envelope.payload);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        connection_id = %self.connection_id,
                        skipped,
                        "Connection stream lagged, deliveries skipped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn accepts(&self, target: &DeliveryTarget) -> bool {
        match target {
            DeliveryTarget::Channel { channel, except } => {
                *channel == self.channel && *except != Some(self.connection_id)
            }
            DeliveryTarget::Connection(id) => *id == self.connection_id,
        }
    }
}
