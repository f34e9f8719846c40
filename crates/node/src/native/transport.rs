//! TCP transport between ring nodes.
//!
//! Every outbound call opens its own connection and writes one length-delimited
//! frame holding a bincode [Envelope]. A request keeps the connection open for the
//! reply frame; a oneway message closes it after the write.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chordkv_core::message::Message;
use chordkv_core::transport::RequestHandler;
use chordkv_core::transport::Transport;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::codec::LengthDelimitedCodec;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::error::Result;

/// What travels in one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// The sender does not wait for a reply.
    pub oneway: bool,
    pub message: Message,
}

impl Envelope {
    fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(bincode::serialize(self)?))
    }

    fn decode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

type Conn = Framed<TcpStream, LengthDelimitedCodec>;

async fn read_envelope(conn: &mut Conn, peer: &str) -> Result<Envelope> {
    match conn.next().await {
        Some(frame) => Envelope::decode(&frame?),
        None => Err(Error::ConnectionClosed(peer.to_string())),
    }
}

/// Outbound side, see [Transport].
#[derive(Debug, Default, Clone)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }

    async fn connect(address: &str) -> Result<Conn> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| Error::ConnectError(address.to_string(), e))?;
        stream.set_nodelay(true)?;
        Ok(Framed::new(stream, LengthDelimitedCodec::new()))
    }

    async fn call(address: &str, envelope: Envelope) -> Result<Option<Message>> {
        let mut conn = Self::connect(address).await?;
        let oneway = envelope.oneway;
        conn.send(envelope.encode()?).await?;
        if oneway {
            SinkExt::<Bytes>::close(&mut conn).await?;
            return Ok(None);
        }
        let reply = read_envelope(&mut conn, address).await?;
        Ok(Some(reply.message))
    }
}

fn into_core(address: &str, e: Error) -> chordkv_core::error::Error {
    match e {
        Error::ConnectError(..) | Error::ConnectionClosed(_) => {
            chordkv_core::error::Error::PeerUnreachable(address.to_string())
        }
        e => e.into(),
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn request(&self, address: &str, msg: Message) -> chordkv_core::error::Result<Message> {
        let envelope = Envelope {
            oneway: false,
            message: msg,
        };
        match Self::call(address, envelope).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(chordkv_core::error::Error::PeerUnreachable(
                address.to_string(),
            )),
            Err(e) => Err(into_core(address, e)),
        }
    }

    async fn send(&self, address: &str, msg: Message) -> chordkv_core::error::Result<()> {
        let envelope = Envelope {
            oneway: true,
            message: msg,
        };
        Self::call(address, envelope)
            .await
            .map(|_| ())
            .map_err(|e| into_core(address, e))
    }
}

/// Bind `address` for inbound ring traffic.
pub async fn bind(address: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| Error::BindError(address.to_string(), e))?;
    tracing::info!("listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept connections until `cancel` fires, serving each on its own task.
pub async fn serve(
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("transport listener stopped");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let peer = peer.to_string();
                        if let Err(e) = serve_conn(stream, &peer, handler).await {
                            tracing::debug!("connection from {} failed: {}", peer, e);
                        }
                    });
                }
                Err(e) => tracing::warn!("accept failed: {}", e),
            },
        }
    }
}

async fn serve_conn(stream: TcpStream, peer: &str, handler: Arc<dyn RequestHandler>) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut conn = Framed::new(stream, LengthDelimitedCodec::new());
    let envelope = read_envelope(&mut conn, peer).await?;
    tracing::trace!("received {} from {}", envelope.message, peer);
    if envelope.oneway {
        handler.on_message(envelope.message).await;
        return Ok(());
    }
    let reply = handler.on_request(envelope.message).await?;
    let reply = Envelope {
        oneway: false,
        message: reply,
    };
    conn.send(reply.encode()?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chordkv_core::message::ErrorReport;

    use super::*;

    #[derive(Default)]
    struct Echo {
        oneway: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl RequestHandler for Echo {
        async fn on_request(&self, msg: Message) -> chordkv_core::error::Result<Message> {
            Ok(msg)
        }

        async fn on_message(&self, msg: Message) {
            self.oneway.lock().unwrap().push(msg);
        }
    }

    fn sample() -> Message {
        ErrorReport {
            reason: "ping".to_string(),
        }
        .into()
    }

    #[tokio::test]
    async fn test_request_and_oneway() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let echo = Arc::new(Echo::default());
        let cancel = CancellationToken::new();
        tokio::spawn(serve(listener, echo.clone(), cancel.clone()));

        let transport = TcpTransport::new();
        let reply = transport.request(&address, sample()).await.unwrap();
        assert!(
            matches!(reply, Message::ErrorReport(ref r) if r.reason == "ping"),
            "expect echo got {:?}",
            reply
        );

        transport.send(&address, sample()).await.unwrap();
        for _ in 0..50 {
            if !echo.oneway.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(echo.oneway.lock().unwrap().len(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let ret = TcpTransport::new().request(&address, sample()).await;
        assert!(
            matches!(ret, Err(chordkv_core::error::Error::PeerUnreachable(ref a)) if a == &address),
            "expect PeerUnreachable got {:?}",
            ret
        );
    }
}
