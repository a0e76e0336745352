//! WebSocket を使った BrokerTransport 実装
//!
//! ## 責務
//!
//! - ブローカーの `/ws` エンドポイントへの接続
//! - WebSocket ストリームを送信側・受信側に分割し、テキストフレームをチャンネルで中継
//! - 書き込みが完了したフレームごとに送信元へ完了を通知（未送信のまま切断されたフレームは通知しない）
//!
//! ## 設計ノート
//!
//! STOMP のエンコード／デコードはこの層では行いません。ここで扱うのは WebSocket の
//! テキストメッセージのみで、フレームの解釈はリアルタイムチャンネル側の責務です。

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use crate::domain::{BrokerTransport, OutgoingFrame, TransportError, TransportLink};

/// Transport connecting to the broker over WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    /// # Arguments
    ///
    /// * `url` - Broker endpoint, e.g. `ws://127.0.0.1:8080/ws`
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BrokerTransport for WebSocketTransport {
    async fn open(&self) -> Result<TransportLink, TransportError> {
        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!("WebSocket connected to {}", self.url);

        let (mut write, mut read) = ws_stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<OutgoingFrame>();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<String>();
        // Dropped by the reader on exit so the writer stops accepting frames too.
        let (reader_done_tx, mut reader_done_rx) = oneshot::channel::<()>();

        // Writer: ends when the link is dropped, the reader is gone or a write fails.
        // Frames still buffered at that point are dropped without acknowledgement.
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    next = outgoing_rx.recv() => {
                        let Some(frame) = next else { break };
                        if let Err(e) = write.send(Message::Text(frame.text.into())).await {
                            tracing::warn!("WebSocket write error: {}", e);
                            break;
                        }
                        let _ = frame.written.send(());
                    }
                    _ = &mut reader_done_rx => break,
                }
            }
            let _ = write.close().await;
        });

        // Reader: ends on close, error, or when nobody listens anymore.
        tokio::spawn(async move {
            let _reader_done = reader_done_tx;
            while let Some(message) = read.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text.as_str().to_owned(),
                    Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => text,
                        Err(_) => {
                            tracing::warn!("Dropping non UTF-8 binary message ({} bytes)", data.len());
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) => {
                        tracing::info!("Broker closed the connection");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("WebSocket read error: {}", e);
                        break;
                    }
                    _ => continue,
                };
                if incoming_tx.send(text).is_err() {
                    break;
                }
            }
        });

        Ok(TransportLink {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }
}
