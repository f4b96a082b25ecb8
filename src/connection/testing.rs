//! A minimal protocol client for exercising a live server in tests.

use crate::protocol::{
    decode_response, encode_request, BindRequest, Frame, FrameParser, Message, MessageId, Request,
    Response,
};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TestClient {
    stream: TcpStream,
    buffer: BytesMut,
    parser: FrameParser,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
            parser: FrameParser::new(),
        }
    }

    pub async fn send(&mut self, id: MessageId, request: Request) {
        self.send_frame(encode_request(&Message { id, request })).await;
    }

    pub async fn send_frame(&mut self, frame: Frame) {
        self.send_raw(&frame.serialize()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Waits for the next response, failing the test after two seconds.
    pub async fn recv(&mut self) -> (MessageId, Response) {
        loop {
            if let Some((frame, consumed)) = self.parser.parse(&self.buffer).unwrap() {
                let _ = self.buffer.split_to(consumed);
                return decode_response(frame).unwrap();
            }
            let n = tokio::time::timeout(RECV_TIMEOUT, self.stream.read_buf(&mut self.buffer))
                .await
                .expect("timed out waiting for a response")
                .unwrap();
            assert!(n > 0, "server closed the connection");
        }
    }

    pub async fn bind(
        &mut self,
        id: MessageId,
        name: &str,
        password: &str,
    ) -> (MessageId, Response) {
        self.send(
            id,
            Request::Bind(BindRequest {
                name: name.to_string(),
                mechanism: "simple".to_string(),
                credentials: Bytes::copy_from_slice(password.as_bytes()),
            }),
        )
        .await;
        self.recv().await
    }

    /// True once the server closes the connection; false if it is still
    /// open after the receive timeout.
    pub async fn closed(&mut self) -> bool {
        let mut scratch = [0u8; 256];
        loop {
            match tokio::time::timeout(RECV_TIMEOUT, self.stream.read(&mut scratch)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(_)) => continue,
                Err(_) => return false,
            }
        }
    }

    /// True if nothing arrives within `window`.
    pub async fn silent_for(&mut self, window: Duration) -> bool {
        if !self.buffer.is_empty() {
            return false;
        }
        let mut scratch = [0u8; 64];
        tokio::time::timeout(window, self.stream.read(&mut scratch))
            .await
            .is_err()
    }
}
