//! M3DA TCP client.
//!
//! Sends one envelope per call and waits for the server's answer. With
//! [`DeviceCredentials`] the request is signed and ciphered, and the
//! response is verified before its payload is decoded.
//!
//! ```rust,ignore
//! use m3da::client::M3daTcpClient;
//! use m3da::codec::Message;
//!
//! let mut client = M3daTcpClient::new("127.0.0.1:44900", "dev-1");
//! let pdus = client.send(&[Message::new("@sys").with("temp", 21i64)]).await?;
//! ```

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::codec::bysant::decode;
use crate::codec::pdu::{Envelope, Header, HeaderKey, Message, Pdu, StatusCode};
use crate::codec::{DecodeError, EnvelopeDecoder, EnvelopeEncoder, Value};
use crate::protocol::{DeviceCredentials, DeviceError, INITIAL_NONCE};

const READ_BUFFER: usize = 8 * 1024;

/// Default time to wait for the server's answer
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client-side exchange errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response: {0}")]
    Decode(#[from] DecodeError),

    /// The server answered with a status other than 200.
    #[error("server answered with status {}", status.code())]
    Server { status: StatusCode },

    #[error("response rejected: {0}")]
    Device(#[from] DeviceError),

    /// The server closed the connection before a full envelope arrived.
    #[error("connection closed before a response")]
    Closed,

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Client sending messages to an M3DA server.
#[derive(Debug)]
pub struct M3daTcpClient {
    addr: String,
    comm_id: String,
    timeout: Duration,
    credentials: Option<DeviceCredentials>,
    server_nonce: Vec<u8>,
}

impl M3daTcpClient {
    /// Unsecured client for `comm_id`.
    pub fn new(addr: impl Into<String>, comm_id: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            comm_id: comm_id.into(),
            timeout: DEFAULT_CLIENT_TIMEOUT,
            credentials: None,
            server_nonce: INITIAL_NONCE.as_bytes().to_vec(),
        }
    }

    /// Secured client; the communication id comes from the credentials.
    pub fn with_credentials(addr: impl Into<String>, credentials: DeviceCredentials) -> Self {
        let mut client = Self::new(addr, credentials.comm_id());
        client.credentials = Some(credentials);
        client
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn comm_id(&self) -> &str {
        &self.comm_id
    }

    /// Nonce the next request will be signed with.
    pub fn server_nonce(&self) -> &[u8] {
        &self.server_nonce
    }

    /// Send `messages` and return the PDUs of the server's answer.
    ///
    /// A 401 carrying a fresh nonce is retried once with that nonce.
    pub async fn send(&mut self, messages: &[Message]) -> Result<Vec<Pdu>, ClientError> {
        match self.exchange(messages).await {
            Err(ClientError::Server {
                status: StatusCode::Unauthorized,
            }) if self.credentials.is_some() => {
                tracing::debug!(comm_id = %self.comm_id, "challenged, retrying with the new nonce");
                self.exchange(messages).await
            }
            other => other,
        }
    }

    async fn exchange(&mut self, messages: &[Message]) -> Result<Vec<Pdu>, ClientError> {
        let request = Envelope::with_messages(Header::new(), messages);
        let (request, device_nonce) = match &self.credentials {
            Some(credentials) => credentials.sign_request(request, &self.server_nonce)?,
            None => {
                let mut request = request;
                request.header.insert(HeaderKey::Id, self.comm_id.as_str());
                (request, Vec::new())
            }
        };

        let mut stream = TcpStream::connect(&self.addr).await?;
        stream.write_all(&EnvelopeEncoder::new().encode(&request)).await?;
        let response = tokio::time::timeout(self.timeout, read_envelope(&mut stream))
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))??;
        stream.shutdown().await.ok();

        if let Some(nonce) = response.header.get_bytes(&HeaderKey::Nonce) {
            self.server_nonce = nonce.to_vec();
        }
        let status = response.status().unwrap_or(StatusCode::Ok);
        if !status.is_ok() {
            return Err(ClientError::Server { status });
        }

        let payload = match &self.credentials {
            Some(credentials) => credentials.open_response(&response, &device_nonce)?,
            None => response.payload.clone(),
        };
        interpret_response(&Envelope::new(response.header, payload))
    }
}

/// Read exactly one envelope from `stream`.
async fn read_envelope(stream: &mut TcpStream) -> Result<Envelope, ClientError> {
    let mut decoder = EnvelopeDecoder::new();
    let mut received: Vec<Envelope> = Vec::new();
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let read = stream.read(&mut buf).await?;
        if read == 0 {
            decoder.finish_decode()?;
            return Err(ClientError::Closed);
        }
        decoder.decode_and_accumulate(&buf[..read], &mut received)?;
        if !received.is_empty() {
            return Ok(received.swap_remove(0));
        }
    }
}

/// Turn a clear response envelope into its PDUs.
///
/// Non-OK statuses are raised without looking at the payload.
pub fn interpret_response(envelope: &Envelope) -> Result<Vec<Pdu>, ClientError> {
    let status = envelope.status().unwrap_or(StatusCode::Ok);
    if !status.is_ok() {
        return Err(ClientError::Server { status });
    }
    let pdus = decode(&envelope.payload)?
        .into_iter()
        .filter_map(|value| match value {
            Value::Pdu(pdu) => Some(*pdu),
            other => {
                tracing::warn!(kind = other.kind(), "non-PDU value in response ignored");
                None
            }
        })
        .collect();
    Ok(pdus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::bysant::encode_all;
    use crate::codec::pdu::Response;

    #[test]
    fn test_error_status_raised_without_decoding() {
        let envelope = Envelope::new(
            Header::new().with(HeaderKey::Status, StatusCode::Forbidden),
            vec![0x7F, 0x7F],
        );
        match interpret_response(&envelope) {
            Err(ClientError::Server { status }) => assert_eq!(status, StatusCode::Forbidden),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ok_response_decoded() {
        let ack = Pdu::Response(Response {
            ticket_id: 4,
            status: 0,
            message: String::new(),
        });
        let setting = Pdu::Message(Message::new("@sys.cfg").with("rate", 5i64));
        let payload = encode_all(&[Value::from(setting.clone()), Value::from(ack.clone())]);
        let envelope = Envelope::new(Header::new().with(HeaderKey::Status, StatusCode::Ok), payload);

        assert_eq!(interpret_response(&envelope).unwrap(), vec![setting, ack]);
    }

    #[test]
    fn test_missing_status_is_ok() {
        let envelope = Envelope::new(Header::new(), Vec::new());
        assert!(interpret_response(&envelope).unwrap().is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::Server {
            status: StatusCode::Unauthorized,
        };
        assert_eq!(err.to_string(), "server answered with status 401");
    }
}
