//! Source remote-console wire format.
//!
//! Every packet is `size:i32 | id:i32 | type:i32 | body | 0x00 0x00`,
//! all integers little-endian. `size` counts everything after itself,
//! so `size = 4 + 4 + body.len() + 2`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const TYPE_AUTH: i32 = 3;
pub const TYPE_EXEC: i32 = 2;
pub const TYPE_AUTH_RESPONSE: i32 = 2;
pub const TYPE_RESPONSE_VALUE: i32 = 0;

/// Servers reply with this id when the password was wrong.
pub const AUTH_FAILED_ID: i32 = -1;

/// Upper bound on a single packet body; the protocol itself caps
/// packets at 4096 bytes.
pub const MAX_BODY_LEN: usize = 4086;

const HEADER_AFTER_SIZE: i32 = 10; // id + type + two trailing nulls

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Packet body too large: {0} bytes")]
    BodyTooLarge(usize),

    #[error("Invalid packet size field: {0}")]
    InvalidSize(i32),

    #[error("Packet body is not valid UTF-8")]
    InvalidBody,
}

/// One console packet, either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub packet_type: i32,
    pub body: String,
}

impl Packet {
    pub fn auth(id: i32, password: &str) -> Self {
        Self {
            id,
            packet_type: TYPE_AUTH,
            body: password.to_string(),
        }
    }

    pub fn exec(id: i32, command: &str) -> Self {
        Self {
            id,
            packet_type: TYPE_EXEC,
            body: command.to_string(),
        }
    }

    /// Serializes the packet to its wire form.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.body.len() > MAX_BODY_LEN {
            return Err(ProtocolError::BodyTooLarge(self.body.len()));
        }

        let size = HEADER_AFTER_SIZE + self.body.len() as i32;
        let mut buf = Vec::with_capacity(4 + size as usize);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.packet_type.to_le_bytes());
        buf.extend_from_slice(self.body.as_bytes());
        buf.extend_from_slice(&[0, 0]);
        Ok(buf)
    }
}

/// Writes one packet to the stream.
pub async fn write_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    packet: &Packet,
) -> Result<(), ProtocolError> {
    let buf = packet.encode()?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one packet from the stream.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Packet, ProtocolError> {
    let size = reader.read_i32_le().await?;
    if size < HEADER_AFTER_SIZE || size as usize > MAX_BODY_LEN + HEADER_AFTER_SIZE as usize {
        return Err(ProtocolError::InvalidSize(size));
    }

    let id = reader.read_i32_le().await?;
    let packet_type = reader.read_i32_le().await?;

    // size covers id, type, body and the two trailing nulls
    let mut raw = vec![0u8; (size - 8) as usize];
    reader.read_exact(&mut raw).await?;

    // strip trailing null padding
    while raw.last() == Some(&0) {
        raw.pop();
    }
    let body = String::from_utf8(raw).map_err(|_| ProtocolError::InvalidBody)?;

    Ok(Packet {
        id,
        packet_type,
        body,
    })
}
