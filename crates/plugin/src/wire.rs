//! Line-delimited, HMAC-signed JSON messages exchanged with logging plugins.

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const MSG_START: &str = "START";
pub const MSG_STOP: &str = "STOP";
pub const MSG_CAPABILITIES: &str = "CAPABILITIES";
pub const MSG_PING: &str = "PING";
pub const MSG_ACK: &str = "ACK";
pub const MSG_ERR: &str = "ERR";

const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Msg {
    pub msg_type: String,
    pub msg_id: String,
    pub ts: u64,
    pub nonce: String,
    pub hmac: String,
    pub payload: serde_json::Value,
}

/// Build and sign a request.
pub fn new_msg(typ: &str, payload: serde_json::Value, secret: &str) -> Msg {
    let mut msg = Msg {
        msg_type: typ.to_string(),
        msg_id: Uuid::new_v4().to_string(),
        ts: now_ts(),
        nonce: Uuid::new_v4().to_string(),
        hmac: String::new(),
        payload,
    };
    sign_msg(&mut msg, secret);
    msg
}

/// Build and sign a response echoing the request's id.
pub fn reply(request: &Msg, typ: &str, payload: serde_json::Value, secret: &str) -> Msg {
    let mut msg = new_msg(typ, payload, secret);
    msg.msg_id = request.msg_id.clone();
    sign_msg(&mut msg, secret);
    msg
}

/// Fresh random secret, base64 encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::STANDARD.encode(bytes)
}

pub fn sign_msg(msg: &mut Msg, secret: &str) {
    let mut mac = mac_for(secret);
    mac.update(canonical_body(msg).as_bytes());
    msg.hmac = general_purpose::STANDARD.encode(mac.finalize().into_bytes());
}

pub fn verify_hmac(msg: &Msg, secret: &str) -> bool {
    let Ok(sig) = general_purpose::STANDARD.decode(msg.hmac.as_bytes()) else {
        return false;
    };
    let mut mac = mac_for(secret);
    mac.update(canonical_body(msg).as_bytes());
    mac.verify_slice(&sig).is_ok()
}

fn mac_for(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length")
}

fn canonical_body(msg: &Msg) -> String {
    let payload = serde_json::to_string(&msg.payload).unwrap_or_else(|_| "{}".to_string());
    format!(
        "{}|{}|{}|{}|{}",
        msg.msg_type, msg.msg_id, msg.ts, msg.nonce, payload
    )
}

fn now_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub async fn write_msg<W>(writer: &mut W, msg: &Msg) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(msg)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

/// Read one message. `Ok(None)` means the peer closed the stream cleanly.
pub async fn read_msg<R>(reader: &mut R) -> io::Result<Option<Msg>>
where
    R: AsyncBufRead + Unpin,
{
    // Read at most one byte past the cap; a longer line is rejected unread.
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', &mut line)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if line.len() > MAX_LINE_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message exceeds {} bytes", MAX_LINE_BYTES),
        ));
    }
    serde_json::from_slice(&line)
        .map(Some)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}
