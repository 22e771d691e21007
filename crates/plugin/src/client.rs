use std::io;
use std::time::Duration;

use async_trait::async_trait;
use logmon_common::{Capabilities, LogConfig};
use serde_json::{json, Value};
use tokio::io::BufReader;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PluginError;
use crate::ipc::{IpcBackend, PlatformIpc};
use crate::plugin::LoggingPlugin;
use crate::wire::{
    new_msg, read_msg, verify_hmac, write_msg, Msg, MSG_ACK, MSG_CAPABILITIES, MSG_ERR, MSG_PING,
    MSG_START, MSG_STOP,
};

/// Upper bound on any single call, independent of the caller's deadline.
pub const LOGGING_RPC_TIMEOUT: Duration = Duration::from_secs(60);

/// Agent-side proxy for a logging plugin running in another process.
///
/// `done` is fired by whoever supervises the plugin process once it exits; a
/// pending call then resolves to [`PluginError::PluginShutdown`] instead of
/// waiting out its timeout.
#[derive(Debug)]
pub struct RpcClient {
    addr: String,
    secret: String,
    timeout: Duration,
    done: CancellationToken,
}

impl RpcClient {
    pub fn new(addr: impl Into<String>, secret: impl Into<String>, done: CancellationToken) -> Self {
        Self {
            addr: addr.into(),
            secret: secret.into(),
            timeout: LOGGING_RPC_TIMEOUT,
            done,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Round-trip an empty request to check the plugin is serving.
    pub async fn ping(&self) -> Result<(), PluginError> {
        self.call("ping", MSG_PING, json!({})).await.map(|_| ())
    }

    async fn call(
        &self,
        call: &'static str,
        msg_type: &str,
        payload: Value,
    ) -> Result<Value, PluginError> {
        if self.done.is_cancelled() {
            return Err(PluginError::PluginShutdown);
        }

        let request = new_msg(msg_type, payload, &self.secret);
        let outcome = tokio::select! {
            biased;
            _ = self.done.cancelled() => return Err(PluginError::PluginShutdown),
            outcome = timeout(self.timeout, self.roundtrip(&request)) => outcome,
        };

        let response = match outcome {
            Err(_) => {
                warn!(call, addr = %self.addr, "logging plugin call timed out");
                return Err(PluginError::Timeout {
                    call,
                    timeout: self.timeout,
                });
            }
            Ok(Err(err)) => return Err(self.classify(err)),
            Ok(Ok(response)) => response,
        };

        self.interpret(call, &request, response)
    }

    async fn roundtrip(&self, request: &Msg) -> io::Result<Msg> {
        let stream = PlatformIpc::connect(&self.addr).await?;
        let (reader, mut writer) = tokio::io::split(stream);
        write_msg(&mut writer, request).await?;

        let mut reader = BufReader::new(reader);
        read_msg(&mut reader).await?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "plugin closed the connection without responding",
            )
        })
    }

    fn classify(&self, err: io::Error) -> PluginError {
        // The supervisor may notice the exit just after the socket broke.
        if self.done.is_cancelled() {
            return PluginError::PluginShutdown;
        }
        if err.kind() == io::ErrorKind::InvalidData {
            return PluginError::InvalidResponse(err.to_string());
        }
        debug!(addr = %self.addr, error = %err, "logging plugin transport error");
        PluginError::from(err)
    }

    fn interpret(
        &self,
        call: &'static str,
        request: &Msg,
        response: Msg,
    ) -> Result<Value, PluginError> {
        if !verify_hmac(&response, &self.secret) {
            return Err(PluginError::InvalidResponse(
                "response signature mismatch".into(),
            ));
        }
        if response.msg_id != request.msg_id {
            return Err(PluginError::InvalidResponse(format!(
                "response id {} does not match request {}",
                response.msg_id, request.msg_id
            )));
        }

        match response.msg_type.as_str() {
            MSG_ACK => Ok(response.payload),
            MSG_ERR => {
                let message = response
                    .payload
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("plugin returned an error")
                    .to_string();
                Err(PluginError::Remote { call, message })
            }
            other => Err(PluginError::InvalidResponse(format!(
                "unexpected response type {other}"
            ))),
        }
    }
}

#[async_trait]
impl LoggingPlugin for RpcClient {
    async fn start(&self, cfg: &LogConfig) -> Result<(), PluginError> {
        let payload = serde_json::to_value(cfg)
            .map_err(|err| PluginError::Transport(format!("failed to encode config: {err}")))?;
        self.call("start", MSG_START, payload).await.map(|_| ())
    }

    async fn stop(&self) -> Result<(), PluginError> {
        self.call("stop", MSG_STOP, json!({})).await.map(|_| ())
    }

    async fn capabilities(&self) -> Result<Capabilities, PluginError> {
        let payload = self
            .call("capabilities", MSG_CAPABILITIES, json!({}))
            .await?;
        serde_json::from_value(payload)
            .map_err(|err| PluginError::InvalidResponse(format!("capabilities: {err}")))
    }
}
