//! Plugin-side half of the bridge: accepts agent connections and dispatches
//! requests to an in-process [`LoggingPlugin`].

use std::io;
use std::sync::Arc;

use logmon_common::LogConfig;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ipc::{IpcBackend, IpcListener};
use crate::plugin::LoggingPlugin;
use crate::wire::{
    reply, read_msg, verify_hmac, write_msg, Msg, MSG_ACK, MSG_CAPABILITIES, MSG_ERR, MSG_PING,
    MSG_START, MSG_STOP,
};

/// Serve `plugin` on `addr` until `shutdown` fires.
pub async fn serve<B: IpcBackend>(
    addr: &str,
    plugin: Arc<dyn LoggingPlugin>,
    secret: String,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let listener = B::bind(addr).await?;
    info!(endpoint = %listener.endpoint(), "logging plugin listening");
    serve_listener(listener, plugin, secret, shutdown).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve_listener<L: IpcListener>(
    mut listener: L,
    plugin: Arc<dyn LoggingPlugin>,
    secret: String,
    shutdown: CancellationToken,
) {
    let secret = Arc::new(secret);
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok(stream) => {
                let plugin = Arc::clone(&plugin);
                let secret = Arc::clone(&secret);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, plugin, &secret, shutdown).await {
                        debug!(error = %err, "plugin connection closed with error");
                    }
                });
            }
            Err(err) => warn!(error = %err, "failed to accept agent connection"),
        }
    }
    debug!(endpoint = %listener.endpoint(), "logging plugin server stopped");
}

async fn handle_connection<S>(
    stream: S,
    plugin: Arc<dyn LoggingPlugin>,
    secret: &str,
    shutdown: CancellationToken,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            request = read_msg(&mut reader) => request?,
        };
        let Some(request) = request else {
            return Ok(());
        };
        let response = dispatch(plugin.as_ref(), secret, &request).await;
        write_msg(&mut writer, &response).await?;
    }
}

/// Map one request onto the plugin and build the signed response.
///
/// Success always yields a well-formed `ACK`, even for calls with nothing to
/// report, so older agents keep decoding responses as the contract grows.
pub async fn dispatch(plugin: &dyn LoggingPlugin, secret: &str, request: &Msg) -> Msg {
    if !verify_hmac(request, secret) {
        warn!(msg_type = %request.msg_type, "rejecting request with invalid signature");
        return error_reply(request, "invalid signature", secret);
    }

    match request.msg_type.as_str() {
        MSG_PING => reply(request, MSG_ACK, json!({}), secret),
        MSG_START => {
            let cfg: LogConfig = match serde_json::from_value(request.payload.clone()) {
                Ok(cfg) => cfg,
                Err(err) => {
                    return error_reply(request, &format!("invalid log config: {err}"), secret)
                }
            };
            match plugin.start(&cfg).await {
                Ok(()) => reply(request, MSG_ACK, json!({}), secret),
                Err(err) => error_reply(request, &err.to_string(), secret),
            }
        }
        MSG_STOP => match plugin.stop().await {
            Ok(()) => reply(request, MSG_ACK, json!({}), secret),
            Err(err) => error_reply(request, &err.to_string(), secret),
        },
        MSG_CAPABILITIES => match plugin.capabilities().await {
            Ok(caps) => match serde_json::to_value(caps) {
                Ok(payload) => reply(request, MSG_ACK, payload, secret),
                Err(err) => error_reply(request, &err.to_string(), secret),
            },
            Err(err) => error_reply(request, &err.to_string(), secret),
        },
        other => error_reply(request, &format!("unsupported request {other}"), secret),
    }
}

fn error_reply(request: &Msg, message: &str, secret: &str) -> Msg {
    reply(request, MSG_ERR, json!({ "message": message }), secret)
}
