//! UDP discovery queries, as sent by the vendor mobile app.

use std::sync::Arc;

use tokio::net::UdpSocket;

use crate::bridge::BridgeHandle;
use crate::error::ApiError;

const MAX_DATAGRAM: usize = 1500;

/// Map a datagram to the command it asks for.
pub fn udp_command_for(request: &str) -> &'static str {
    if request.ends_with("bridge?") {
        "GET STDT"
    } else if request.ends_with("bridge?GET ALLS") {
        "GET ALLS"
    } else {
        ""
    }
}

/// Answer every datagram with the envelope of its command, back to the sender.
pub async fn serve_udp(socket: Arc<UdpSocket>, handle: BridgeHandle) -> Result<(), ApiError> {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                tracing::warn!(category = "udp", error = %e, "UDP receive failed");
                continue;
            }
        };

        let request = String::from_utf8_lossy(&buf[..len]);
        let cmd = udp_command_for(&request);
        tracing::debug!(category = "udp", peer = %peer, cmd, "UDP request");

        let envelope = handle.execute(cmd, false).await?;
        if let Err(e) = socket.send_to(envelope.to_json().as_bytes(), peer).await {
            tracing::warn!(category = "udp", peer = %peer, error = %e, "UDP answer failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udp_command_for() {
        assert_eq!(udp_command_for("plzbridge?"), "GET STDT");
        assert_eq!(udp_command_for("plzbridge?GET ALLS"), "GET ALLS");
        assert_eq!(udp_command_for("bridge?GET STAT"), "");
        assert_eq!(udp_command_for(""), "");
    }
}
