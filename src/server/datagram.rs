//! Datagram registration server
//!
//! The UDP socket shares the control server's address. Inbound datagrams
//! are session-id registrations that bind the sender's endpoint into the
//! peer registry; outbound audio goes through the broadcast fan-out on the
//! same socket.

use std::sync::Arc;

use crate::protocol::decode_registration;

use super::ServerState;

/// Receive registration datagrams until the server shuts down
pub(crate) async fn registration_loop(state: Arc<ServerState>) {
    // Registrations are 4 bytes; anything longer is malformed and the
    // extra room lets the length check distinguish that from truncation.
    let mut buf = [0u8; 16];

    loop {
        let received = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            received = state.udp.recv_from(&mut buf) => received,
        };

        let (len, src) = match received {
            Ok(received) => received,
            Err(e) => {
                tracing::info!(error = %e, "datagram receive failed");
                break;
            }
        };

        match decode_registration(&buf[..len]) {
            Some(id) => {
                state.registry.bind_datagram(id, src);
            }
            None => {
                tracing::trace!(len, peer = %src, "ignoring malformed registration datagram");
            }
        }
    }
    tracing::trace!("datagram registration loop stopped");
}
