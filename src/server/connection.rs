// src/server/connection.rs

//! One accepted client connection.
//!
//! The read half runs in the connection task and hands every frame to the
//! connection's dispatch queue. Queue tasks run strictly one after another,
//! so responses reach the writer task, and the socket, in request order.
//! A failed write closes the connection: the read loop stops and the socket
//! is dropped, so the peer sees the connection fail.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use super::Inner;
use crate::protocol::{Frame, FrameCodec};
use crate::serialization::SerializationStrategy;
use crate::{log_debug, log_warn};

pub(super) async fn serve<S: SerializationStrategy>(inner: Arc<Inner<S>>, stream: TcpStream, peer: SocketAddr) {
    // ---
    let queue = inner
        .dispatcher
        .create_queue(format!("fastbin-server {peer}"));
    let (mut sink, mut frames) = Framed::new(stream, FrameCodec::new(inner.max_frame_size)).split();
    let (responses, mut outbound) = mpsc::unbounded_channel::<Frame>();

    // Cancelled by server shutdown or by a failed write
    let closed = inner.shutdown.child_token();

    let writer = inner.dispatcher.spawn({
        let closed = closed.clone();
        async move {
            // ---
            while let Some(frame) = outbound.recv().await {
                if let Err(err) = sink.send(frame).await {
                    log_warn!("write to {} failed, closing connection: {}", peer, err);
                    closed.cancel();
                    break;
                }
            }
        }
    });

    loop {
        let next = tokio::select! {
            biased;

            _ = closed.cancelled() => break,
            next = frames.next() => next,
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                log_warn!("dropping connection from {}: {}", peer, err);
                break;
            }
            None => break,
        };

        let handler = inner.clone();
        let responses = responses.clone();
        let submitted = queue.submit(move || {
            let correlation = frame.correlation;
            handler.handle_request(frame.body, move |out| {
                // The writer is gone once the peer stopped reading
                let _ = responses.send(Frame::new(correlation, out.freeze()));
            });
        });

        if submitted.is_err() {
            break;
        }
    }

    // Let responses of requests already on the queue go out, then close
    drop(responses);
    let _ = writer.await;

    log_debug!("connection from {} closed", peer);
}
