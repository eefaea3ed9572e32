// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Live pcap-NG streaming to HTTP subscribers.
//!
//! A subscription registers a LOGGING-stage handler with a filter
//! predicate; matching frames are PPI-wrapped, encoded as pcap-NG blocks,
//! and pushed into a bounded queue feeding the chunked response body. The
//! queue applies drop-new back-pressure: when the subscriber cannot keep
//! up the newest frames are discarded and the chain never blocks. Dropping
//! the body (client disconnect) or cancelling the stream entry unregisters
//! the handler and removes the stream-tracker entry.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::sync::WaitForCancellationFutureOwned;
use tracing::debug;

use crate::{
    logs::pcapng_log::ppi_wrap,
    models::{pcapng::PcapngEncoder, ppi::{DLT_IEEE802_11, DLT_PPI}},
    packet::{
        chain::{ChainHandler, ChainPos, PacketChain},
        frame::{ComponentId, Frame},
    },
    stream::{StreamEntry, StreamTracker},
};

/// Queue depth before drop-new engages.
const STREAM_QUEUE_DEPTH: usize = 64;

/// Frame predicate for a subscription.
pub type FrameFilter = Box<dyn Fn(&Frame) -> bool + Send + Sync>;

struct StreamState {
    encoder: Mutex<PcapngEncoder>,
    tx: mpsc::Sender<Bytes>,
    entry: Arc<StreamEntry>,
    filter: FrameFilter,
    comp_l1: ComponentId,
    comp_gps: ComponentId,
}

struct StreamChainHandler(Arc<StreamState>);

impl ChainHandler for StreamChainHandler {
    fn name(&self) -> &'static str {
        "pcap_http_stream"
    }

    fn handle(&self, frame: &mut Frame) -> i32 {
        let st = &self.0;

        if st.entry.is_paused() || st.entry.cancel.is_cancelled() {
            return 0;
        }

        if !(st.filter)(frame) {
            return 0;
        }

        let (dlt, record) = match frame.dlt {
            DLT_IEEE802_11 => {
                (DLT_PPI, ppi_wrap(frame, st.comp_l1, st.comp_gps))
            },
            other => (other, frame.data.to_vec()),
        };

        let blocks = {
            let mut encoder = st.encoder.lock().unwrap_or_else(|e| e.into_inner());
            encoder.encode_packet(&frame.source, dlt, frame.ts_us, &record)
        };

        let len = blocks.len() as u64;

        // Drop-new: a slow subscriber loses the newest frames rather than
        // stalling the chain.
        if st.tx.try_send(Bytes::from(blocks)).is_ok() {
            st.entry.account(len, 1);
        }

        0
    }
}

/// Removes the chain handler and the stream-tracker entry when the
/// subscription ends, however it ends.
struct StreamGuard {
    chain: Arc<PacketChain>,
    streams: Arc<StreamTracker>,
    handler_id: u64,
    stream_id: u64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.chain.remove_handler(ChainPos::Logging, self.handler_id);
        self.streams.remove(self.stream_id);
        debug!(stream = self.stream_id, "pcap stream closed and unregistered");
    }
}

/// Body stream handed to the HTTP layer. Ends when the client disconnects
/// or the stream is stopped through the API.
pub struct PcapStreamBody {
    rx: ReceiverStream<Bytes>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    done: bool,
    _guard: StreamGuard,
}

impl Stream for PcapStreamBody {
    type Item = Result<Bytes, std::convert::Infallible>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        if self.cancelled.as_mut().poll(cx).is_ready() {
            self.done = true;
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.rx).poll_next(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            },
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Creates a live pcap-NG subscription and returns its body stream.
pub fn open_pcap_stream(
    chain: Arc<PacketChain>,
    streams: Arc<StreamTracker>,
    comp_l1: ComponentId,
    comp_gps: ComponentId,
    name: &str,
    description: &str,
    filter: FrameFilter,
) -> PcapStreamBody {
    let entry = streams.register(name, "pcapng", "httpd", description);
    let (tx, rx) = mpsc::channel(STREAM_QUEUE_DEPTH);

    // Deliver the section header immediately so the subscriber holds a
    // valid capture even before the first matching frame.
    let mut encoder = PcapngEncoder::new();
    let shb = encoder.start();
    let _ = tx.try_send(Bytes::from(shb));

    let state = Arc::new(StreamState {
        encoder: Mutex::new(encoder),
        tx,
        entry: Arc::clone(&entry),
        filter,
        comp_l1,
        comp_gps,
    });

    let handler_id = chain.register_handler(
        ChainPos::Logging,
        200,
        Box::new(StreamChainHandler(state)),
    );

    PcapStreamBody {
        rx: ReceiverStream::new(rx),
        cancelled: Box::pin(entry.cancel.clone().cancelled_owned()),
        done: false,
        _guard: StreamGuard {
            chain,
            streams,
            handler_id,
            stream_id: entry.id,
        },
    }
}
