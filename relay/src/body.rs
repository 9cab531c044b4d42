use crate::errors::RelayError;
use hyper::body::{Body, Bytes, Frame};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Response body fed frame by frame from the stream-forwarding task.
///
/// The channel is bounded, so a caller that stops reading backpressures the
/// upstream pull instead of buffering the stream in memory.
pub struct ChannelBody {
    rx: mpsc::Receiver<Result<Frame<Bytes>, RelayError>>,
}

impl ChannelBody {
    pub fn new(rx: mpsc::Receiver<Result<Frame<Bytes>, RelayError>>) -> Self {
        Self { rx }
    }
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = RelayError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, RelayError>>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
