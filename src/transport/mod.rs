//! Transport-layer abstractions: the [`Transport`] trait any concrete
//! wire (Streamable HTTP, stdio, an in-process pair used by tests) must
//! satisfy, plus the concrete Streamable HTTP transport and its supporting
//! [`event_store`].

pub mod common;
pub mod event_store;
pub mod streamable_http;

use futures::{Sink, Stream};

use crate::service::{Inbound, Outbound, ServiceRole};

/// A bidirectional channel of JSON-RPC messages for one session, from one
/// role's point of view: a [`Stream`] of inbound messages and a [`Sink`]
/// accepting outbound ones.
///
/// This is a blanket trait, not something implementors write by hand:
/// anything that is already `Sink<Outbound<R>> + Stream<Item = Inbound<R>>`
/// automatically qualifies, the same way the teacher's transports compose
/// from `futures` primitives rather than a bespoke trait hierarchy.
pub trait Transport<R: ServiceRole>:
    Sink<Outbound<R>, Error = <Self as Transport<R>>::Error> + Stream<Item = Inbound<R>> + Send + Unpin + 'static
{
    type Error: std::error::Error + Send + Sync + 'static;
}

impl<R, T, E> Transport<R> for T
where
    R: ServiceRole,
    T: Sink<Outbound<R>, Error = E> + Stream<Item = Inbound<R>> + Send + Unpin + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;
}

/// An in-process duplex transport pairing two [`tokio::sync::mpsc`]
/// channels, used to connect a client and server [`Service`] in the same
/// process without any real I/O — the transport-layer equivalent of a
/// pair of connected pipes.
pub mod duplex {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures::{Sink, Stream};
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    #[derive(Debug, thiserror::Error)]
    #[error("duplex transport peer disconnected")]
    pub struct DuplexError;

    pub struct DuplexTransport<In, Out> {
        rx: ReceiverStream<In>,
        tx: mpsc::Sender<Out>,
    }

    pub fn duplex<A, B>(buffer: usize) -> (DuplexTransport<B, A>, DuplexTransport<A, B>)
    where
        A: Send + 'static,
        B: Send + 'static,
    {
        let (a_tx, a_rx) = mpsc::channel::<A>(buffer);
        let (b_tx, b_rx) = mpsc::channel::<B>(buffer);
        (
            DuplexTransport {
                rx: ReceiverStream::new(b_rx),
                tx: a_tx,
            },
            DuplexTransport {
                rx: ReceiverStream::new(a_rx),
                tx: b_tx,
            },
        )
    }

    impl<In: Unpin, Out> Stream for DuplexTransport<In, Out> {
        type Item = In;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Pin::new(&mut self.rx).poll_next(cx)
        }
    }

    impl<In: Unpin, Out: Unpin + Send + 'static> Sink<Out> for DuplexTransport<In, Out> {
        type Error = DuplexError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Out) -> Result<(), Self::Error> {
            self.get_mut().tx.try_send(item).map_err(|_| DuplexError)
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }
}
