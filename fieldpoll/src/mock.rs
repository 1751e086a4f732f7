//! Scripted physical layer for tests
//!
//! The test queues the exact sequence of expected writes and the reads to hand back.
//! A write that differs from the script fails the test. A read is served in as many
//! pieces as the reader asks for.

use std::io::{Error, ErrorKind};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::ReadBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub(crate) fn mock() -> (Mock, Handle) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
    let mock = Mock {
        next: None,
        rx,
        tx: event_tx,
    };
    let handle = Handle { tx, rx: event_rx };
    (mock, handle)
}

pub(crate) struct Mock {
    // pending step that belongs to the other direction, or the rest of a partial read
    next: Option<Step>,
    rx: UnboundedReceiver<Step>,
    tx: UnboundedSender<Event>,
}

pub(crate) struct Handle {
    tx: UnboundedSender<Step>,
    rx: UnboundedReceiver<Event>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Write(Vec<u8>),
    Read(usize),
    ReadErr(ErrorKind),
}

#[derive(Debug)]
enum Step {
    Write(Vec<u8>),
    Read(Vec<u8>),
    ReadError(ErrorKind),
    WriteError(ErrorKind),
}

impl Step {
    fn is_read(&self) -> bool {
        matches!(self, Step::Read(_) | Step::ReadError(_))
    }
}

impl Handle {
    /// expect the next write to be exactly `data`
    pub(crate) fn expect_write(&mut self, data: &[u8]) {
        self.tx.send(Step::Write(data.to_vec())).unwrap()
    }

    /// hand `data` to the next read(s)
    pub(crate) fn read(&mut self, data: &[u8]) {
        self.tx.send(Step::Read(data.to_vec())).unwrap()
    }

    pub(crate) fn read_error(&mut self, kind: ErrorKind) {
        self.tx.send(Step::ReadError(kind)).unwrap()
    }

    pub(crate) fn write_error(&mut self, kind: ErrorKind) {
        self.tx.send(Step::WriteError(kind)).unwrap()
    }

    pub(crate) async fn next_event(&mut self) -> Event {
        self.rx.recv().await.unwrap()
    }

    /// the next event that is a write
    pub(crate) async fn next_write(&mut self) -> Vec<u8> {
        loop {
            if let Event::Write(data) = self.next_event().await {
                return data;
            }
        }
    }
}

impl Mock {
    fn pop(&mut self, read: bool, cx: &mut Context) -> Option<Step> {
        let step = match self.next.take() {
            Some(x) => x,
            None => match self.rx.poll_recv(cx) {
                Poll::Ready(Some(x)) => x,
                // script exhausted or handle dropped, park the caller
                Poll::Ready(None) | Poll::Pending => return None,
            },
        };

        if step.is_read() == read {
            Some(step)
        } else {
            self.next = Some(step);
            None
        }
    }
}

impl tokio::io::AsyncRead for Mock {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf,
    ) -> Poll<std::io::Result<()>> {
        match self.pop(true, cx) {
            None => Poll::Pending,
            Some(Step::Read(bytes)) => {
                let count = bytes.len().min(buf.remaining());
                buf.put_slice(&bytes[..count]);
                if count < bytes.len() {
                    self.next = Some(Step::Read(bytes[count..].to_vec()));
                }
                let _ = self.tx.send(Event::Read(count));
                Poll::Ready(Ok(()))
            }
            Some(Step::ReadError(kind)) => {
                let _ = self.tx.send(Event::ReadErr(kind));
                Poll::Ready(Err(kind.into()))
            }
            Some(other) => panic!("unexpected step during read: {other:?}"),
        }
    }
}

impl tokio::io::AsyncWrite for Mock {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, Error>> {
        match self.pop(false, cx) {
            None => panic!("unexpected write: {buf:02X?}"),
            Some(Step::Write(bytes)) => {
                assert_eq!(bytes.as_slice(), buf, "unexpected write");
                let _ = self.tx.send(Event::Write(buf.to_vec()));
                Poll::Ready(Ok(buf.len()))
            }
            Some(Step::WriteError(kind)) => Poll::Ready(Err(kind.into())),
            Some(other) => panic!("unexpected step during write: {other:?}"),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Poll::Ready(Ok(()))
    }
}
