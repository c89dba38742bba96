// Out-of-thread codec transport.
//
// A named OS thread owns a `DeltaCodec` and serves requests from an
// unbounded channel. Every request carries its own `oneshot` reply sender,
// so a response can only ever reach the caller that issued the request, no
// matter how many calls are in flight.

use std::io;
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, trace};
use tokio::sync::{mpsc, oneshot};

use super::{Codec, CodecError, DeltaCodec, DeltaOptions};

const THREAD_NAME: &str = "skipdelta-codec";

type Reply = oneshot::Sender<Result<Bytes, CodecError>>;

enum Request {
    Encode { base: Bytes, target: Bytes, reply: Reply },
    Decode { base: Bytes, delta: Bytes, reply: Reply },
}

/// Codec running on a dedicated thread.
///
/// Dropping the handle (or calling [`shutdown`](Self::shutdown)) closes the
/// request channel; the thread finishes the requests already queued and
/// exits.
#[derive(Debug)]
pub struct WorkerCodec {
    tx: mpsc::UnboundedSender<Request>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerCodec {
    /// Start the codec thread.
    pub fn spawn(options: DeltaOptions) -> io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let codec = DeltaCodec::new(options);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || serve(codec, rx))?;
        debug!("started {THREAD_NAME} thread");
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Whether the codec thread is still accepting requests.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Close the request channel and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        // Replacing the sender drops the last handle on the channel.
        let (closed, _) = mpsc::unbounded_channel();
        self.tx = closed;
        if handle.join().is_err() {
            debug!("{THREAD_NAME} thread panicked");
        } else {
            debug!("stopped {THREAD_NAME} thread");
        }
    }

    async fn call(&self, make: impl FnOnce(Reply) -> Request) -> Result<Bytes, CodecError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| CodecError::WorkerUnavailable)?;
        response.await.map_err(|_| CodecError::WorkerUnavailable)?
    }
}

impl Drop for WorkerCodec {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl Codec for WorkerCodec {
    async fn encode(&self, base: Bytes, target: Bytes) -> Result<Bytes, CodecError> {
        self.call(|reply| Request::Encode {
            base,
            target,
            reply,
        })
        .await
    }

    async fn decode(&self, base: Bytes, delta: Bytes) -> Result<Bytes, CodecError> {
        self.call(|reply| Request::Decode { base, delta, reply })
            .await
    }
}

/// Thread body: serve requests until every sender is gone.
fn serve(codec: DeltaCodec, mut rx: mpsc::UnboundedReceiver<Request>) {
    while let Some(request) = rx.blocking_recv() {
        match request {
            Request::Encode {
                base,
                target,
                reply,
            } => {
                trace!("worker encode: base={} target={}", base.len(), target.len());
                // A dropped receiver means the caller gave up; nothing to do.
                let _ = reply.send(Ok(codec.encode_sync(&base, &target)));
            }
            Request::Decode { base, delta, reply } => {
                trace!("worker decode: base={} delta={}", base.len(), delta.len());
                let _ = reply.send(codec.decode_sync(&base, &delta));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn worker_roundtrip() {
        let worker = WorkerCodec::spawn(DeltaOptions::default()).unwrap();
        assert!(worker.is_running());

        let base = Bytes::from_static(b"Lorem ipsum dolor sit amet, consectetur adipiscing elit");
        let target = Bytes::from_static(b"Lorem ipsum dolor sit amet, sed do eiusmod adipiscing elit");
        let delta = worker.encode(base.clone(), target.clone()).await.unwrap();
        assert_eq!(worker.decode(base, delta).await.unwrap(), target);

        worker.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_get_their_own_replies() {
        let worker = std::sync::Arc::new(WorkerCodec::spawn(DeltaOptions::default()).unwrap());

        let tasks: Vec<_> = (0u8..16)
            .map(|i| {
                let worker = worker.clone();
                tokio::spawn(async move {
                    let base = Bytes::from(vec![i; 64]);
                    let target = Bytes::from(format!("request {i} payload").into_bytes());
                    let delta = worker.encode(base.clone(), target.clone()).await.unwrap();
                    (worker.decode(base, delta).await.unwrap(), target)
                })
            })
            .collect();

        for task in tasks {
            let (decoded, expected) = task.await.unwrap();
            assert_eq!(decoded, expected);
        }
    }

    #[tokio::test]
    async fn decode_errors_cross_the_thread() {
        let worker = WorkerCodec::spawn(DeltaOptions::default()).unwrap();
        let err = worker
            .decode(Bytes::new(), Bytes::from_static(b"not a delta"))
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidDelta(_)));
    }

    #[tokio::test]
    async fn stopped_worker_is_unavailable() {
        let mut worker = WorkerCodec::spawn(DeltaOptions::default()).unwrap();
        worker.stop();
        assert!(!worker.is_running());
        let err = worker
            .encode(Bytes::new(), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err, CodecError::WorkerUnavailable);
    }
}
