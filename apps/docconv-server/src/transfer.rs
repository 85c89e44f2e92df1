//! Response body for one-shot downloads
//!
//! The conversion's files are deleted once the body has been streamed to the
//! end. A body dropped before that (client gone, connection reset) puts the
//! conversion back into the store so the same token works again.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Bytes;
use docconv_core::{Download, Pipeline};
use futures::future::BoxFuture;
use futures::{ready, FutureExt, Stream};
use tracing::warn;

const CHUNK_SIZE: usize = 64 * 1024;

pub struct DownloadBody {
    pipeline: Arc<Pipeline>,
    download: Option<Download>,
    offset: usize,
    cleanup: Option<BoxFuture<'static, ()>>,
}

impl DownloadBody {
    pub fn new(pipeline: Arc<Pipeline>, download: Download) -> Self {
        Self {
            pipeline,
            download: Some(download),
            offset: 0,
            cleanup: None,
        }
    }
}

impl Stream for DownloadBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(download) = this.download.as_ref() {
            if this.offset < download.bytes.len() {
                let end = (this.offset + CHUNK_SIZE).min(download.bytes.len());
                let chunk = Bytes::copy_from_slice(&download.bytes[this.offset..end]);
                this.offset = end;
                return Poll::Ready(Some(Ok(chunk)));
            }
        }

        // Every byte went out
        if let Some(download) = this.download.take() {
            let pipeline = this.pipeline.clone();
            this.cleanup = Some(async move { pipeline.finish_download(download).await }.boxed());
        }
        if let Some(cleanup) = this.cleanup.as_mut() {
            ready!(cleanup.poll_unpin(cx));
            this.cleanup = None;
        }
        Poll::Ready(None)
    }
}

impl Drop for DownloadBody {
    fn drop(&mut self) {
        if self.download.is_none() && self.cleanup.is_none() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Download body dropped outside the runtime, conversion left as is");
            return;
        };
        if let Some(cleanup) = self.cleanup.take() {
            handle.spawn(cleanup);
        }
        if let Some(download) = self.download.take() {
            let pipeline = self.pipeline.clone();
            handle.spawn(async move { pipeline.restore_download(download).await });
        }
    }
}
