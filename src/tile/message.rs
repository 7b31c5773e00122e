//! Messages exchanged between the orchestrator and the cache and render workers.

use bytes::Bytes;
use tokio::sync::oneshot;

use super::coord::TileCoord;

/// Outcome of resolving a tile request.
///
/// `blob == None` means the tile was not found or could not be rendered.
/// Any present blob, including an empty one, is a success.
#[derive(Debug, Clone, PartialEq)]
pub struct TileFetchResult {
    pub coord: TileCoord,
    pub blob: Option<Bytes>,
}

impl TileFetchResult {
    pub fn found(coord: TileCoord, blob: impl Into<Bytes>) -> Self {
        Self {
            coord,
            blob: Some(blob.into()),
        }
    }

    pub fn missing(coord: TileCoord) -> Self {
        Self { coord, blob: None }
    }

    pub fn is_found(&self) -> bool {
        self.blob.is_some()
    }
}

/// A request to resolve one tile, answered exactly once on `reply`.
///
/// Dropping a request without answering it closes the reply channel, which
/// the waiting side observes as "no answer will come".
#[derive(Debug)]
pub struct TileFetchRequest {
    pub coord: TileCoord,
    pub reply: oneshot::Sender<TileFetchResult>,
}

impl TileFetchRequest {
    /// Create a request together with the receiver for its single reply.
    pub fn new(coord: TileCoord) -> (Self, oneshot::Receiver<TileFetchResult>) {
        let (reply, rx) = oneshot::channel();
        (Self { coord, reply }, rx)
    }

    /// Deliver the result, consuming the request.
    ///
    /// Returns `false` if the requester stopped waiting.
    pub fn respond(self, blob: Option<Bytes>) -> bool {
        self.reply
            .send(TileFetchResult {
                coord: self.coord,
                blob,
            })
            .is_ok()
    }
}
