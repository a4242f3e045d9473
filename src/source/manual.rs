// ABOUTME: In-memory log source driven by the caller through per-connection feeds
//
// Every open is recorded along with a feed handle, so callers can push lines,
// fail or end each connection independently and observe whether the consumer
// side is still attached.

use super::{LogSource, LogStream, SourceError};
use crate::models::{LogLine, ParameterTuple};
use futures_util::stream;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug)]
enum FeedItem {
    Line(LogLine),
    Fail(SourceError),
    End,
}

/// Handle to one connection opened on a [`ManualLogSource`]
#[derive(Debug, Clone)]
pub struct ManualFeed {
    tuple: ParameterTuple,
    sender: mpsc::UnboundedSender<FeedItem>,
}

impl ManualFeed {
    pub const fn tuple(&self) -> &ParameterTuple {
        &self.tuple
    }

    /// Deliver a line. Returns false once the consumer has dropped the stream.
    pub fn push(&self, message: impl Into<String>) -> bool {
        self.sender.send(FeedItem::Line(LogLine::new(message))).is_ok()
    }

    /// Fail the stream; it ends after the error
    pub fn fail(&self, error: SourceError) -> bool {
        self.sender.send(FeedItem::Fail(error)).is_ok()
    }

    /// End the stream normally
    pub fn finish(&self) -> bool {
        self.sender.send(FeedItem::End).is_ok()
    }

    /// Whether the consuming stream is still alive
    pub fn is_attached(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[derive(Debug, Default, Clone)]
pub struct ManualLogSource {
    feeds: Arc<Mutex<Vec<ManualFeed>>>,
}

impl ManualLogSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of streams opened so far
    pub fn open_count(&self) -> usize {
        self.lock().len()
    }

    /// Tuples of every open, oldest first
    pub fn opened_tuples(&self) -> Vec<ParameterTuple> {
        self.lock().iter().map(|feed| feed.tuple.clone()).collect()
    }

    /// Feed for the `index`-th open
    pub fn feed(&self, index: usize) -> Option<ManualFeed> {
        self.lock().get(index).cloned()
    }

    /// Feed for the most recent open
    pub fn latest_feed(&self) -> Option<ManualFeed> {
        self.lock().last().cloned()
    }

    /// Number of opened streams whose consumer is still attached
    pub fn attached_count(&self) -> usize {
        self.lock().iter().filter(|feed| feed.is_attached()).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ManualFeed>> {
        self.feeds.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LogSource for ManualLogSource {
    fn open_log_stream(&self, tuple: &ParameterTuple) -> LogStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().push(ManualFeed {
            tuple: tuple.clone(),
            sender,
        });

        Box::pin(stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await? {
                FeedItem::Line(line) => Some((Ok(line), receiver)),
                FeedItem::Fail(error) => {
                    // Close so later pushes report the stream as gone
                    receiver.close();
                    Some((Err(error), receiver))
                }
                FeedItem::End => None,
            }
        }))
    }
}
