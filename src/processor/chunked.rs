//! Chunked transform with fatal processor errors.
//!
//! Unlike line and batch mode, a processor error here is not absorbed: it
//! ends the transform and is returned to the caller. Pipelines that must not
//! lose rows silently (e.g. the hand-off to persistence) are built on this.

use crate::error::{IngestError, Result};
use futures::stream::{self, Chunks, Stream, StreamExt};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;

/// Buffers items up to `chunk_size`, then hands the buffer to the processor
/// and yields its results.
#[derive(Debug)]
pub struct ChunkTransform<T, F> {
    buffer: Vec<T>,
    chunk_size: usize,
    processor: F,
}

impl<T, F> ChunkTransform<T, F> {
    /// A zero chunk size is treated as 1
    pub fn new(chunk_size: usize, processor: F) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
            processor,
        }
    }

    /// Items waiting for the next full chunk
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Add an item; returns the processor's results when the chunk filled
    pub async fn push<R, E, Fut>(&mut self, item: T) -> Result<Vec<R>>
    where
        F: FnMut(Vec<T>) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<R>, E>>,
        E: Display,
    {
        self.buffer.push(item);
        if self.buffer.len() >= self.chunk_size {
            self.run().await
        } else {
            Ok(Vec::new())
        }
    }

    /// Flush the trailing partial chunk, if any
    pub async fn finish<R, E, Fut>(mut self) -> Result<Vec<R>>
    where
        F: FnMut(Vec<T>) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<R>, E>>,
        E: Display,
    {
        if self.buffer.is_empty() {
            return Ok(Vec::new());
        }
        self.run().await
    }

    async fn run<R, E, Fut>(&mut self) -> Result<Vec<R>>
    where
        F: FnMut(Vec<T>) -> Fut,
        Fut: Future<Output = std::result::Result<Vec<R>, E>>,
        E: Display,
    {
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
        (self.processor)(chunk)
            .await
            .map_err(|e| IngestError::chunk_processor(e.to_string()))
    }
}

struct TransformState<S: Stream, F, R> {
    chunks: Pin<Box<Chunks<S>>>,
    processor: F,
    pending: std::vec::IntoIter<R>,
    failed: bool,
}

/// Stream adapter over [`ChunkTransform`] semantics.
///
/// Yields each processor result in order. The first processor error is
/// yielded as `Err` and ends the stream; no further chunk is processed.
pub fn chunk_transform<S, T, R, E, F, Fut>(
    input: S,
    chunk_size: usize,
    processor: F,
) -> impl Stream<Item = Result<R>>
where
    S: Stream<Item = T> + Send,
    T: Send,
    R: Send,
    F: FnMut(Vec<T>) -> Fut + Send,
    Fut: Future<Output = std::result::Result<Vec<R>, E>> + Send,
    E: Display + Send,
{
    let state = TransformState {
        chunks: Box::pin(input.chunks(chunk_size.max(1))),
        processor,
        pending: Vec::new().into_iter(),
        failed: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(result) = state.pending.next() {
                return Some((Ok(result), state));
            }
            if state.failed {
                return None;
            }

            let chunk = state.chunks.next().await?;
            match (state.processor)(chunk).await {
                Ok(results) => state.pending = results.into_iter(),
                Err(e) => {
                    state.failed = true;
                    return Some((Err(IngestError::chunk_processor(e.to_string())), state));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_push_emits_on_full_chunk() {
        let mut transform = ChunkTransform::new(3, |chunk: Vec<u32>| async move {
            Ok::<_, String>(chunk.into_iter().map(|n| n * 10).collect::<Vec<_>>())
        });

        assert!(transform.push(1).await.unwrap().is_empty());
        assert!(transform.push(2).await.unwrap().is_empty());
        assert_eq!(transform.push(3).await.unwrap(), vec![10, 20, 30]);
        assert_eq!(transform.buffered(), 0);
        assert!(transform.push(4).await.unwrap().is_empty());
        assert_eq!(transform.finish().await.unwrap(), vec![40]);
    }

    #[tokio::test]
    async fn test_leftovers_flushed_once() {
        // 10 items in chunks of 4: two full chunks, 2 leftovers flushed once
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        let results: Vec<u32> = chunk_transform(stream::iter(0..10u32), 4, move |chunk: Vec<u32>| {
            recorded.lock().unwrap().push(chunk.len());
            async move { Ok::<_, String>(chunk) }
        })
        .map(|r| r.unwrap())
        .collect()
        .await;

        assert_eq!(results, (0..10).collect::<Vec<_>>());
        assert_eq!(*calls.lock().unwrap(), vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_extra_flush() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let count = chunk_transform(stream::iter(0..8u32), 4, move |chunk: Vec<u32>| {
            *counter.lock().unwrap() += 1;
            async move { Ok::<_, String>(chunk) }
        })
        .count()
        .await;

        assert_eq!(count, 8);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_processor_error_is_fatal() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let processor = move |chunk: Vec<u32>| {
            *counter.lock().unwrap() += 1;
            async move {
                if chunk.contains(&4) {
                    Err("sink rejected chunk".to_string())
                } else {
                    Ok(chunk)
                }
            }
        };
        let items: Vec<Result<u32>> = chunk_transform(stream::iter(0..9u32), 3, processor)
            .collect()
            .await;

        assert_eq!(items.len(), 4);
        assert!(items[..3].iter().all(|r| r.is_ok()));
        assert!(matches!(items[3], Err(IngestError::ChunkProcessor { .. })));
        // The chunk after the failing one is never processed
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_push_error_propagates() {
        let mut transform =
            ChunkTransform::new(1, |_chunk: Vec<u32>| async { Err::<Vec<u32>, _>("boom") });
        let err = transform.push(1).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let passthrough = |chunk: Vec<u32>| async move { Ok::<_, String>(chunk) };
        let transform = ChunkTransform::new(5, passthrough);
        assert!(transform.finish().await.unwrap().is_empty());

        let count = chunk_transform(stream::iter(Vec::<u32>::new()), 5, passthrough)
            .count()
            .await;
        assert_eq!(count, 0);
    }
}
