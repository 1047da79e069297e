//! Asynchronous batch generators.

use arrow::record_batch::RecordBatch;
use futures::future::{self, BoxFuture};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use igloo_common::Result;
use std::future::Future;

/// A lazily produced, finite sequence of batches.
pub type RecordBatchGenerator = BoxStream<'static, Result<RecordBatch>>;

/// A sequence of not-yet-started batch reads.
///
/// Each future performs its work only once polled, which lets a consumer
/// decide how many reads are in flight at a time.
pub type BatchFutureGenerator = BoxStream<'static, BoxFuture<'static, Result<RecordBatch>>>;

/// Keeps up to `readahead` reads of `source` in flight and yields their
/// results in source order.
///
/// The generator ends after yielding the first error.
pub fn make_readahead_generator(
    source: BatchFutureGenerator,
    readahead: usize,
) -> RecordBatchGenerator {
    let mut failed = false;
    source
        .buffered(readahead.max(1))
        .take_while(move |batch| {
            let keep = !failed;
            failed |= batch.is_err();
            future::ready(keep)
        })
        .boxed()
}

/// A generator that first waits for `generator` to become available.
pub fn make_from_future<F>(generator: F) -> RecordBatchGenerator
where
    F: Future<Output = Result<RecordBatchGenerator>> + Send + 'static,
{
    stream::once(generator).try_flatten().boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int32Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::FutureExt;
    use igloo_common::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn batch(value: i32) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int32, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![value]))]).unwrap()
    }

    fn value(batch: &RecordBatch) -> i32 {
        batch.column(0).as_any().downcast_ref::<Int32Array>().unwrap().value(0)
    }

    #[derive(Default)]
    struct InFlight {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    #[tokio::test]
    async fn readahead_bounds_in_flight_reads() {
        // Arrange
        let depth = 3;
        let in_flight = Arc::new(InFlight::default());
        let gauge = in_flight.clone();
        let source = stream::iter(0..20)
            .map(move |i| {
                let gauge = gauge.clone();
                async move {
                    let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
                    gauge.max.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Ok::<_, Error>(batch(i))
                }
                .boxed()
            })
            .boxed();
        let mut generator = make_readahead_generator(source, depth);

        // Act: a slow consumer.
        let mut seen = Vec::new();
        while let Some(next) = generator.next().await {
            seen.push(value(&next.unwrap()));
            in_flight.current.fetch_sub(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        // Assert
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
        assert!(in_flight.max.load(Ordering::SeqCst) <= depth);
    }

    #[tokio::test]
    async fn readahead_delivers_in_order_when_reads_finish_out_of_order() {
        let source = stream::iter(0..5)
            .map(|i| {
                async move {
                    tokio::time::sleep(Duration::from_millis(5 * (5 - i as u64))).await;
                    Ok::<_, Error>(batch(i))
                }
                .boxed()
            })
            .boxed();

        let batches: Vec<RecordBatch> =
            make_readahead_generator(source, 5).try_collect().await.unwrap();

        let values: Vec<i32> = batches.iter().map(value).collect();
        assert_eq!(values, [0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn readahead_stops_after_first_error() {
        let source = stream::iter(0..4)
            .map(|i| {
                async move {
                    if i == 1 {
                        Err(Error::Execution("bad batch".into()))
                    } else {
                        Ok(batch(i))
                    }
                }
                .boxed()
            })
            .boxed();

        let results: Vec<Result<RecordBatch>> = make_readahead_generator(source, 2).collect().await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[tokio::test]
    async fn from_future_flattens() {
        let generator = make_from_future(async {
            Ok(stream::iter(vec![Ok::<_, Error>(batch(7)), Ok(batch(8))]).boxed())
        });

        let batches: Vec<RecordBatch> = generator.try_collect().await.unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(value(&batches[1]), 8);
    }

    #[tokio::test]
    async fn from_future_surfaces_open_errors() {
        let generator = make_from_future(async {
            Err::<RecordBatchGenerator, _>(Error::Invalid("broken".into()))
        });

        let results: Vec<Result<RecordBatch>> = generator.collect().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::Invalid(_))));
    }
}
