//! Line mode tests

use super::{numbered_lines, write_lines};
use crate::config::StreamProcessorConfig;
use crate::error::IngestError;
use crate::models::Progress;
use crate::processor::StreamProcessor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

fn fails_every_tenth(
    line: String,
    line_number: usize,
) -> std::future::Ready<Result<Option<String>, String>> {
    let result = if line_number % 10 == 0 {
        Err(format!("bad line {}", line_number))
    } else {
        Ok(Some(line))
    };
    std::future::ready(result)
}

#[tokio::test]
async fn test_failures_are_isolated() {
    let dir = TempDir::new().unwrap();
    let path = write_lines(&dir, "log.csv", &numbered_lines(1000));
    let processor =
        StreamProcessor::new(StreamProcessorConfig::default().with_chunk_size(100)).unwrap();

    let mut events: Vec<Progress> = Vec::new();
    let outcome = processor
        .process_file(&path, fails_every_tenth, Some(&mut |p: Progress| events.push(p)))
        .await
        .unwrap();

    assert_eq!(outcome.processed, 1000);
    assert_eq!(outcome.failed, 100);
    assert_eq!(outcome.results.len(), 900);

    let last = events.last().unwrap();
    assert_eq!(last.percentage, 100);
    assert_eq!(last.processed, 1000);
    // One tick per 100 successful lines, plus the final report
    assert_eq!(events.len(), 900 / 100 + 1);
    assert!(events.windows(2).all(|w| w[0].processed <= w[1].processed));
}

#[tokio::test]
async fn test_reset_gives_identical_runs() {
    let dir = TempDir::new().unwrap();
    let path = write_lines(&dir, "log.csv", &numbered_lines(250));
    let processor =
        StreamProcessor::new(StreamProcessorConfig::default().with_max_concurrency(1)).unwrap();

    processor.reset();
    let first = processor.process_file(&path, fails_every_tenth, None).await.unwrap();
    processor.reset();
    let second = processor.process_file(&path, fails_every_tenth, None).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(processor.stats().processed, 250);
    assert_eq!(processor.stats().failed, 25);
}

#[tokio::test]
async fn test_counters_accumulate_without_reset() {
    let dir = TempDir::new().unwrap();
    let path = write_lines(&dir, "log.csv", &numbered_lines(50));
    let processor = StreamProcessor::default();

    processor.process_file(&path, fails_every_tenth, None).await.unwrap();
    let outcome = processor.process_file(&path, fails_every_tenth, None).await.unwrap();

    // The outcome is per call; the instance totals are cumulative
    assert_eq!(outcome.processed, 50);
    let stats = processor.stats();
    assert_eq!(stats.processed, 100);
    assert_eq!(stats.failed, 10);
    assert!((stats.success_rate - 90.0).abs() < f64::EPSILON);

    processor.reset();
    assert_eq!(processor.stats().processed, 0);
    assert_eq!(processor.stats().success_rate, 0.0);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let dir = TempDir::new().unwrap();
    let path = write_lines(&dir, "log.csv", &numbered_lines(60));
    let processor =
        StreamProcessor::new(StreamProcessorConfig::default().with_max_concurrency(3)).unwrap();

    let active = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);

    let outcome = processor
        .process_file(
            &path,
            |line, _| {
                let active = &active;
                let peak = &peak;
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(Some(line))
                }
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 60);
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_results_follow_completion_order() {
    let dir = TempDir::new().unwrap();
    let path = write_lines(&dir, "log.csv", &numbered_lines(2));
    let processor =
        StreamProcessor::new(StreamProcessorConfig::default().with_max_concurrency(2)).unwrap();

    let outcome = processor
        .process_file(
            &path,
            |_line, number| async move {
                // The first line finishes last
                let delay = if number == 1 { 30 } else { 1 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok::<_, String>(Some(number))
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.results, vec![2, 1]);
}

#[tokio::test]
async fn test_empty_and_leading_lines_skipped() {
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = ["preamble", "header", "a", "", "   ", "b"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let path = write_lines(&dir, "log.csv", &lines);
    let processor = StreamProcessor::new(
        StreamProcessorConfig::default()
            .with_skip_leading_lines(2)
            .with_max_concurrency(1),
    )
    .unwrap();

    let outcome = processor
        .process_file(
            &path,
            |line, number| async move { Ok::<_, String>(Some((number, line))) },
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.processed, 2);
    assert_eq!(
        outcome.results,
        vec![(3, "a".to_string()), (6, "b".to_string())]
    );
}

#[tokio::test]
async fn test_empty_lines_dispatched_when_configured() {
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = ["a", "", "b"].iter().map(|s| s.to_string()).collect();
    let path = write_lines(&dir, "log.csv", &lines);
    let processor = StreamProcessor::new(
        StreamProcessorConfig::default().with_skip_empty_lines(false),
    )
    .unwrap();

    let outcome = processor
        .process_file(&path, |line, _| async move { Ok::<_, String>(Some(line)) }, None)
        .await
        .unwrap();

    assert_eq!(outcome.processed, 3);
}

#[tokio::test]
async fn test_none_results_count_as_processed() {
    let dir = TempDir::new().unwrap();
    let path = write_lines(&dir, "log.csv", &numbered_lines(10));
    let processor = StreamProcessor::default();

    let outcome = processor
        .process_file(
            &path,
            |_line, number| async move {
                Ok::<Option<usize>, String>((number % 2 == 0).then_some(number))
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.processed, 10);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.results.len(), 5);
}

#[tokio::test]
async fn test_missing_file_rejects() {
    let dir = TempDir::new().unwrap();
    let processor = StreamProcessor::default();

    let result = processor
        .process_file(
            &dir.path().join("missing.csv"),
            |line, _| async move { Ok::<_, String>(Some(line)) },
            None,
        )
        .await;

    assert!(matches!(result, Err(IngestError::FileNotFound { .. })));
}

#[tokio::test]
async fn test_empty_file_reports_completion() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.csv");
    std::fs::write(&path, "").unwrap();
    let processor = StreamProcessor::default();

    let mut events = Vec::new();
    let outcome = processor
        .process_file(
            &path,
            |line, _| async move { Ok::<_, String>(Some(line)) },
            Some(&mut |p: Progress| events.push(p)),
        )
        .await
        .unwrap();

    assert!(outcome.results.is_empty());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].percentage, 100);
}

#[test]
fn test_zero_concurrency_rejected() {
    let result = StreamProcessor::new(StreamProcessorConfig::default().with_max_concurrency(0));
    assert!(matches!(result, Err(IngestError::Configuration { .. })));
}
