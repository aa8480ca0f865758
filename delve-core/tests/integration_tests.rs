//! Integration tests for delve-core infrastructure

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use delve_core::{
    config_error, init_logging, retry_async, search_error, validation_error, with_timeout,
    DelveError, ErrorContext, LlmErrorKind, LogFormat, LoggingConfig, RetryConfig, SearchLimiter,
};

#[tokio::test]
async fn test_error_handling() {
    let error = search_error!("Search backend unavailable", "test_component");

    match &error {
        DelveError::Search {
            message, context, ..
        } => {
            assert_eq!(message, "Search backend unavailable");
            assert_eq!(context.component, "test_component");
            assert!(!context.error_id.is_empty());
        }
        _ => panic!("Expected Search error"),
    }

    // Should not panic
    error.log();

    let timeout_error = DelveError::Timeout {
        operation: "search".to_string(),
        duration_ms: 10,
        context: ErrorContext::new("test"),
    };
    assert!(timeout_error.is_recoverable());
    assert!(timeout_error.retry_delay_ms().is_some());

    let config_error = config_error!("Invalid config", "test");
    assert!(!config_error.is_recoverable());

    let validation = validation_error!("bad value", "research.breadth", "test");
    match validation {
        DelveError::Validation { field, .. } => {
            assert_eq!(field.as_deref(), Some("research.breadth"))
        }
        _ => panic!("Expected Validation error"),
    }
}

#[tokio::test]
async fn test_logging_initialization() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: LogFormat::Compact,
        include_location: false,
        include_thread: false,
        log_to_file: false,
        log_file_path: None,
        enable_performance_monitoring: false,
        filter_directives: vec!["delve_core=debug".to_string()],
    };

    // A global subscriber may already be installed by another test;
    // either way this must not panic
    let _ = init_logging(&config);
}

#[tokio::test]
async fn test_retry_mechanism() {
    let attempt_count = Arc::new(AtomicUsize::new(0));

    let operation = {
        let attempt_count = Arc::clone(&attempt_count);
        move |_attempt: usize| {
            let count = attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if count < 3 {
                    Err(DelveError::llm(
                        LlmErrorKind::InvalidResponse,
                        "Temporary failure",
                        "test",
                    ))
                } else {
                    Ok("Success")
                }
            }
        }
    };

    let config = RetryConfig {
        max_attempts: 5,
        initial_delay_ms: 10,
        max_delay_ms: 100,
        backoff_multiplier: 2.0,
        jitter: false,
    };

    let result = retry_async(operation, &config, "test_operation").await;
    assert_eq!(result.unwrap(), "Success");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_timeout_mechanism() {
    let quick_operation = async {
        sleep(Duration::from_millis(10)).await;
        "Success"
    };

    let result = with_timeout(quick_operation, 100, "quick_test").await;
    assert_eq!(result.unwrap(), "Success");

    let slow_operation = async {
        sleep(Duration::from_millis(200)).await;
        "Should not reach here"
    };

    let result = with_timeout(slow_operation, 50, "slow_test").await;
    match result {
        Err(DelveError::Timeout {
            operation,
            duration_ms,
            ..
        }) => {
            assert_eq!(operation, "slow_test");
            assert_eq!(duration_ms, 50);
        }
        _ => panic!("Expected timeout error"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_search_limiter_rolling_window() {
    let limiter = Arc::new(SearchLimiter::new(4, 3));
    let starts = Arc::new(tokio::sync::Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let limiter = Arc::clone(&limiter);
        let starts = Arc::clone(&starts);
        handles.push(tokio::spawn(async move {
            let _guard = limiter.acquire().await.unwrap();
            starts.lock().await.push(tokio::time::Instant::now());
            sleep(Duration::from_millis(500)).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut starts = starts.lock().await.clone();
    starts.sort();
    assert_eq!(starts.len(), 8);
    // No more than 3 starts inside any 60 second window
    for pair in starts.windows(4) {
        assert!(pair[3].duration_since(pair[0]) >= Duration::from_secs(60));
    }
}
