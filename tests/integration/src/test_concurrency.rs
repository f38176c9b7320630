//! Conditional-write retry and concurrent writer tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::join_all;
    use ruststack_s3_core::S3ServiceError;
    use ruststack_s3_core::config::S3Config;
    use ruststack_s3_core::ops::object::PutObjectInput;
    use ruststack_s3_core::state::{MetadataStore, RecordAddress, VersioningStatus};

    use crate::{BUCKET, Harness, KEY, put_with};

    #[tokio::test]
    async fn test_should_retry_after_injected_conflicts() {
        let (h, flaky) = Harness::with_flaky_metadata(S3Config::default(), VersioningStatus::Enabled);
        flaky.inject_conflicts(2);

        let out = h.put("data").await;
        assert!(out.version_id.is_some());
        assert_eq!(flaky.conditional_puts(), 3);
        assert_eq!(h.versions().len(), 1);
        h.settle().await;
        assert_eq!(h.data.len(), 1);
    }

    #[tokio::test]
    async fn test_should_give_up_after_retry_budget() {
        let config = S3Config::builder().max_conflict_retries(2).build();
        let (h, flaky) = Harness::with_flaky_metadata(config, VersioningStatus::Enabled);
        flaky.inject_conflicts(u32::MAX);

        let result = h
            .provider
            .handle_put_object(PutObjectInput::builder().bucket(BUCKET).key(KEY).body("x").build())
            .await;
        match result {
            Err(S3ServiceError::ConcurrencyConflict { key, attempts }) => {
                assert_eq!(key, KEY);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        assert_eq!(flaky.conditional_puts(), 3);
        // The new data was removed before the error surfaced.
        assert!(h.data.is_empty());
        assert!(h.versions().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_keep_every_concurrent_version() {
        let config = S3Config::builder().max_conflict_retries(100).build();
        let h = Arc::new(Harness::new(config, VersioningStatus::Enabled));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let h = Arc::clone(&h);
                tokio::spawn(async move { put_with(&h.provider, "payload").await })
            })
            .collect();
        let outputs: Vec<_> = join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.expect("task panicked"))
            .collect();

        let mut tokens: Vec<String> = outputs
            .into_iter()
            .map(|o| o.version_id.expect("version id"))
            .collect();
        tokens.sort();
        tokens.dedup();
        assert_eq!(tokens.len(), 16);
        assert_eq!(h.versions().len(), 16);
        h.settle().await;
        assert_eq!(h.data.len(), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_not_leak_data_under_concurrent_null_overwrites() {
        let config = S3Config::builder().max_conflict_retries(100).build();
        let h = Arc::new(Harness::new(config, VersioningStatus::Suspended));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let h = Arc::clone(&h);
                tokio::spawn(async move { put_with(&h.provider, "payload").await })
            })
            .collect();
        for result in join_all(tasks).await {
            let out = result.expect("task panicked");
            assert_eq!(out.version_id.as_deref(), Some("null"));
        }

        h.settle().await;
        assert_eq!(h.versions().len(), 1);
        assert_eq!(h.data.len(), 1);
    }

    #[tokio::test]
    async fn test_should_reclaim_data_of_cancelled_write() {
        let (h, flaky) = Harness::with_flaky_metadata(S3Config::default(), VersioningStatus::Enabled);
        flaky.stall_conditional_puts(true);

        let put = h.provider.handle_put_object(
            PutObjectInput::builder()
                .bucket(BUCKET)
                .key(KEY)
                .body("never committed")
                .build(),
        );
        let timed_out = tokio::time::timeout(Duration::from_millis(50), put).await;
        assert!(timed_out.is_err());
        assert_eq!(h.data.len(), 1);

        h.settle().await;
        assert!(h.data.is_empty());
        assert!(h.versions().is_empty());
    }

    #[tokio::test]
    async fn test_should_keep_committed_data_when_cancelled_after_commit() {
        let config = S3Config::builder().null_version_compat_mode(true).build();
        let (h, flaky) = Harness::with_flaky_metadata(config, VersioningStatus::Suspended);
        h.put("first").await;
        h.set_versioning(VersioningStatus::Enabled);
        h.put("second").await;
        h.set_versioning(VersioningStatus::Suspended);
        flaky.stall_deletes(true);

        // The master commit lands; removing the shadowed null never finishes.
        let put = h.provider.handle_put_object(
            PutObjectInput::builder()
                .bucket(BUCKET)
                .key(KEY)
                .body("committed")
                .build(),
        );
        let timed_out = tokio::time::timeout(Duration::from_millis(200), put).await;
        assert!(timed_out.is_err());

        h.settle().await;
        assert_eq!(h.body(None).await, "committed");
        let master = h
            .metadata
            .get_record(BUCKET, KEY, &RecordAddress::Master)
            .await
            .expect("read master")
            .expect("master record");
        assert!(master.record.location.iter().all(|l| h.data.contains(l)));
        assert_eq!(h.provider.reclaimer().stats().scheduled, 0);
    }

    #[tokio::test]
    async fn test_should_discard_null_copy_when_master_commit_keeps_failing() {
        for compat in [false, true] {
            let config = S3Config::builder()
                .null_version_compat_mode(compat)
                .max_conflict_retries(2)
                .build();
            let (h, flaky) = Harness::with_flaky_metadata(config, VersioningStatus::Disabled);
            h.put("old").await;
            h.set_versioning(VersioningStatus::Enabled);
            flaky.inject_master_conflicts(u32::MAX);

            let result = h
                .provider
                .handle_put_object(
                    PutObjectInput::builder()
                        .bucket(BUCKET)
                        .key(KEY)
                        .body("new")
                        .build(),
                )
                .await;
            assert!(matches!(
                result,
                Err(S3ServiceError::ConcurrencyConflict { attempts: 3, .. })
            ));

            let null_key = h
                .metadata
                .get_record(BUCKET, KEY, &RecordAddress::NullKey)
                .await
                .expect("read null key");
            assert!(null_key.is_none(), "compat={compat}");
            let versions = h.versions();
            assert_eq!(versions.len(), 1, "compat={compat}");
            assert!(versions[0].version_id.is_none());
            assert_eq!(h.body(None).await, "old");
            h.settle().await;
            assert_eq!(h.data.len(), 1);
        }
    }
}
