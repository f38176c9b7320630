//! Partial-failure tests: data and metadata stores failing mid-request.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ruststack_s3_core::S3ServiceError;
    use ruststack_s3_core::config::S3Config;
    use ruststack_s3_core::ops::object::PutObjectInput;
    use ruststack_s3_core::state::{MetadataStore, VersioningStatus};
    use ruststack_s3_core::storage::DataStore;

    use crate::faults::{FailingDataStore, FlakyMetadataStore};
    use crate::{BUCKET, Harness, KEY};

    async fn try_put(h: &Harness, body: &'static str) -> Result<(), S3ServiceError> {
        h.provider
            .handle_put_object(PutObjectInput::builder().bucket(BUCKET).key(KEY).body(body).build())
            .await
            .map(|_| ())
    }

    #[tokio::test]
    async fn test_should_delete_new_data_when_metadata_write_fails() {
        let (h, flaky) = Harness::with_flaky_metadata(S3Config::default(), VersioningStatus::Enabled);
        h.put("kept").await;
        flaky.fail_conditional_puts(true);

        let result = try_put(&h, "orphan").await;
        assert!(matches!(
            result,
            Err(S3ServiceError::BackendUnavailable { backend: "metadata", .. })
        ));

        // Cleanup ran before the error was returned.
        assert_eq!(h.data.len(), 1);
        let versions = h.versions();
        assert_eq!(versions.len(), 1);
        assert!(versions[0].location.iter().all(|l| h.data.contains(l)));
        assert_eq!(h.body(None).await, "kept");
    }

    #[tokio::test]
    async fn test_should_not_touch_metadata_when_data_write_fails() {
        let (h, failing) = Harness::with_failing_data(S3Config::default(), VersioningStatus::Enabled);
        h.put("kept").await;
        failing.fail_puts(true);

        let result = try_put(&h, "lost").await;
        assert!(matches!(
            result,
            Err(S3ServiceError::BackendUnavailable { backend: "data", .. })
        ));
        assert_eq!(h.versions().len(), 1);
        assert_eq!(h.body(None).await, "kept");
    }

    #[tokio::test]
    async fn test_should_commit_even_when_reclaim_fails() {
        let (h, failing) = Harness::with_failing_data(S3Config::default(), VersioningStatus::Disabled);
        h.put("one").await;
        failing.fail_deletes(true);

        try_put(&h, "two").await.expect("put succeeds");
        h.settle().await;

        assert_eq!(h.body(None).await, "two");
        let stats = h.provider.reclaimer().stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
        // The superseded block leaks instead of failing the request.
        assert_eq!(h.data.len(), 2);
    }

    #[tokio::test]
    async fn test_should_surface_metadata_error_when_cleanup_also_fails() {
        let mut flaky = None;
        let mut failing = None;
        let h = Harness::wrapped(
            S3Config::default(),
            VersioningStatus::Enabled,
            |m| {
                let store = Arc::new(FlakyMetadataStore::new(m));
                flaky = Some(Arc::clone(&store));
                store as Arc<dyn MetadataStore>
            },
            |d| {
                let store = Arc::new(FailingDataStore::new(d));
                failing = Some(Arc::clone(&store));
                store as Arc<dyn DataStore>
            },
        );
        let flaky = flaky.expect("metadata wrapper");
        let failing = failing.expect("data wrapper");
        flaky.fail_conditional_puts(true);
        failing.fail_deletes(true);

        let result = try_put(&h, "orphan").await;
        assert!(matches!(
            result,
            Err(S3ServiceError::BackendUnavailable { backend: "metadata", .. })
        ));
        assert!(h.versions().is_empty());
    }
}
