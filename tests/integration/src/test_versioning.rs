//! Version history tests across bucket states and null-version layouts.

#[cfg(test)]
mod tests {
    use ruststack_s3_core::S3ServiceError;
    use ruststack_s3_core::checksums::compute_md5;
    use ruststack_s3_core::config::S3Config;
    use ruststack_s3_core::state::VersioningStatus;

    use crate::{Harness, put_with};

    fn compat() -> S3Config {
        S3Config::builder().null_version_compat_mode(true).build()
    }

    fn md5(body: &str) -> String {
        compute_md5(body.as_bytes())
    }

    #[tokio::test]
    async fn test_should_overwrite_master_on_never_versioned_bucket() {
        let h = Harness::new(S3Config::default(), VersioningStatus::Disabled);
        let first = h.put("one").await;
        let second = h.put("two").await;
        h.settle().await;

        assert!(first.version_id.is_none());
        assert!(second.version_id.is_none());
        let versions = h.versions();
        assert_eq!(versions.len(), 1);
        assert!(versions[0].version_id.is_none());
        assert_eq!(h.body(None).await, "two");
        assert_eq!(h.data.len(), 1);
    }

    #[tokio::test]
    async fn test_should_create_plain_version_on_enabled_bucket() {
        let h = Harness::new(S3Config::default(), VersioningStatus::Enabled);
        let out = h.put("one").await;
        let token = out.version_id.expect("version id");
        assert_ne!(token, "null");

        let versions = h.versions();
        assert_eq!(versions.len(), 1);
        assert!(!versions[0].is_null);
        assert!(versions[0].null_version_id.is_none());
    }

    #[tokio::test]
    async fn test_should_relocate_legacy_null_to_null_key() {
        let h = Harness::new(compat(), VersioningStatus::Suspended);
        let legacy = h.put("old").await;
        assert_eq!(legacy.version_id.as_deref(), Some("null"));
        let master = &h.versions()[0];
        assert!(master.is_null && !master.is_null2);

        h.set_versioning(VersioningStatus::Enabled);
        let provider = h.reopen(S3Config::default());
        let newer = put_with(&provider, "new").await;
        h.settle().await;

        let versions = h.versions();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].content_md5, md5("new"));
        assert!(versions[0].null_version_id.is_none());
        assert!(versions[1].is_non_legacy_null());
        assert_eq!(versions[1].content_md5, md5("old"));

        // The relocation delete leaves the data alone.
        assert_eq!(h.data.len(), 2);
        assert_eq!(h.body(Some("null")).await, "old");
        let token = newer.version_id.expect("version id");
        assert_eq!(h.body(Some(&token)).await, "new");
    }

    #[tokio::test]
    async fn test_should_reference_shadowed_null_in_compat_mode() {
        let h = Harness::new(compat(), VersioningStatus::Suspended);
        h.put("old").await;
        h.set_versioning(VersioningStatus::Enabled);
        h.put("new").await;
        h.settle().await;

        let versions = h.versions();
        assert_eq!(versions.len(), 2);
        let current = &versions[0];
        let preserved = &versions[1];
        assert!(preserved.is_null && !preserved.is_null2);
        assert_eq!(current.null_version_id, preserved.version_id);
        assert_eq!(h.data.len(), 2);
        assert_eq!(h.body(Some("null")).await, "old");
    }

    #[tokio::test]
    async fn test_should_drop_referenced_null_when_suspended() {
        let h = Harness::new(compat(), VersioningStatus::Suspended);
        h.put("n1").await;
        h.set_versioning(VersioningStatus::Enabled);
        h.put("v2").await;
        h.set_versioning(VersioningStatus::Suspended);
        let out = h.put("n3").await;
        h.settle().await;

        assert_eq!(out.version_id.as_deref(), Some("null"));
        assert_eq!(
            h.history(),
            vec![(true, md5("n3"), false), (false, md5("v2"), false)]
        );
        assert_eq!(h.data.len(), 2);
        assert_eq!(h.body(Some("null")).await, "n3");
    }

    #[tokio::test]
    async fn test_should_produce_same_history_in_both_layouts() {
        let mut histories = Vec::new();
        for config in [S3Config::default(), compat()] {
            let h = Harness::new(config, VersioningStatus::Disabled);
            h.put("pre").await;
            h.set_versioning(VersioningStatus::Enabled);
            h.put("v1").await;
            assert_eq!(h.body(Some("null")).await, "pre");
            h.set_versioning(VersioningStatus::Suspended);
            h.put("s1").await;
            h.set_versioning(VersioningStatus::Enabled);
            h.put("v2").await;
            assert_eq!(h.body(Some("null")).await, "s1");
            h.settle().await;
            assert_eq!(h.data.len(), 3);
            histories.push(h.history());
        }
        assert_eq!(
            histories[0],
            vec![
                (false, md5("v2"), false),
                (true, md5("s1"), false),
                (false, md5("v1"), false),
            ]
        );
        assert_eq!(histories[0], histories[1]);
    }

    #[tokio::test]
    async fn test_should_keep_one_null_version_across_layout_switch() {
        for (before, after) in [(S3Config::default(), compat()), (compat(), S3Config::default())] {
            let h = Harness::new(before, VersioningStatus::Disabled);
            h.put("a").await;
            h.set_versioning(VersioningStatus::Enabled);
            h.put("b").await;

            let switched = h.reopen(after);
            h.set_versioning(VersioningStatus::Suspended);
            put_with(&switched, "c").await;
            h.settle().await;
            switched.reclaimer().flush().await;

            assert_eq!(
                h.history(),
                vec![(true, md5("c"), false), (false, md5("b"), false)]
            );
            assert_eq!(h.body(Some("null")).await, "c");
            assert_eq!(h.data.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_should_preserve_pre_versioning_object_under_infinite_id() {
        for config in [S3Config::default(), compat()] {
            let h = Harness::new(config, VersioningStatus::Disabled);
            h.put("pre").await;
            h.set_versioning(VersioningStatus::Enabled);
            h.put("v1").await;

            let infinite = h.codec.infinite_version_id();
            let versions = h.versions();
            assert_eq!(versions.len(), 2);
            assert_eq!(versions[1].version_id.as_deref(), Some(infinite.as_str()));
            assert!(versions[1].is_null);
            assert_eq!(h.body(Some("null")).await, "pre");
        }
    }

    #[tokio::test]
    async fn test_should_delete_null_version_by_token() {
        for config in [S3Config::default(), compat()] {
            let h = Harness::new(config, VersioningStatus::Suspended);
            h.put("n1").await;
            h.set_versioning(VersioningStatus::Enabled);
            h.put("v2").await;

            let out = h.delete(Some("null")).await.expect("delete null");
            assert_eq!(out.version_id.as_deref(), Some("null"));
            assert!(!out.delete_marker);
            h.settle().await;

            assert_eq!(h.history(), vec![(false, md5("v2"), false)]);
            assert_eq!(h.data.len(), 1);
            assert!(matches!(
                h.get(Some("null")).await,
                Err(S3ServiceError::NoSuchVersion { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_should_replace_null_with_null_delete_marker_when_suspended() {
        let h = Harness::new(S3Config::default(), VersioningStatus::Suspended);
        h.put("data").await;
        let out = h.delete(None).await.expect("delete");
        assert!(out.delete_marker);
        assert_eq!(out.version_id.as_deref(), Some("null"));
        h.settle().await;

        assert_eq!(h.history(), vec![(true, md5(""), true)]);
        assert!(h.data.is_empty());
        assert!(matches!(h.get(None).await, Err(S3ServiceError::NoSuchKey { .. })));
    }

    #[tokio::test]
    async fn test_should_restore_previous_version_when_current_is_deleted() {
        let h = Harness::new(S3Config::default(), VersioningStatus::Enabled);
        h.put("one").await;
        let two = h.put("two").await.version_id.expect("version id");

        h.delete(Some(&two)).await.expect("delete version");
        assert_eq!(h.body(None).await, "one");
    }

    #[tokio::test]
    async fn test_should_keep_history_behind_delete_marker() {
        let h = Harness::new(S3Config::default(), VersioningStatus::Enabled);
        let one = h.put("one").await.version_id.expect("version id");
        let marker = h.delete(None).await.expect("delete");
        assert!(marker.delete_marker);

        assert!(matches!(h.get(None).await, Err(S3ServiceError::NoSuchKey { .. })));
        assert_eq!(h.body(Some(&one)).await, "one");
        assert_eq!(h.versions().len(), 2);
    }

    #[tokio::test]
    async fn test_should_reject_malformed_version_token() {
        let h = Harness::new(S3Config::default(), VersioningStatus::Enabled);
        h.put("one").await;
        assert!(matches!(
            h.get(Some("definitely not a token")).await,
            Err(S3ServiceError::InvalidVersionId { .. })
        ));
        assert!(matches!(
            h.delete(Some("definitely not a token")).await,
            Err(S3ServiceError::InvalidVersionId { .. })
        ));
        assert_eq!(h.versions().len(), 1);
    }
}
