//! Restore-completed rewrites of archived versions.

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ruststack_s3_core::S3ServiceError;
    use ruststack_s3_core::config::S3Config;
    use ruststack_s3_core::ops::restore::RestoreObjectInput;
    use ruststack_s3_core::state::{
        ArchiveInfo, MetadataStore, ObjectRecord, RecordAddress, VersioningStatus, WriteTarget,
    };
    use ruststack_s3_core::storage::{DataContext, DataStore};
    use ruststack_s3_core::versioning::RESTORE_ATTEMPT_HEADER;
    use serde_json::json;

    use crate::{BUCKET, Harness, KEY};

    /// Turn `record` into an archived stub without data.
    async fn archive(h: &Harness, mut record: ObjectRecord, target: WriteTarget) {
        h.data
            .batch_delete(&record.location, &DataContext::new(BUCKET, KEY, "Archive"))
            .await
            .expect("drop data");
        record.location.clear();
        record.storage_class = "GLACIER".to_owned();
        record
            .user_metadata
            .insert(RESTORE_ATTEMPT_HEADER.to_owned(), "1".to_owned());
        record.tags = vec![("team".to_owned(), "storage".to_owned())];
        record.archive = Some(ArchiveInfo {
            archive_info: Some(json!({ "tape": "t-7" })),
            restore_requested_at: Some(Utc::now()),
            restore_requested_days: Some(1),
            ..ArchiveInfo::default()
        });
        h.metadata
            .put_record(BUCKET, record, target, None)
            .await
            .expect("archive record");
    }

    async fn restore(h: &Harness, version_id: Option<&str>, body: &'static str) {
        let input = match version_id {
            Some(v) => RestoreObjectInput::builder()
                .bucket(BUCKET)
                .key(KEY)
                .version_id(v)
                .body(body)
                .build(),
            None => RestoreObjectInput::builder().bucket(BUCKET).key(KEY).body(body).build(),
        };
        h.provider
            .handle_restore_completed(input)
            .await
            .expect("restore completed");
    }

    #[tokio::test]
    async fn test_should_restore_non_legacy_null_in_place() {
        let h = Harness::new(S3Config::default(), VersioningStatus::Suspended);
        h.put("cold").await;
        h.set_versioning(VersioningStatus::Enabled);
        h.put("hot").await;

        let null = h
            .metadata
            .get_record(BUCKET, KEY, &RecordAddress::NullKey)
            .await
            .expect("read null key")
            .expect("null key record");
        let version_id = null.record.version_id.clone();
        archive(
            &h,
            null.record,
            WriteTarget::Existing {
                version_id,
                is_null: true,
            },
        )
        .await;
        assert!(matches!(
            h.get(Some("null")).await,
            Err(S3ServiceError::InvalidObjectState)
        ));

        restore(&h, Some("null"), "cold").await;
        assert_eq!(h.body(Some("null")).await, "cold");
        assert_eq!(h.body(None).await, "hot");

        let restored = h
            .metadata
            .get_record(BUCKET, KEY, &RecordAddress::NullKey)
            .await
            .expect("read null key")
            .expect("null key record")
            .record;
        assert!(restored.is_non_legacy_null());
        assert!(!restored.user_metadata.contains_key(RESTORE_ATTEMPT_HEADER));
        assert_eq!(restored.tags, vec![("team".to_owned(), "storage".to_owned())]);
        let archive = restored.archive.expect("archive info");
        assert!(archive.restore_completed_at.is_some());
        assert!(archive.archive_info.is_some());
        assert_eq!(h.versions().len(), 2);
    }

    #[tokio::test]
    async fn test_should_restore_pre_versioning_master() {
        let h = Harness::new(S3Config::default(), VersioningStatus::Disabled);
        h.put("cold").await;
        let master = h
            .metadata
            .get_record(BUCKET, KEY, &RecordAddress::Master)
            .await
            .expect("read master")
            .expect("master record");
        archive(
            &h,
            master.record,
            WriteTarget::Existing {
                version_id: None,
                is_null: false,
            },
        )
        .await;

        restore(&h, None, "cold").await;
        let versions = h.versions();
        assert_eq!(versions.len(), 1);
        assert!(versions[0].version_id.is_none());
        assert_eq!(h.body(None).await, "cold");
    }

    #[tokio::test]
    async fn test_should_refuse_to_restore_delete_marker() {
        let h = Harness::new(S3Config::default(), VersioningStatus::Enabled);
        h.put("data").await;
        let marker = h.delete(None).await.expect("delete").version_id.expect("marker id");

        let result = h
            .provider
            .handle_restore_completed(
                RestoreObjectInput::builder()
                    .bucket(BUCKET)
                    .key(KEY)
                    .version_id(marker.as_str())
                    .body("x")
                    .build(),
            )
            .await;
        assert!(matches!(result, Err(S3ServiceError::MethodNotAllowed)));
    }
}
