//! Multipart completion through the versioning pipeline.

#[cfg(test)]
mod tests {
    use ruststack_s3_core::config::S3Config;
    use ruststack_s3_core::ops::multipart::{
        CompleteMultipartUploadInput, CompletedPart, CreateMultipartUploadInput, UploadPartInput,
    };
    use ruststack_s3_core::state::VersioningStatus;

    use crate::{BUCKET, Harness, KEY};

    /// Upload `parts` as one multipart upload and complete it.
    async fn complete_upload(h: &Harness, parts: &[&'static str]) -> (String, Option<String>) {
        let upload_id = h
            .provider
            .handle_create_multipart_upload(
                CreateMultipartUploadInput::builder().bucket(BUCKET).key(KEY).build(),
            )
            .await
            .expect("create upload");

        let mut completed = Vec::new();
        for (i, body) in parts.iter().enumerate() {
            let part_number = u32::try_from(i + 1).expect("part number");
            let e_tag = h
                .provider
                .handle_upload_part(
                    UploadPartInput::builder()
                        .bucket(BUCKET)
                        .key(KEY)
                        .upload_id(upload_id.as_str())
                        .part_number(part_number)
                        .body(*body)
                        .build(),
                )
                .await
                .expect("upload part");
            completed.push(CompletedPart { part_number, e_tag });
        }

        let out = h
            .provider
            .handle_complete_multipart_upload(
                CompleteMultipartUploadInput::builder()
                    .bucket(BUCKET)
                    .key(KEY)
                    .upload_id(upload_id.as_str())
                    .parts(completed)
                    .build(),
            )
            .await
            .expect("complete upload");
        (upload_id, out.version_id)
    }

    #[tokio::test]
    async fn test_should_version_completed_upload_like_a_put() {
        let h = Harness::new(S3Config::default(), VersioningStatus::Enabled);
        h.put("before").await;
        let (upload_id, version_id) = complete_upload(&h, &["ab", "cd"]).await;
        let token = version_id.expect("version id");

        assert_eq!(h.body(None).await, "abcd");
        assert_eq!(h.body(Some(&token)).await, "abcd");
        let versions = h.versions();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].upload_id.as_deref(), Some(upload_id.as_str()));
        assert!(h.metadata.has_replay_entry(BUCKET, &upload_id));
    }

    #[tokio::test]
    async fn test_should_drop_replay_entry_when_upload_version_is_deleted() {
        let h = Harness::new(S3Config::default(), VersioningStatus::Enabled);
        let (upload_id, version_id) = complete_upload(&h, &["x"]).await;
        let token = version_id.expect("version id");

        h.delete(Some(&token)).await.expect("delete version");
        h.settle().await;
        assert!(!h.metadata.has_replay_entry(BUCKET, &upload_id));
        assert!(h.data.is_empty());
    }

    #[tokio::test]
    async fn test_should_drop_replay_entry_when_null_upload_is_overwritten() {
        let h = Harness::new(S3Config::default(), VersioningStatus::Suspended);
        let (upload_id, version_id) = complete_upload(&h, &["x"]).await;
        assert_eq!(version_id.as_deref(), Some("null"));

        h.put("plain").await;
        h.settle().await;
        assert!(!h.metadata.has_replay_entry(BUCKET, &upload_id));
        assert_eq!(h.data.len(), 1);
    }

    #[tokio::test]
    async fn test_should_keep_replay_entry_while_shadowed_null_survives() {
        for config in [
            S3Config::default(),
            S3Config::builder().null_version_compat_mode(true).build(),
        ] {
            let h = Harness::new(config, VersioningStatus::Suspended);
            let (upload_id, _) = complete_upload(&h, &["x"]).await;

            h.set_versioning(VersioningStatus::Enabled);
            h.put("v2").await;
            assert!(h.metadata.has_replay_entry(BUCKET, &upload_id));
            assert_eq!(h.body(Some("null")).await, "x");

            h.set_versioning(VersioningStatus::Suspended);
            h.put("n3").await;
            h.settle().await;
            assert!(!h.metadata.has_replay_entry(BUCKET, &upload_id));
            assert_eq!(h.data.len(), 2);
        }
    }
}
