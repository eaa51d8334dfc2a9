//! `S3Storage` calls against a live endpoint.

#[cfg(test)]
mod tests {
    use aws_sdk_s3::types::{BucketVersioningStatus, VersioningConfiguration};
    use ruststack_mirror_core::ObjectStorage;
    use ruststack_mirror_model::{
        AccessControlList, ByteRange, CopyRequest, DestinationMetadata, ObjectMetadata,
    };
    use ruststack_mirror_s3::S3Storage;

    use crate::{cleanup_bucket, create_test_bucket, put_object, s3_client};

    fn copy_request(source: &str, destination: &str, key: &str, version: Option<String>) -> CopyRequest {
        CopyRequest {
            source_bucket: source.to_owned(),
            source_key: key.to_owned(),
            source_version_id: version,
            destination_bucket: destination.to_owned(),
            destination_key: key.to_owned(),
            metadata: ObjectMetadata::default(),
            acl: AccessControlList::default(),
            storage_class: "STANDARD".to_owned(),
            encrypt: false,
        }
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_report_missing_object() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "head").await;
        let storage = S3Storage::new(client.clone());

        let meta = storage.get_metadata(&bucket, "absent", None).await.expect("probe");
        assert_eq!(meta, DestinationMetadata::Missing);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_list_latest_versions_only() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "lver").await;
        client
            .put_bucket_versioning()
            .bucket(&bucket)
            .versioning_configuration(
                VersioningConfiguration::builder()
                    .status(BucketVersioningStatus::Enabled)
                    .build(),
            )
            .send()
            .await
            .expect("enable versioning");
        put_object(&client, &bucket, "k", "first").await;
        put_object(&client, &bucket, "k", "second!").await;
        put_object(&client, &bucket, "gone", "x").await;
        client
            .delete_object()
            .bucket(&bucket)
            .key("gone")
            .send()
            .await
            .expect("delete");
        let storage = S3Storage::new(client.clone());

        let page = storage.list_page(&bucket, "", None, 100).await.expect("list");

        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].key, "k");
        assert_eq!(page.entries[0].size, 7);
        assert!(page.entries[0].version_id.is_some());

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_and_probe_object() {
        let client = s3_client();
        let source = create_test_bucket(&client, "csrc").await;
        let destination = create_test_bucket(&client, "cdst").await;
        put_object(&client, &source, "dir/file name.txt", "hello").await;
        let storage = S3Storage::new(client.clone());

        storage
            .copy(&copy_request(&source, &destination, "dir/file name.txt", None))
            .await
            .expect("copy");

        let meta = storage
            .get_metadata(&destination, "dir/file name.txt", None)
            .await
            .expect("probe")
            .present()
            .expect("copied object present");
        assert_eq!(meta.size, 5);

        cleanup_bucket(&client, &source).await;
        cleanup_bucket(&client, &destination).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_in_parts() {
        let client = s3_client();
        let source = create_test_bucket(&client, "msrc").await;
        let destination = create_test_bucket(&client, "mdst").await;
        let size: u64 = 6 * 1024 * 1024;
        put_object(&client, &source, "big", vec![7u8; 6 * 1024 * 1024]).await;
        let storage = S3Storage::new(client.clone());
        let request = copy_request(&source, &destination, "big", None);

        let upload_id = storage
            .initiate_multipart_copy(&request)
            .await
            .expect("initiate");
        let split = 5 * 1024 * 1024;
        let first = storage
            .copy_part(&request, &upload_id, 1, ByteRange::new(0, split - 1))
            .await
            .expect("part 1");
        let second = storage
            .copy_part(&request, &upload_id, 2, ByteRange::new(split, size - 1))
            .await
            .expect("part 2");
        storage
            .complete_multipart_copy(&request, &upload_id, &[first, second])
            .await
            .expect("complete");

        let meta = storage
            .get_metadata(&destination, "big", None)
            .await
            .expect("probe")
            .present()
            .expect("assembled object present");
        assert_eq!(meta.size, size);

        cleanup_bucket(&client, &source).await;
        cleanup_bucket(&client, &destination).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_read_object_acl() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "acl").await;
        put_object(&client, &bucket, "k", "v").await;
        let storage = S3Storage::new(client.clone());

        let acl = storage.get_acl(&bucket, "k").await.expect("acl");
        assert!(!acl.grants.is_empty());

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_delete_object() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "del").await;
        put_object(&client, &bucket, "k", "v").await;
        let storage = S3Storage::new(client.clone());

        storage.delete(&bucket, "k").await.expect("delete");
        storage.delete(&bucket, "k").await.expect("delete missing");

        assert_eq!(
            storage.get_metadata(&bucket, "k", None).await.expect("probe"),
            DestinationMetadata::Missing
        );

        cleanup_bucket(&client, &bucket).await;
    }
}
