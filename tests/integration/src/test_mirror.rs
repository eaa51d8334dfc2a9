//! End-to-end mirror runs against a live endpoint.

#[cfg(test)]
mod tests {
    use ruststack_mirror_core::MirrorMode;

    use crate::{
        cleanup_bucket, create_test_bucket, list_keys, mirror, mirror_config, put_object,
        s3_client,
    };

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_mirror_bucket_into_empty_destination() {
        let client = s3_client();
        let source = create_test_bucket(&client, "msrc").await;
        let destination = create_test_bucket(&client, "mdst").await;
        put_object(&client, &source, "A", vec![b'a'; 100]).await;
        put_object(&client, &source, "B", vec![b'b'; 200]).await;

        let report = mirror(mirror_config(&source, &destination))
            .run()
            .await
            .expect("mirror run");

        assert_eq!(list_keys(&client, &destination).await, vec!["A", "B"]);
        assert_eq!(report.stats.objects_copied, 2);
        assert_eq!(report.stats.bytes_copied, 300);
        assert_eq!(report.stats.copy_errors, 0);
        assert!(report.unverified.is_empty());

        cleanup_bucket(&client, &source).await;
        cleanup_bucket(&client, &destination).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_skip_matching_objects_on_rerun() {
        let client = s3_client();
        let source = create_test_bucket(&client, "rsrc").await;
        let destination = create_test_bucket(&client, "rdst").await;
        put_object(&client, &source, "same.txt", "unchanged").await;

        mirror(mirror_config(&source, &destination))
            .run()
            .await
            .expect("first run");
        let report = mirror(mirror_config(&source, &destination))
            .run()
            .await
            .expect("second run");

        assert_eq!(report.stats.objects_read, 1);
        assert_eq!(report.stats.copy_calls, 0);

        cleanup_bucket(&client, &source).await;
        cleanup_bucket(&client, &destination).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_rewrite_prefix() {
        let client = s3_client();
        let source = create_test_bucket(&client, "psrc").await;
        let destination = create_test_bucket(&client, "pdst").await;
        put_object(&client, &source, "logs/2024/a.log", "a").await;
        put_object(&client, &source, "other/b.log", "b").await;

        let mut config = mirror_config(&source, &destination);
        config.prefix = Some("logs/".to_owned());
        config.dest_prefix = Some("archive/".to_owned());
        mirror(config).run().await.expect("mirror run");

        assert_eq!(
            list_keys(&client, &destination).await,
            vec!["archive/2024/a.log"]
        );

        cleanup_bucket(&client, &source).await;
        cleanup_bucket(&client, &destination).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_delete_removed_keys() {
        let client = s3_client();
        let source = create_test_bucket(&client, "dsrc").await;
        let destination = create_test_bucket(&client, "ddst").await;
        put_object(&client, &source, "keep", "k").await;
        put_object(&client, &destination, "stale", "s").await;

        let mut config = mirror_config(&source, &destination);
        config.delete_removed = true;
        let report = mirror(config).run().await.expect("mirror run");

        assert_eq!(list_keys(&client, &destination).await, vec!["keep"]);
        assert_eq!(report.stats.objects_deleted, 1);

        cleanup_bucket(&client, &source).await;
        cleanup_bucket(&client, &destination).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_purge_destination_in_delete_mode() {
        let client = s3_client();
        let source = create_test_bucket(&client, "xsrc").await;
        let destination = create_test_bucket(&client, "xdst").await;
        for key in ["one", "two", "three"] {
            put_object(&client, &destination, key, "v").await;
        }

        let mut config = mirror_config(&source, &destination);
        config.mode = MirrorMode::Delete;
        let report = mirror(config).run().await.expect("mirror run");

        assert!(list_keys(&client, &destination).await.is_empty());
        assert_eq!(report.stats.objects_deleted, 3);

        cleanup_bucket(&client, &source).await;
        cleanup_bucket(&client, &destination).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_fail_when_source_bucket_is_missing() {
        let client = s3_client();
        let destination = create_test_bucket(&client, "mdst").await;

        let result = mirror(mirror_config("no-such-bucket-mirror", &destination))
            .run()
            .await;
        assert!(result.is_err());

        cleanup_bucket(&client, &destination).await;
    }
}
