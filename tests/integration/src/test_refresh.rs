//! Refresh and shard folding integration tests.

#[cfg(test)]
mod tests {
    use meterstack_account::keyspace::{field, shard_account, wrap_counter};
    use meterstack_account::{AccountBackend, AccountError, ListParams, RefreshStep};
    use meterstack_kv::KvError;

    use crate::{account_totals, backend, bucket_report, report, test_account_name};

    fn shard_name(logical: &str, n: u64) -> String {
        let hash = "9f86d081884c7d65".repeat(4);
        format!("{logical}-{hash}-{:016}-{n}", 1_700_000_000_000_000 + n)
    }

    fn set_bucket_counters(backend: &AccountBackend, bucket: &str, objects: i64, bytes: i64) {
        let keys = backend.keyspace().clone();
        backend
            .database()
            .run(|tr| {
                tr.set(&keys.bucket_field(bucket, field::OBJECTS), &wrap_counter(objects));
                tr.set(&keys.bucket_field(bucket, field::BYTES), &wrap_counter(bytes));
                Ok::<_, KvError>(())
            })
            .unwrap();
    }

    fn set_account_counters(backend: &AccountBackend, account: &str, objects: i64, bytes: i64) {
        let keys = backend.keyspace().clone();
        backend
            .database()
            .run(|tr| {
                tr.set(&keys.account_field(account, field::OBJECTS), &wrap_counter(objects));
                tr.set(&keys.account_field(account, field::BYTES), &wrap_counter(bytes));
                Ok::<_, KvError>(())
            })
            .unwrap();
    }

    /// A bucket root plus three shards of it holding 3, 4 and 5 objects.
    fn sharded(acct: &str) -> AccountBackend {
        let backend = backend();
        backend
            .update_container(&bucket_report(acct, "media", "media", 10, 0, 0))
            .unwrap();
        let shards = shard_account(acct);
        for (n, objects) in [(0, 3), (1, 4), (2, 5)] {
            backend
                .update_container(&bucket_report(
                    &shards,
                    &shard_name("media", n),
                    "media",
                    10,
                    objects,
                    objects * 100,
                ))
                .unwrap();
        }
        backend
    }

    #[test]
    fn test_should_fold_shards_on_bucket_refresh() {
        let acct = test_account_name("fold");
        let backend = sharded(&acct);
        backend.refresh_bucket("media", 100).unwrap();

        let info = backend.get_container_info(&acct, "media").unwrap();
        assert_eq!((info.objects, info.bytes), (12, 1200));
        let bucket = backend.get_bucket_info("media").unwrap();
        assert_eq!((bucket.objects, bucket.bytes), (12, 1200));
        assert_eq!(bucket.account.as_deref(), Some(acct.as_str()));
    }

    #[test]
    fn test_should_fold_shards_on_account_refresh() {
        let acct = test_account_name("fold-acct");
        let backend = sharded(&acct);
        backend.update_container(&report(&acct, "plain", 10, 2, 2)).unwrap();
        assert_eq!(account_totals(&backend, &acct), (2, 2));

        backend.refresh_account(&acct).unwrap();
        assert_eq!(account_totals(&backend, &acct), (14, 1202));
        // Folding twice does not double count.
        backend.refresh_account(&acct).unwrap();
        assert_eq!(account_totals(&backend, &acct), (14, 1202));
    }

    #[test]
    fn test_should_not_depend_on_batch_size() {
        let acct = test_account_name("batches");
        let shards = shard_account(&acct);
        for batch_size in 1..=8 {
            let backend = sharded(&acct);
            for i in 0..4_i64 {
                let name = format!("media-part{i}");
                backend
                    .update_container(&bucket_report(&acct, &name, "media", 10, i, 10))
                    .unwrap();
            }
            backend
                .update_container(&bucket_report(&acct, "media+segments", "media", 10, 50, 500))
                .unwrap();
            backend
                .update_container(&bucket_report(&acct, "unrelated", "elsewhere", 10, 7, 7))
                .unwrap();
            backend
                .update_container(&report(&shards, "media-not-a-shard", 10, 1000, 1000))
                .unwrap();
            set_bucket_counters(&backend, "media", -1, 123_456);

            backend.refresh_bucket("media", batch_size).unwrap();
            let bucket = backend.get_bucket_info("media").unwrap();
            assert_eq!(
                (bucket.objects, bucket.bytes),
                (12 + 6, 1200 + 40 + 500),
                "batch size {batch_size}"
            );
        }
    }

    #[test]
    fn test_should_repair_drifted_counters() {
        let backend = backend();
        let acct = test_account_name("drift");
        for i in 1..=5_i64 {
            let name = format!("bkt-{i}");
            backend
                .update_container(&bucket_report(&acct, &name, &name, 10, i, i * 10))
                .unwrap();
        }
        set_account_counters(&backend, &acct, 0, -40);
        set_bucket_counters(&backend, "bkt-3", 77, 77);

        backend.refresh_account(&acct).unwrap();
        assert_eq!(account_totals(&backend, &acct), (15, 150));
        backend.refresh_bucket("bkt-3", 2).unwrap();
        let bucket = backend.get_bucket_info("bkt-3").unwrap();
        assert_eq!((bucket.objects, bucket.bytes), (3, 30));
    }

    #[test]
    fn test_should_abort_superseded_pass() {
        let acct = test_account_name("supersede");
        let backend = sharded(&acct);
        let mut old = backend.begin_bucket_refresh("media", 1).unwrap();
        assert_eq!(old.step().unwrap(), RefreshStep::Continue);
        assert_eq!(old.owner(), acct);

        let mut new = backend.begin_bucket_refresh("media", 1).unwrap();
        assert!(matches!(
            old.step(),
            Err(AccountError::RefreshSuperseded { .. })
        ));
        assert!(!old.is_done());

        new.run().unwrap();
        assert!(new.is_done());
        assert_eq!(backend.get_bucket_info("media").unwrap().objects, 12);
    }

    #[test]
    fn test_should_not_double_fold_shards_across_refresh_kinds() {
        let acct = test_account_name("interleave");
        let backend = sharded(&acct);
        let mut pass = backend.begin_bucket_refresh("media", 1).unwrap();
        assert_eq!(pass.step().unwrap(), RefreshStep::Continue);

        backend.refresh_account(&acct).unwrap();
        let info = backend.get_container_info(&acct, "media").unwrap();
        assert_eq!((info.objects, info.bytes), (12, 1200));

        assert!(matches!(
            pass.run(),
            Err(AccountError::RefreshSuperseded { .. })
        ));
        let info = backend.get_container_info(&acct, "media").unwrap();
        assert_eq!((info.objects, info.bytes), (12, 1200));

        backend.refresh_bucket("media", 1).unwrap();
        let bucket = backend.get_bucket_info("media").unwrap();
        assert_eq!((bucket.objects, bucket.bytes), (12, 1200));
        assert_eq!(account_totals(&backend, &acct), (12, 1200));
    }

    #[test]
    fn test_should_wrap_account_totals_like_incremental_updates() {
        let backend = backend();
        let acct = test_account_name("wrap");
        let max = i64::from(i32::MAX);
        backend.update_container(&report(&acct, "big", 10, 1, max)).unwrap();
        backend.update_container(&report(&acct, "one", 10, 1, 1)).unwrap();
        let incremental = account_totals(&backend, &acct);
        assert_eq!(incremental, (2, i64::from(i32::MIN)));

        backend.refresh_account(&acct).unwrap();
        assert_eq!(account_totals(&backend, &acct), incremental);
    }

    #[test]
    fn test_should_reject_refresh_of_unknown_targets() {
        let backend = backend();
        assert!(matches!(
            backend.refresh_bucket("missing", 10),
            Err(AccountError::NoSuchBucket { .. })
        ));
        assert!(matches!(
            backend.refresh_account("missing"),
            Err(AccountError::NoSuchAccount { .. })
        ));
        assert!(backend
            .list_buckets("missing", &ListParams::default())
            .unwrap()
            .entries
            .is_empty());
    }
}
