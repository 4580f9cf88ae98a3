//! Concurrent update integration tests.

#[cfg(test)]
mod tests {
    use std::thread;

    use meterstack_account::{AccountConfig, ErrorKind, ListParams};
    use meterstack_kv::RetryConfig;

    use crate::{account_totals, backend_with, bucket_report, list_all, report, test_account_name};

    fn patient() -> AccountConfig {
        AccountConfig::builder()
            .retry(
                RetryConfig::builder()
                    .max_attempts(1000)
                    .initial_backoff_ms(1)
                    .max_backoff_ms(2)
                    .build(),
            )
            .build()
    }

    #[test]
    fn test_should_sum_parallel_updates_to_distinct_containers() {
        let backend = backend_with(patient());
        let acct = test_account_name("parallel");
        backend.create_account(&acct).unwrap();

        thread::scope(|s| {
            for t in 0..8_i64 {
                let backend = &backend;
                let acct = &acct;
                s.spawn(move || {
                    for i in 0..25_i64 {
                        let name = format!("t{t}-c{i:02}");
                        backend
                            .update_container(&bucket_report(acct, &name, "shared", 10, 1, i))
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(account_totals(&backend, &acct), (200, 8 * 300));
        assert_eq!(list_all(&backend, &acct, &ListParams::default()).len(), 200);
        let bucket = backend.get_bucket_info("shared").unwrap();
        assert_eq!((bucket.objects, bucket.bytes), (200, 8 * 300));
    }

    #[test]
    fn test_should_keep_newest_report_under_contention() {
        let backend = backend_with(patient());
        let acct = test_account_name("contention");

        thread::scope(|s| {
            for t in 0..6_u64 {
                let backend = &backend;
                let acct = &acct;
                s.spawn(move || {
                    for round in 0..20_u64 {
                        let mtime = 100 + round * 6 + t;
                        let size = i64::try_from(mtime).unwrap();
                        match backend.update_container(&report(acct, "hot", mtime, size, size * 2)) {
                            Ok(_) => {}
                            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict, "{e}"),
                        }
                    }
                });
            }
        });

        let newest = i64::try_from(100 + 19 * 6 + 5_u64).unwrap();
        let info = backend.get_container_info(&acct, "hot").unwrap();
        assert_eq!((info.objects, info.bytes), (newest, newest * 2));
        assert_eq!(account_totals(&backend, &acct), (newest, newest * 2));
    }

    #[test]
    fn test_should_never_orphan_containers_when_deleting_account() {
        for round in 0..20_u64 {
            let backend = backend_with(patient());
            let acct = test_account_name("race");
            backend.create_account(&acct).unwrap();

            thread::scope(|s| {
                s.spawn(|| {
                    let _ = backend.update_container(&report(&acct, "late", 10 + round, 3, 30));
                });
                s.spawn(|| match backend.delete_account(&acct) {
                    Ok(()) => {}
                    Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict, "{e}"),
                });
            });

            let containers = list_all(&backend, &acct, &ListParams::default());
            match backend.info_account(&acct) {
                Ok(info) => {
                    assert_eq!(info.containers, containers.len());
                    let n = i64::try_from(containers.len()).unwrap();
                    assert_eq!((info.objects, info.bytes), (3 * n, 30 * n));
                }
                Err(e) => {
                    assert_eq!(e.kind(), ErrorKind::NotFound);
                    assert!(containers.is_empty(), "orphaned {containers:?}");
                }
            }
        }
    }
}
