//! Container update protocol integration tests.

#[cfg(test)]
mod tests {
    use meterstack_account::{
        AccountError, ContainerUpdate, ErrorKind, ListParams, ListingEntry, UpdateContainerRequest,
    };

    use crate::{
        account_totals, backend, bucket_report, deletion, list_all, report, test_account_name,
    };

    fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                out.push(tail);
            }
        }
        out
    }

    fn apply_all(backend: &meterstack_account::AccountBackend, reports: &[UpdateContainerRequest]) {
        for req in reports {
            match backend.update_container(req) {
                Ok(_) => {}
                Err(e) => assert!(
                    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::Conflict),
                    "unexpected error: {e}"
                ),
            }
        }
    }

    #[test]
    fn test_should_create_then_delete_container() {
        let backend = backend();
        let acct = test_account_name("lifecycle");
        backend
            .update_container(&bucket_report(&acct, "photos", "photos", 10, 5, 500))
            .unwrap();
        assert_eq!(account_totals(&backend, &acct), (5, 500));
        let bucket = backend.get_bucket_info("photos").unwrap();
        assert_eq!((bucket.objects, bucket.bytes), (5, 500));

        assert_eq!(
            backend.update_container(&deletion(&acct, "photos", 11)).unwrap(),
            ContainerUpdate::Deleted
        );
        assert_eq!(account_totals(&backend, &acct), (0, 0));
        assert!(backend.get_bucket_info("photos").is_err());
        assert!(list_all(&backend, &acct, &ListParams::default()).is_empty());
        backend.delete_account(&acct).unwrap();
    }

    #[test]
    fn test_should_apply_each_report_once() {
        let backend = backend();
        let acct = test_account_name("idem");
        let req = report(&acct, "c1", 10, 5, 500);
        backend.update_container(&req).unwrap();
        for _ in 0..5 {
            let err = backend.update_container(&req).unwrap_err();
            assert!(matches!(err, AccountError::StaleUpdate { .. }));
            assert_eq!(err.kind().status_code(), 409);
        }
        assert_eq!(account_totals(&backend, &acct), (5, 500));
    }

    #[test]
    fn test_should_converge_regardless_of_report_order() {
        let acct = "order";
        let updates = vec![
            report(acct, "c1", 1, 1, 10),
            report(acct, "c1", 2, 2, 20),
            deletion(acct, "c1", 3),
            report(acct, "c1", 4, 4, 40),
        ];
        for order in permutations(&updates) {
            let backend = backend();
            backend.update_container(&report(acct, "other", 1, 100, 1000)).unwrap();
            apply_all(&backend, &order);
            assert_eq!(account_totals(&backend, acct), (104, 1040));
            let info = backend.get_container_info(acct, "c1").unwrap();
            assert_eq!((info.objects, info.bytes), (4, 40));
        }
    }

    #[test]
    fn test_should_converge_to_deleted_regardless_of_order() {
        let acct = "order-del";
        let updates = vec![
            report(acct, "c1", 1, 1, 10),
            report(acct, "c1", 2, 2, 20),
            deletion(acct, "c1", 3),
        ];
        for order in permutations(&updates) {
            let backend = backend();
            apply_all(&backend, &order);
            assert_eq!(account_totals(&backend, acct), (0, 0));
            assert!(matches!(
                backend.get_container_info(acct, "c1"),
                Err(AccountError::NoSuchContainer { .. })
            ));
        }
    }

    #[test]
    fn test_should_keep_account_equal_to_sum_of_containers() {
        let backend = backend();
        let acct = test_account_name("sum");
        for i in 0..20_i64 {
            let name = format!("c{i:02}");
            backend
                .update_container(&report(&acct, &name, 10, i, i * 100))
                .unwrap();
        }
        for i in (0..20_i64).step_by(3) {
            let name = format!("c{i:02}");
            backend
                .update_container(&report(&acct, &name, 11, i * 2, i * 50))
                .unwrap();
        }
        for i in (0..20_i64).step_by(4) {
            let name = format!("c{i:02}");
            backend.update_container(&deletion(&acct, &name, 12)).unwrap();
        }

        let page = backend
            .list_containers(&acct, &ListParams::builder().limit(1000).build())
            .unwrap();
        let (objects, bytes) = page
            .entries
            .iter()
            .fold((0, 0), |(o, b), entry| match entry {
                ListingEntry::Object(c) => (o + c.objects, b + c.bytes),
                ListingEntry::CommonPrefix(_) => (o, b),
            });
        assert_eq!(account_totals(&backend, &acct), (objects, bytes));
        assert_eq!(page.entries.len(), 15);
    }

    #[test]
    fn test_should_reject_resurrection_by_late_report() {
        let backend = backend();
        let acct = test_account_name("late");
        backend.update_container(&report(&acct, "c1", 10, 3, 30)).unwrap();
        backend.update_container(&deletion(&acct, "c1", 20)).unwrap();
        let err = backend
            .update_container(&report(&acct, "c1", 15, 3, 30))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(account_totals(&backend, &acct), (0, 0));
    }

    #[test]
    fn test_should_require_account_and_container_names() {
        let backend = backend();
        let err = backend.update_container(&report("", "c1", 1, 1, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        let err = backend.update_container(&report("acct", "", 1, 1, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_should_remove_bucket_with_root_container_only() {
        let backend = backend();
        let acct = test_account_name("root");
        backend
            .update_container(&bucket_report(&acct, "media", "media", 10, 1, 10))
            .unwrap();
        backend
            .update_container(&bucket_report(&acct, "media+segments", "media", 10, 2, 20))
            .unwrap();
        backend
            .update_container(&deletion(&acct, "media+segments", 11))
            .unwrap();
        let bucket = backend.get_bucket_info("media").unwrap();
        assert_eq!((bucket.objects, bucket.bytes), (1, 10));

        backend.update_container(&deletion(&acct, "media", 12)).unwrap();
        assert!(matches!(
            backend.get_bucket_info("media"),
            Err(AccountError::NoSuchBucket { .. })
        ));
        assert!(backend
            .list_buckets(&acct, &ListParams::default())
            .unwrap()
            .entries
            .is_empty());
    }

    #[test]
    fn test_should_not_subtract_from_bucket_named_only_by_deletion() {
        let backend = backend();
        let acct = test_account_name("late-bucket");
        backend
            .update_container(&bucket_report(&acct, "b", "b", 10, 1, 10))
            .unwrap();
        backend.update_container(&report(&acct, "c", 11, 5, 500)).unwrap();

        let mut gone = deletion(&acct, "c", 12);
        gone.bucket_name = Some("b".to_owned());
        assert_eq!(
            backend.update_container(&gone).unwrap(),
            ContainerUpdate::Deleted
        );

        let bucket = backend.get_bucket_info("b").unwrap();
        assert_eq!((bucket.objects, bucket.bytes), (1, 10));
        assert_eq!(account_totals(&backend, &acct), (1, 10));
    }

    #[test]
    fn test_should_subtract_deleted_container_from_its_bucket() {
        let backend = backend();
        let acct = test_account_name("bucket-delete");
        backend
            .update_container(&bucket_report(&acct, "b", "b", 10, 1, 10))
            .unwrap();
        backend
            .update_container(&bucket_report(&acct, "c", "b", 11, 5, 500))
            .unwrap();
        let bucket = backend.get_bucket_info("b").unwrap();
        assert_eq!((bucket.objects, bucket.bytes), (6, 510));

        let mut gone = deletion(&acct, "c", 12);
        gone.bucket_name = Some("b".to_owned());
        backend.update_container(&gone).unwrap();

        let bucket = backend.get_bucket_info("b").unwrap();
        assert_eq!((bucket.objects, bucket.bytes), (1, 10));
        assert_eq!(account_totals(&backend, &acct), (1, 10));
        // The root container keeps the bucket.
        assert_eq!(bucket.account.as_deref(), Some(acct.as_str()));
    }
}
