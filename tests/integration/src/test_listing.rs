//! Container and bucket listing integration tests.

#[cfg(test)]
mod tests {
    use meterstack_account::{AccountBackend, ListParams, ListingEntry};

    use crate::{backend, bucket_report, list_all, report, test_account_name};

    /// `0-0000` .. `3-0124`, plus `2-0051-xxxx` and `3-xxxx-0049` families.
    fn populated() -> (AccountBackend, String) {
        let backend = backend();
        let acct = test_account_name("listing");
        let mut names = Vec::new();
        for a in 0..4 {
            for b in 0..125 {
                names.push(format!("{a}-{b:04}"));
            }
        }
        for b in 0..125 {
            names.push(format!("2-0051-{b:04}"));
            names.push(format!("3-{b:04}-0049"));
        }
        for name in &names {
            backend
                .update_container(&report(&acct, name, 10, 0, 0))
                .unwrap();
        }
        (backend, acct)
    }

    fn names(backend: &AccountBackend, acct: &str, params: &ListParams) -> Vec<String> {
        backend
            .list_containers(acct, params)
            .unwrap()
            .names()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn test_should_honor_markers_prefixes_and_delimiters() {
        let (backend, acct) = populated();

        let page = names(&backend, &acct, &ListParams::builder().limit(100).build());
        assert_eq!(page.len(), 100);
        assert_eq!((page[0].as_str(), page[99].as_str()), ("0-0000", "0-0099"));

        let page = names(
            &backend,
            &acct,
            &ListParams::builder().limit(100).end_marker("0-0050").build(),
        );
        assert_eq!(page.len(), 50);
        assert_eq!(page.last().map(String::as_str), Some("0-0049"));

        let page = names(
            &backend,
            &acct,
            &ListParams::builder().limit(100).marker("0-0098").build(),
        );
        assert_eq!(page.len(), 100);
        assert_eq!((page[0].as_str(), page[99].as_str()), ("0-0099", "1-0073"));

        let page = names(
            &backend,
            &acct,
            &ListParams::builder().limit(55).marker("1-0074").build(),
        );
        assert_eq!(page.len(), 55);
        assert_eq!((page[0].as_str(), page[54].as_str()), ("1-0075", "2-0004"));

        for delimiter in [None, Some("-")] {
            let mut params = ListParams::builder().limit(10).prefix("0-01").build();
            params.delimiter = delimiter.map(str::to_owned);
            let page = names(&backend, &acct, &params);
            assert_eq!((page[0].as_str(), page[9].as_str()), ("0-0100", "0-0109"));
        }

        let page = names(
            &backend,
            &acct,
            &ListParams::builder().limit(10).delimiter("-").build(),
        );
        assert_eq!(page, vec!["0-", "1-", "2-", "3-"]);

        let page = names(
            &backend,
            &acct,
            &ListParams::builder().limit(10).marker("2-").delimiter("-").build(),
        );
        assert_eq!(page, vec!["3-"]);

        let page = names(
            &backend,
            &acct,
            &ListParams::builder().limit(10).prefix("2").delimiter("-").build(),
        );
        assert_eq!(page, vec!["2-"]);

        let page = names(
            &backend,
            &acct,
            &ListParams::builder()
                .limit(10)
                .marker("2-0050")
                .prefix("2-")
                .delimiter("-")
                .build(),
        );
        assert_eq!(page.len(), 10);
        assert_eq!(&page[..3], ["2-0051", "2-0051-", "2-0052"]);
        assert_eq!(page[9], "2-0059");

        let page = names(
            &backend,
            &acct,
            &ListParams::builder()
                .limit(10)
                .marker("3-0045")
                .prefix("3-")
                .delimiter("-")
                .build(),
        );
        assert_eq!(
            page,
            vec![
                "3-0045-", "3-0046", "3-0046-", "3-0047", "3-0047-", "3-0048", "3-0048-",
                "3-0049", "3-0049-", "3-0050",
            ]
        );
    }

    #[test]
    fn test_should_list_names_ending_with_delimiter() {
        let (backend, acct) = populated();
        backend
            .update_container(&report(&acct, "3-0049-", 10, 0, 0))
            .unwrap();

        let page = names(
            &backend,
            &acct,
            &ListParams::builder().limit(10).marker("3-0048").build(),
        );
        assert_eq!(
            page,
            vec![
                "3-0048-0049", "3-0049", "3-0049-", "3-0049-0049", "3-0050", "3-0050-0049",
                "3-0051", "3-0051-0049", "3-0052", "3-0052-0049",
            ]
        );

        let page = names(
            &backend,
            &acct,
            &ListParams::builder()
                .limit(10)
                .marker("3-0048")
                .prefix("3-")
                .delimiter("-")
                .build(),
        );
        assert_eq!(
            page,
            vec![
                "3-0048-", "3-0049", "3-0049-", "3-0050", "3-0050-", "3-0051", "3-0051-",
                "3-0052", "3-0052-", "3-0053",
            ]
        );

        let page = names(
            &backend,
            &acct,
            &ListParams::builder().limit(10).prefix("3-0049-").delimiter("-").build(),
        );
        assert_eq!(page, vec!["3-0049-", "3-0049-0049"]);
    }

    #[test]
    fn test_should_paginate_to_completion() {
        let (backend, acct) = populated();
        let everything = names(&backend, &acct, &ListParams::builder().limit(10_000).build());
        assert_eq!(everything.len(), 750);
        for limit in [1, 7, 100, 749, 750, 751] {
            let all = list_all(&backend, &acct, &ListParams::builder().limit(limit).build());
            assert_eq!(all, everything, "limit {limit}");
        }

        let prefixed = list_all(
            &backend,
            &acct,
            &ListParams::builder().limit(13).prefix("2-0051").build(),
        );
        assert_eq!(prefixed.len(), 126);
        assert!(prefixed.iter().all(|n| n.starts_with("2-0051")));
    }

    #[test]
    fn test_should_paginate_grouped_listing_without_repeats() {
        let (backend, acct) = populated();
        let all = list_all(
            &backend,
            &acct,
            &ListParams::builder().limit(3).prefix("2-").delimiter("-").build(),
        );
        assert_eq!(all.len(), 126);
        assert_eq!(all.iter().filter(|n| n.as_str() == "2-0051-").count(), 1);
    }

    #[test]
    fn test_should_group_slash_delimited_names() {
        let backend = backend();
        let acct = test_account_name("slash");
        for name in ["a/x", "a/y", "b"] {
            backend.update_container(&report(&acct, name, 10, 1, 1)).unwrap();
        }
        let page = backend
            .list_containers(&acct, &ListParams::builder().delimiter("/").build())
            .unwrap();
        assert_eq!(page.names(), vec!["a/", "b"]);
        assert!(matches!(page.entries[0], ListingEntry::CommonPrefix(_)));
        assert!(matches!(page.entries[1], ListingEntry::Object(_)));
        assert_eq!(page.next_marker, None);
    }

    #[test]
    fn test_should_keep_only_valid_bucket_names() {
        let backend = backend();
        let acct = test_account_name("s3only");
        for name in ["good-bucket", "Bad_Bucket", "10.0.0.1", "x", "ok.name"] {
            backend.update_container(&report(&acct, name, 10, 1, 1)).unwrap();
        }
        let page = backend
            .list_containers(&acct, &ListParams::builder().s3_buckets_only(true).build())
            .unwrap();
        assert_eq!(page.names(), vec!["good-bucket", "ok.name"]);
    }

    #[test]
    fn test_should_page_through_buckets() {
        let backend = backend();
        let acct = test_account_name("buckets");
        for i in 0..12 {
            let name = format!("bucket-{i:02}");
            backend
                .update_container(&bucket_report(&acct, &name, &name, 10, i, i * 10))
                .unwrap();
        }
        let mut seen = Vec::new();
        let mut params = ListParams::builder().limit(5).build();
        loop {
            let page = backend.list_buckets(&acct, &params).unwrap();
            for entry in &page.entries {
                let ListingEntry::Object(bucket) = entry else {
                    panic!("bucket listings have no common prefixes");
                };
                seen.push((bucket.name.clone(), bucket.objects));
            }
            match page.next_marker {
                Some(next) => params.marker = Some(next),
                None => break,
            }
        }
        assert_eq!(seen.len(), 12);
        assert_eq!(seen[11], ("bucket-11".to_owned(), 11));
        assert_eq!(backend.info_account(&acct).unwrap().buckets, 12);
    }
}
