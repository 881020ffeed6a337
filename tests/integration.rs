use chrono::{TimeZone, Utc};
use spaces_client::{
    cdn::{CdnClient, MockCdnClient},
    client::{ClientServices, ObjectStorageClient},
    models::{Acl, Config, ListOptions, SortOrder, UploadOptions},
    retry::RetryPolicy,
    storage::MockObjectStore,
    Error,
};
use std::fs;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> Config {
    Config::new("https://sfo3.digitaloceanspaces.com", "assets").with_cdn_api_token("do-token")
}

fn build_client(store: MockObjectStore, cdn: MockCdnClient) -> ObjectStorageClient {
    ObjectStorageClient::with_services(
        test_config(),
        ClientServices {
            store: Box::new(store),
            cdn: Some(Box::new(cdn)),
        },
    )
    .with_retry_policy(RetryPolicy::default().with_base_delay(Duration::ZERO))
}

#[tokio::test]
async fn test_upload_list_download_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("report.csv");
    fs::write(&local, "a,b\n1,2\n").unwrap();

    let store = MockObjectStore::new();
    let client = build_client(store.clone(), MockCdnClient::new());

    let url = client
        .upload(&local, "reports/2024/report.csv", Acl::Private, UploadOptions::default())
        .await
        .unwrap();
    assert_eq!(
        url,
        "https://assets.sfo3.cdn.digitaloceanspaces.com/reports/2024/report.csv"
    );
    assert_eq!(
        store.get_stored("reports/2024/report.csv").unwrap().content_type.as_deref(),
        Some("text/csv")
    );

    let files = client
        .list_files("reports/", ListOptions::default().with_path_only(true))
        .await
        .unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].locator, "reports/2024/report.csv");

    let target = dir.path().join("downloads/copy.csv");
    let written = client
        .download_file("reports/2024/report.csv", &target, true)
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(written).unwrap(), "a,b\n1,2\n");
}

#[tokio::test]
async fn test_upload_with_retry_and_purge() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("app.js");
    fs::write(&local, "console.log(1)").unwrap();

    let store = MockObjectStore::new().with_put_failures(1);
    let cdn = MockCdnClient::new().with_endpoint("cdn-1", "assets.sfo3.digitaloceanspaces.com");
    let client = build_client(store.clone(), cdn.clone());

    client
        .upload(
            &local,
            "js/app.js",
            Acl::PublicRead,
            UploadOptions::default()
                .with_exponential_backoff(true)
                .with_purge_cache(true),
        )
        .await
        .unwrap();

    assert_eq!(store.get_put_count(), 2);
    assert_eq!(
        cdn.get_purges(),
        vec![("cdn-1".to_string(), vec!["js/app.js".to_string()])]
    );
    assert!(client.is_public("js/app.js").await.unwrap());
}

#[tokio::test]
async fn test_upload_purges_through_cdn_api() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/cdn/endpoints"))
        .and(header("Authorization", "Bearer do-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "endpoints": [
                { "id": "wrong", "origin": "assets-old.sfo3.digitaloceanspaces.com" },
                { "id": "right", "origin": "assets.sfo3.digitaloceanspaces.com" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/v2/cdn/endpoints/right/cache"))
        .and(body_json(serde_json::json!({ "files": ["index.html"] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("index.html");
    fs::write(&local, "<html></html>").unwrap();

    let cdn = CdnClient::new("do-token".to_string())
        .unwrap()
        .with_base_url(server.uri());
    let client = ObjectStorageClient::with_services(
        test_config(),
        ClientServices {
            store: Box::new(MockObjectStore::new()),
            cdn: Some(Box::new(cdn)),
        },
    );

    for _ in 0..2 {
        client
            .upload(
                &local,
                "index.html",
                Acl::PublicRead,
                UploadOptions::default().with_purge_cache(true),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_sorted_listing_newest_first() {
    let store = MockObjectStore::new()
        .with_object(
            "backups/monday.tar",
            vec![],
            Acl::Private,
            Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap(),
        )
        .with_object(
            "backups/wednesday.tar",
            vec![],
            Acl::Private,
            Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap(),
        )
        .with_object(
            "backups/tuesday.tar",
            vec![],
            Acl::Private,
            Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap(),
        );
    let client = build_client(store, MockCdnClient::new());

    let files = client
        .list_files("backups/", ListOptions::default().with_sort(SortOrder::Desc))
        .await
        .unwrap();

    let names: Vec<&str> = files
        .iter()
        .map(|f| f.locator.rsplit('/').next().unwrap())
        .collect();
    assert_eq!(names, vec!["wednesday.tar", "tuesday.tar", "monday.tar"]);
    assert!(files[0]
        .locator
        .starts_with("https://assets.sfo3.cdn.digitaloceanspaces.com/"));
}

#[tokio::test]
async fn test_copy_then_delete_folder() {
    let now = Utc::now();
    let store = MockObjectStore::new()
        .with_object("drafts/a.md", b"a".to_vec(), Acl::PublicRead, now)
        .with_object("drafts/b.md", b"b".to_vec(), Acl::Private, now);
    let client = build_client(store.clone(), MockCdnClient::new());

    client.copy_file("drafts/a.md", "published/a.md").await.unwrap();
    client.copy_file("drafts/b.md", "published/b.md").await.unwrap();
    client.delete_folder("drafts/").await.unwrap();

    assert_eq!(
        store.get_keys(),
        vec!["published/a.md".to_string(), "published/b.md".to_string()]
    );
    assert!(client.is_public("published/a.md").await.unwrap());
    assert!(!client.is_public("published/b.md").await.unwrap());
}

#[tokio::test]
async fn test_purge_without_matching_endpoint_is_not_found() {
    let cdn = MockCdnClient::new().with_endpoint("x", "other.sfo3.digitaloceanspaces.com");
    let client = build_client(MockObjectStore::new(), cdn);

    let err = client
        .purge_cache(&["index.html".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_endpoint_on_later_page_is_resolved() {
    let server = MockServer::start().await;

    let unrelated: Vec<serde_json::Value> = (0..200)
        .map(|i| {
            serde_json::json!({
                "id": format!("e{}", i),
                "origin": format!("site{}.sfo3.digitaloceanspaces.com", i)
            })
        })
        .collect();

    Mock::given(method("GET"))
        .and(path("/v2/cdn/endpoints"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "endpoints": [{ "id": "assets-cdn", "origin": "assets.sfo3.digitaloceanspaces.com" }],
            "links": {}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/cdn/endpoints"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "endpoints": unrelated,
            "links": {
                "pages": {
                    "next": format!("{}/v2/cdn/endpoints?page=2&per_page=200", server.uri())
                }
            }
        })))
        .mount(&server)
        .await;

    let cdn = CdnClient::new("do-token".to_string())
        .unwrap()
        .with_base_url(server.uri());
    let client = ObjectStorageClient::with_services(
        test_config(),
        ClientServices {
            store: Box::new(MockObjectStore::new()),
            cdn: Some(Box::new(cdn)),
        },
    );

    assert_eq!(client.resolve_cdn_endpoint_id().await.unwrap(), "assets-cdn");
}
