//! Fetcher integration tests against a mock platform
//!
//! These run the production `ReqwestClient` against wiremock to cover:
//! - URL and query parameter layout per request kind
//! - HTML and JSON normalization
//! - Retry on transient statuses, no retry on 404
//! - Request timeouts

use reelvault_ingest::fetcher::{FetchRequest, Fetched, Fetcher, FetcherConfig};
use reelvault_ingest::FetchError;
use std::time::Duration;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn fetcher_for(server: &MockServer) -> Fetcher {
    let config = FetcherConfig {
        base_url: server.uri(),
        timeout_secs: 2,
        max_retries: 3,
        retry_backoff_ms: 10,
        ..Default::default()
    };
    Fetcher::from_config(config).unwrap()
}

const VIDEO_HTML: &str = r#"<html><head>
    <title>Street food tour</title>
    <meta name="author" content="foodie">
  </head><body>
    <span id="like-count">2.5w</span>
    <span id="comment-count">1,024</span>
    <span id="share-count">77</span>
  </body></html>"#;

#[tokio::test]
async fn test_fetch_video_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video/7301/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VIDEO_HTML))
        .expect(1)
        .mount(&server)
        .await;

    let video = fetcher_for(&server).fetch_video("7301").await.unwrap();
    assert_eq!(video.id, "7301");
    assert_eq!(video.title, "Street food tour");
    assert_eq!(video.author, "foodie");
    assert_eq!(video.like_count, 25_000);
    assert_eq!(video.comment_count, 1_024);
    assert_eq!(video.share_count, 77);
}

#[tokio::test]
async fn test_fetch_trending_sends_paging() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trending/"))
        .and(query_param("page", "2"))
        .and(query_param("count", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [
                {"id": "a", "title": "A", "play_count": 10},
                {"id": "b", "title": "B", "play_count": "1.5k"},
                {"id": "c"}
            ]
        })))
        .mount(&server)
        .await;

    let fetched = fetcher_for(&server)
        .fetch(&FetchRequest::Trending { page: 2, count: 3 })
        .await
        .unwrap();

    let Fetched::Record(record) = fetched else {
        panic!("expected a record");
    };
    assert_eq!(record.kind().as_str(), "trending");
    let reelvault_common::EntityRecord::Trending(batch) = record else {
        panic!("expected trending");
    };
    assert_eq!(batch.page, 2);
    let ids: Vec<&str> = batch.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(batch.items[1].play_count, 1_500);
}

#[tokio::test]
async fn test_search_returns_summaries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/item/"))
        .and(query_param("keyword", "cats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{"id": "s1"}, {"id": "s2"}]
        })))
        .mount(&server)
        .await;

    let hits = fetcher_for(&server).search_videos("cats", 1, 10).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[1].id, "s2");
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/u1/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/u1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><title>cat_lover</title></head><body>
               <div class="profile-follow-info"><span>12万</span><span>88</span></div>
               <div class="profile-video-info"><span>301</span></div></body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let user = fetcher_for(&server).fetch_user("u1").await.unwrap();
    assert_eq!(user.username, "cat_lover");
    assert_eq!(user.follower_count, 120_000);
    assert_eq!(user.following_count, 88);
    assert_eq!(user.video_count, 301);
}

#[tokio::test]
async fn test_exhausted_retries_are_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = fetcher_for(&server).fetch_video("v1").await.unwrap_err();
    assert!(matches!(err, FetchError::Unreachable { attempts: 3, .. }));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher_for(&server).fetch_hashtag("gone", 1, 20).await.unwrap_err();
    assert!(matches!(err, FetchError::NotFound(_)));
}

#[tokio::test]
async fn test_slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(VIDEO_HTML)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config = FetcherConfig {
        base_url: server.uri(),
        timeout_secs: 1,
        max_retries: 2,
        retry_backoff_ms: 0,
        ..Default::default()
    };
    let err = Fetcher::from_config(config)
        .unwrap()
        .fetch_video("slow")
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Timeout { attempts: 2 });
}

#[tokio::test]
async fn test_html_instead_of_json_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trending/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>captcha</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher_for(&server).fetch_trending(1, 20).await.unwrap_err();
    assert!(matches!(err, FetchError::Malformed(_)));
}
