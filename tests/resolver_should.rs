use std::time::Duration;

use hls_relay::server::error::Error;
use hls_relay::server::services::resolution_cache_services::ResolutionKey;
use hls_relay::server::services::resolver_services::{ConsumetResolverClient, ResolverClientTrait};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn key() -> ResolutionKey {
    ResolutionKey::new("10766", "tv/watch-rick-and-morty-39480")
}

fn client(server: &MockServer) -> ConsumetResolverClient {
    ConsumetResolverClient::new(&server.uri(), "upcloud", Duration::from_secs(5))
}

async fn mount_servers(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/servers"))
        .and(query_param("episodeId", "10766"))
        .and(query_param("mediaId", "tv/watch-rick-and-morty-39480"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "vidcloud", "id": "1", "url": "https://flixhq.example/watch/1" },
            { "name": "upcloud", "id": "2", "url": "https://flixhq.example/watch/2" }
        ])))
        .mount(server)
        .await;
}

fn watch_payload() -> serde_json::Value {
    json!({
        "headers": { "Referer": "https://streameeeeee.site/" },
        "sources": [
            { "url": "https://cdn.example/1080/index.m3u8", "quality": "1080p", "isM3U8": true },
            { "url": "https://cdn.example/master.m3u8", "quality": "auto", "isM3U8": true }
        ],
        "subtitles": [ { "url": "https://cdn.example/en.vtt", "lang": "English" } ]
    })
}

#[tokio::test]
async fn fetch_sources_with_the_server_name() {
    let server = MockServer::start().await;
    mount_servers(&server).await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .and(query_param("server", "upcloud"))
        .respond_with(ResponseTemplate::new(200).set_body_json(watch_payload()))
        .expect(1)
        .mount(&server)
        .await;

    let sources = client(&server).resolve(&key()).await.unwrap();

    assert_eq!(sources.sources.len(), 2);
    assert_eq!(
        sources.select_variant().unwrap().url,
        "https://cdn.example/master.m3u8"
    );
    // untyped fields survive for /fetch-stream
    assert!(sources.extra.contains_key("subtitles"));
    assert!(sources.extra.contains_key("headers"));
}

#[tokio::test]
async fn retry_once_with_the_server_id_when_the_name_fails() {
    let server = MockServer::start().await;
    mount_servers(&server).await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .and(query_param("server", "upcloud"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .and(query_param("server", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(watch_payload()))
        .expect(1)
        .mount(&server)
        .await;

    let sources = client(&server).resolve(&key()).await.unwrap();

    assert_eq!(sources.sources[0].url, "https://cdn.example/1080/index.m3u8");
}

#[tokio::test]
async fn give_up_when_both_name_and_id_fail() {
    let server = MockServer::start().await;
    mount_servers(&server).await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let result = client(&server).resolve(&key()).await;

    assert!(matches!(result, Err(Error::Resolution(_))));
}

#[tokio::test]
async fn fail_when_the_preferred_server_is_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/servers"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "name": "vidcloud", "id": "1" }])),
        )
        .mount(&server)
        .await;

    let result = client(&server).resolve(&key()).await;

    match result {
        Err(Error::Resolution(message)) => assert_eq!(message, "upcloud server not found"),
        other => panic!("expected a resolution error, got {:?}", other.map(|s| s.sources)),
    }
}
