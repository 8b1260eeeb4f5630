use m3u_refinery::{
    Attributes, Candidate, ProbeError, ProbeStrategy,
    channel::{HTTP_REFERRER, HTTP_USER_AGENT},
    source::{AcceptedStatus, probe::MAX_BODY_BYTES},
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

fn candidate(probe_target: String, attributes: Attributes) -> Candidate {
    Candidate {
        index: 0,
        id: "ch".to_string(),
        display_name: "Channel".to_string(),
        probe_target,
        attributes,
    }
}

fn liveness(accepted: &str) -> ProbeStrategy {
    ProbeStrategy::Liveness {
        accepted: accepted.parse().unwrap(),
    }
}

async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn liveness_accepts_configured_statuses() {
    let server = MockServer::start().await;
    mount(&server, "/ok.m3u8", ResponseTemplate::new(200)).await;
    mount(&server, "/gone.m3u8", ResponseTemplate::new(404)).await;
    mount(&server, "/blocked.m3u8", ResponseTemplate::new(451)).await;
    let client = reqwest::Client::new();

    let ok = candidate(format!("{}/ok.m3u8", server.uri()), Attributes::new());
    assert_eq!(
        liveness("200").probe(&client, &ok).await,
        Ok(ok.probe_target.clone())
    );

    let gone = candidate(format!("{}/gone.m3u8", server.uri()), Attributes::new());
    assert_eq!(
        liveness("200").probe(&client, &gone).await,
        Err(ProbeError::Status(404))
    );

    let blocked = candidate(format!("{}/blocked.m3u8", server.uri()), Attributes::new());
    assert_eq!(
        liveness("200").probe(&client, &blocked).await,
        Err(ProbeError::Status(451))
    );
    assert_eq!(
        liveness("200,451").probe(&client, &blocked).await,
        Ok(blocked.probe_target.clone())
    );
}

#[tokio::test]
async fn probe_forwards_channel_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guarded.m3u8"))
        .and(header("user-agent", "VLC/3.0"))
        .and(header("referer", "https://site.example/"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(1)
        .mount(&server)
        .await;
    mount(&server, "/guarded.m3u8", ResponseTemplate::new(403)).await;
    let client = reqwest::Client::new();

    let with_headers = candidate(
        format!("{}/guarded.m3u8", server.uri()),
        [(HTTP_USER_AGENT, "VLC/3.0"), (HTTP_REFERRER, "https://site.example/")]
            .into_iter()
            .collect(),
    );
    assert!(liveness("200").probe(&client, &with_headers).await.is_ok());

    let without = candidate(format!("{}/guarded.m3u8", server.uri()), Attributes::new());
    assert_eq!(
        liveness("200").probe(&client, &without).await,
        Err(ProbeError::Status(403))
    );
}

#[tokio::test]
async fn extract_finds_manifest_in_player_page() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/player/news",
        ResponseTemplate::new(200).set_body_string(
            r#"<video><source src="https://cdn.example/news/index.m3u8?token=abc" type="application/x-mpegURL"></video>"#,
        ),
    )
    .await;
    mount(
        &server,
        "/player/offline",
        ResponseTemplate::new(200).set_body_string("<p>Channel offline</p>"),
    )
    .await;
    let client = reqwest::Client::new();
    let strategy = ProbeStrategy::extract(AcceptedStatus::default());

    let news = candidate(format!("{}/player/news", server.uri()), Attributes::new());
    assert_eq!(
        strategy.probe(&client, &news).await,
        Ok("https://cdn.example/news/index.m3u8?token=abc".to_string())
    );

    let offline = candidate(format!("{}/player/offline", server.uri()), Attributes::new());
    assert_eq!(
        strategy.probe(&client, &offline).await,
        Err(ProbeError::NoManifest)
    );
}

#[tokio::test]
async fn extract_stops_reading_at_the_body_cap() {
    let server = MockServer::start().await;
    let padding = "x".repeat(MAX_BODY_BYTES);
    let link = r#"<source src="https://cdn.example/late/index.m3u8">"#;
    mount(
        &server,
        "/player/oversized",
        ResponseTemplate::new(200).set_body_string(format!("{padding}{link}")),
    )
    .await;
    mount(
        &server,
        "/player/early",
        ResponseTemplate::new(200).set_body_string(format!("{link}\n{padding}")),
    )
    .await;
    let client = reqwest::Client::new();
    let strategy = ProbeStrategy::extract(AcceptedStatus::default());

    let oversized = candidate(format!("{}/player/oversized", server.uri()), Attributes::new());
    assert_eq!(
        strategy.probe(&client, &oversized).await,
        Err(ProbeError::NoManifest)
    );

    let early = candidate(format!("{}/player/early", server.uri()), Attributes::new());
    assert_eq!(
        strategy.probe(&client, &early).await,
        Ok("https://cdn.example/late/index.m3u8".to_string())
    );
}

#[tokio::test]
async fn manifest_requires_an_hls_body() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/live.m3u8",
        ResponseTemplate::new(200).set_body_string(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:1\n#EXTINF:6.0,\nseg1.ts\n#EXTINF:6.0,\nseg2.ts\n",
        ),
    )
    .await;
    mount(
        &server,
        "/parked.m3u8",
        ResponseTemplate::new(200).set_body_string("<html>This domain is for sale</html>"),
    )
    .await;
    let client = reqwest::Client::new();
    let strategy = ProbeStrategy::Manifest {
        accepted: AcceptedStatus::default(),
    };

    let live = candidate(format!("{}/live.m3u8", server.uri()), Attributes::new());
    assert_eq!(
        strategy.probe(&client, &live).await,
        Ok(live.probe_target.clone())
    );

    let parked = candidate(format!("{}/parked.m3u8", server.uri()), Attributes::new());
    assert_eq!(
        strategy.probe(&client, &parked).await,
        Err(ProbeError::InvalidManifest)
    );
}

#[tokio::test]
async fn unreachable_host_is_a_network_error() {
    // Bind then drop a listener to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = reqwest::Client::new();

    let dead = candidate(format!("http://127.0.0.1:{port}/live.m3u8"), Attributes::new());
    let err = liveness("200").probe(&client, &dead).await.unwrap_err();
    assert_eq!(err.kind(), "network");
}
