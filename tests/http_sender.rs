//! Black-box tests of the HTTP dispatch seam against a local mock endpoint.

use load_shaper::shaping::{DispatchBody, GeneratorSettings, HttpSender, RequestSender, SendError};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn body(req_id: &str) -> DispatchBody {
    DispatchBody {
        req_id: req_id.into(),
        amt: 100,
        ts: 1_700_000_000_000,
    }
}

fn settings_for(server: &MockServer, timeout_secs: u64) -> GeneratorSettings {
    GeneratorSettings::builder()
        .endpoint_url(format!("{}/push", server.uri()))
        .request_timeout_secs(timeout_secs)
        .build()
}

#[tokio::test]
async fn posts_json_body_and_succeeds_on_2xx() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/push"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "reqId": "7-cafebabe",
            "amt": 100,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"retCode\":\"000000\"}"))
        .expect(1)
        .mount(&server)
        .await;

    let sender = HttpSender::new(&settings_for(&server, 4)).unwrap();
    let result = sender.send(body("7-cafebabe")).await;
    assert!(result.is_ok(), "unexpected failure: {result:?}");
}

#[tokio::test]
async fn server_error_surfaces_as_status_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/push"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let sender = HttpSender::new(&settings_for(&server, 4)).unwrap();
    let err = sender.send(body("1-00000001")).await.unwrap_err();
    match err {
        SendError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected status failure, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/push"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let sender = HttpSender::new(&settings_for(&server, 1)).unwrap();
    let err = sender.send(body("1-00000002")).await.unwrap_err();
    assert!(matches!(err, SendError::Timeout), "got {err:?}");
}

#[tokio::test]
async fn connection_refused_is_a_transport_failure() {
    // Nothing listens on this port.
    let settings = GeneratorSettings::builder()
        .endpoint_url("http://127.0.0.1:1/push".into())
        .request_timeout_secs(2)
        .build();

    let sender = HttpSender::new(&settings).unwrap();
    let err = sender.send(body("1-00000003")).await.unwrap_err();
    assert!(
        matches!(err, SendError::Transport { .. } | SendError::Client { .. }),
        "got {err:?}"
    );
}
