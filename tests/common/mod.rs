#![allow(dead_code)]

use std::path::Path;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "test-token";

/// Answer `verb path` with a JSON body, but only for requests carrying the
/// test bearer token. Anything unmatched gets wiremock's 404.
pub async fn mount_json(server: &MockServer, verb: &str, route: &str, status: u16, body: &str) {
    json_mock(verb, route, status, body).mount(server).await;
}

/// Same as [`mount_json`], failing on drop unless hit exactly `times` times.
pub async fn mount_json_expect(
    server: &MockServer,
    verb: &str,
    route: &str,
    status: u16,
    body: &str,
    times: u64,
) {
    json_mock(verb, route, status, body)
        .expect(times)
        .mount(server)
        .await;
}

fn json_mock(verb: &str, route: &str, status: u16, body: &str) -> Mock {
    Mock::given(method(verb))
        .and(path(route))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(
            ResponseTemplate::new(status)
                .insert_header("content-type", "application/json")
                .set_body_string(body),
        )
}

/// A `tether` invocation isolated to `home`, pointed at `base_url` when given.
pub fn tether_cmd(home: &Path, base_url: Option<&str>) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tether");
    cmd.current_dir(home)
        .env("TETHER_HOME", home.join("tether-home"))
        .env("TETHER_MIN_REQUEST_INTERVAL_MS", "0")
        .env("TETHER_STARTUP_DELAY_SECS", "0")
        .env("TETHER_API_TOKEN", TOKEN)
        .env("TETHER_LOG", "tether=warn")
        .env("NO_PROXY", "127.0.0.1,localhost")
        .env("no_proxy", "127.0.0.1,localhost")
        .env_remove("TETHER_CONFIG_PATH")
        .env_remove("TETHER_WORKSPACES_DIR")
        .env_remove("TETHER_STATE_DIR")
        .env_remove("TETHER_LOGS_DIR")
        .env_remove("TETHER_API_BASE_URL");
    if let Some(base_url) = base_url {
        cmd.env("TETHER_API_BASE_URL", base_url);
    }
    cmd
}
