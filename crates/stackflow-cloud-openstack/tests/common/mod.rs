//! Keystone stand-in for the gateway tests

use serde_json::json;
use stackflow_cloud_openstack::{AuthConfig, CloudConfig, OpenStackSession};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "gAAAAABtest-token";
pub const PROJECT: &str = "p-1";

pub fn cloud(server: &MockServer) -> CloudConfig {
    CloudConfig {
        auth: AuthConfig {
            auth_url: Some(server.uri()),
            username: Some("demo".into()),
            password: Some("secret".into()),
            project_name: Some("seed".into()),
            ..AuthConfig::default()
        },
        region_name: Some("GRA".into()),
        ..CloudConfig::default()
    }
}

fn endpoints(url: String) -> serde_json::Value {
    json!([
        { "interface": "public", "region": "GRA", "url": url },
        { "interface": "internal", "region": "GRA", "url": "http://internal.invalid" },
        { "interface": "public", "region": "BHS", "url": "http://other-region.invalid" }
    ])
}

/// Mounts the token endpoint with a catalog pointing back at `server`
pub async fn mount_keystone(server: &MockServer) {
    mount_token(server, TOKEN, None).await;
}

/// Token endpoint issuing `token`, for at most `times` requests when given
pub async fn mount_token(server: &MockServer, token: &str, times: Option<u64>) {
    let uri = server.uri();
    let catalog = json!([
        { "type": "orchestration", "endpoints": endpoints(format!("{}/heat/v1/{}", uri, PROJECT)) },
        { "type": "compute", "endpoints": endpoints(format!("{}/compute/v2.1", uri)) },
        { "type": "object-store", "endpoints": endpoints(format!("{}/swift/v1/AUTH_{}", uri, PROJECT)) },
        { "type": "volumev3", "endpoints": endpoints(format!("{}/volume/v3/{}/", uri, PROJECT)) },
        { "type": "network", "endpoints": endpoints(format!("{}/network", uri)) }
    ]);

    let mock = Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Subject-Token", token)
                .set_body_json(json!({ "token": { "catalog": catalog } })),
        );
    let mock = match times {
        Some(times) => mock.up_to_n_times(times),
        None => mock,
    };
    mock.mount(server).await;
}

pub async fn session(server: &MockServer) -> OpenStackSession {
    mount_keystone(server).await;
    OpenStackSession::authenticate(&cloud(server)).await.unwrap()
}
