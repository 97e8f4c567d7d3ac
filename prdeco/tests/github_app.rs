mod common;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use prdeco::ErrorKind;
use prdeco::auth::github_app::AppClaims;
use prdeco::auth::{CredentialProvider, GithubAppProvider};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{PRIVATE_KEY, PUBLIC_KEY};

fn installation(server: &MockServer, id: u32) -> Value {
    json!({
        "id": id,
        "access_tokens_url": format!("{}/app/installations/{id}/access_tokens", server.uri()),
        "repositories_url": format!("{}/installations/{id}/repositories?page=1", server.uri()),
    })
}

fn repository(owner: &str, name: &str) -> Value {
    json!({
        "node_id": format!("R_{name}"),
        "full_name": format!("{owner}/{name}"),
        "html_url": format!("https://github.example.com/{owner}/{name}"),
        "name": name,
        "owner": { "login": owner },
    })
}

async fn mount_token(server: &MockServer, id: u32, calls: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/app/installations/{id}/access_tokens")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "token": format!("ghs_installation_{id}"),
            "expires_at": "2099-01-01T00:00:00Z",
        })))
        .expect(calls)
        .mount(server)
        .await;
}

async fn mount_repositories(server: &MockServer, id: u32, page: u32, repos: Value, next: Option<u32>) {
    let mut response = ResponseTemplate::new(200).set_body_json(json!({
        "total_count": 0,
        "repositories": repos,
    }));
    if let Some(next) = next {
        response = response.insert_header(
            "Link",
            format!(
                "<{}/installations/{id}/repositories?page={next}>; rel=\"next\"",
                server.uri()
            )
            .as_str(),
        );
    }
    Mock::given(method("GET"))
        .and(path(format!("/installations/{id}/repositories")))
        .and(query_param("page", page.to_string()))
        .and(header("authorization", format!("Bearer ghs_installation_{id}").as_str()))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn finds_the_installation_that_can_see_the_repository() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/installations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            installation(&server, 1),
            installation(&server, 2),
            installation(&server, 3),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    mount_token(&server, 1, 1).await;
    mount_token(&server, 2, 1).await;
    mount_token(&server, 3, 0).await;

    mount_repositories(&server, 1, 1, json!([repository("other", "tools")]), None).await;
    mount_repositories(&server, 2, 1, json!([repository("acme", "docs")]), Some(2)).await;
    mount_repositories(&server, 2, 2, json!([repository("acme", "web")]), None).await;

    let provider = GithubAppProvider::new(&server.uri(), "4242", PRIVATE_KEY, "acme/web").unwrap();
    let token = provider.acquire().await.unwrap();

    assert_eq!(token.value(), "ghs_installation_2");
    assert!(token.expires_at().is_some());
    let repository = token.repository().unwrap();
    assert_eq!(repository.owner, "acme");
    assert_eq!(repository.name, "web");
    assert_eq!(repository.html_url, "https://github.example.com/acme/web");

    let requests = server.received_requests().await.unwrap();
    let listing = requests
        .iter()
        .find(|r| r.url.path() == "/app/installations")
        .unwrap();
    let bearer = listing
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap()
        .strip_prefix("Bearer ")
        .unwrap()
        .to_string();

    let key = DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&["4242"]);
    let claims = jsonwebtoken::decode::<AppClaims>(&bearer, &key, &validation)
        .unwrap()
        .claims;
    assert_eq!(claims.exp - claims.iat, 120);
}

#[tokio::test]
async fn installation_listing_is_followed_across_pages() {
    let server = MockServer::start().await;
    let installations_page = |page: u32| format!("<{}/app/installations?page={page}>; rel=\"next\"", server.uri());
    Mock::given(method("GET"))
        .and(path("/app/installations"))
        .and(query_param_is_missing("page"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([installation(&server, 1)]))
                .insert_header("Link", installations_page(2).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app/installations"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([installation(&server, 2)]))
                .insert_header("Link", installations_page(3).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app/installations"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([installation(&server, 3)])))
        .expect(0)
        .mount(&server)
        .await;

    mount_token(&server, 1, 1).await;
    mount_token(&server, 2, 1).await;
    mount_token(&server, 3, 0).await;
    mount_repositories(&server, 1, 1, json!([repository("other", "tools")]), None).await;
    mount_repositories(&server, 2, 1, json!([repository("acme", "web")]), None).await;

    let provider = GithubAppProvider::new(&server.uri(), "4242", PRIVATE_KEY, "acme/web").unwrap();
    let token = provider.acquire().await.unwrap();

    assert_eq!(token.value(), "ghs_installation_2");
    assert_eq!(token.repository().unwrap().name, "web");
}

#[tokio::test]
async fn no_visible_installation_is_a_configuration_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/installations"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([installation(&server, 1)])),
        )
        .mount(&server)
        .await;
    mount_token(&server, 1, 1).await;
    mount_repositories(&server, 1, 1, json!([]), None).await;

    let provider = GithubAppProvider::new(&server.uri(), "4242", PRIVATE_KEY, "acme/web").unwrap();
    let err = provider.acquire().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("no installation token"));
}

#[tokio::test]
async fn rejected_app_assertion_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/installations"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let provider = GithubAppProvider::new(&server.uri(), "4242", PRIVATE_KEY, "acme/web").unwrap();
    let err = provider.acquire().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.status().map(|s| s.as_u16()), Some(401));
}
