use std::net::SocketAddr;

use axum::{middleware, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, recipes};

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .merge(auth::router())
        .merge(recipes::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .nest(
            "/api",
            Router::new().merge(auth::public_router()).merge(protected),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use base64ct::{Base64, Encoding};
    use serde_json::{json, Value};
    use time::{format_description::well_known::Rfc3339, OffsetDateTime};
    use tower::ServiceExt;

    use super::*;
    use crate::memory::{MemoryRecipeStore, MemoryUserStore};
    use crate::recipes::repo::RecipeStore;

    const ALICE: (&str, &str) = ("alice@example.com", "password1");
    const BOB: (&str, &str) = ("bob@example.com", "password2");

    struct Harness {
        app: Router,
        users: Arc<MemoryUserStore>,
        recipes: Arc<MemoryRecipeStore>,
    }

    impl Harness {
        fn new() -> Self {
            let users = Arc::new(MemoryUserStore::default());
            let recipes = Arc::new(MemoryRecipeStore::default());
            let app = build_app(AppState::fake_with(users.clone(), recipes.clone()));
            Self {
                app,
                users,
                recipes,
            }
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            auth: Option<String>,
            body: Option<Value>,
        ) -> Response {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(auth) = auth {
                builder = builder.header(header::AUTHORIZATION, auth);
            }
            let body = match body {
                Some(v) => {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                    Body::from(v.to_string())
                }
                None => Body::empty(),
            };
            self.app
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap()
        }

        async fn register(&self, (email, password): (&str, &str)) -> StatusCode {
            self.send(
                Method::POST,
                "/api/register",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await
            .status()
        }

        async fn create(&self, who: (&str, &str), name: &str, category: &str) -> i64 {
            let res = self
                .send(
                    Method::POST,
                    "/api/recipe/new",
                    Some(basic(who)),
                    Some(recipe_json(name, category)),
                )
                .await;
            assert_eq!(res.status(), StatusCode::OK);
            body_json(res).await["id"].as_i64().unwrap()
        }
    }

    fn basic((email, password): (&str, &str)) -> String {
        format!(
            "Basic {}",
            Base64::encode_string(format!("{email}:{password}").as_bytes())
        )
    }

    fn recipe_json(name: &str, category: &str) -> Value {
        json!({
            "name": name,
            "category": category,
            "description": "Light, aromatic and refreshing",
            "ingredients": ["bourbon", "fresh mint leaves"],
            "directions": ["Muddle the mint", "Add bourbon"]
        })
    }

    async fn search(h: &Harness, query: &str) -> Response {
        h.send(
            Method::GET,
            &format!("/api/recipe/search{query}"),
            Some(basic(ALICE)),
            None,
        )
        .await
    }

    async fn body_json(res: Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn register_then_duplicate_and_invalid_payloads() {
        let h = Harness::new();
        assert_eq!(h.register(ALICE).await, StatusCode::OK);
        assert_eq!(h.register(ALICE).await, StatusCode::BAD_REQUEST);
        assert_eq!(
            h.register(("not-an-email", "password1")).await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            h.register(("carol@example.com", "short")).await,
            StatusCode::BAD_REQUEST
        );
        let res = h
            .send(
                Method::POST,
                "/api/register",
                None,
                Some(json!({ "email": "dave@example.com" })),
            )
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unauthenticated_requests_never_touch_stores() {
        let h = Harness::new();
        let routes = [
            (Method::GET, "/api/recipe/1", None),
            (Method::POST, "/api/recipe/new", Some(recipe_json("Tea", "Beverage"))),
            (Method::PUT, "/api/recipe/1", Some(recipe_json("Tea", "Beverage"))),
            (Method::DELETE, "/api/recipe/1", None),
            (Method::GET, "/api/recipe/search?category=beverage", None),
            (Method::POST, "/api/token", None),
        ];
        for (method, uri, body) in routes {
            let res = h.send(method, uri, None, body).await;
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");
            assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));
        }
        assert_eq!(h.users.calls(), 0);
        assert_eq!(h.recipes.calls(), 0);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_before_recipe_store() {
        let h = Harness::new();
        h.register(ALICE).await;
        let res = h
            .send(
                Method::GET,
                "/api/recipe/1",
                Some(basic((ALICE.0, "wrong-password"))),
                None,
            )
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let res = h
            .send(Method::GET, "/api/recipe/1", Some(basic(BOB)), None)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(h.recipes.calls(), 0);
    }

    #[tokio::test]
    async fn create_then_get_round_trip() {
        let h = Harness::new();
        h.register(ALICE).await;
        let id = h.create(ALICE, "Mint Julep", "Beverage").await;

        let res = h
            .send(Method::GET, &format!("/api/recipe/{id}"), Some(basic(ALICE)), None)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["name"], "Mint Julep");
        assert_eq!(body["category"], "Beverage");
        assert_eq!(body["ingredients"], json!(["bourbon", "fresh mint leaves"]));
        assert_eq!(body["directions"], json!(["Muddle the mint", "Add bourbon"]));
        assert!(body["date"].is_string());
        assert!(body.get("owner").is_none());
        assert!(body.get("id").is_none());

        // any authenticated user may read
        h.register(BOB).await;
        let res = h
            .send(Method::GET, &format!("/api/recipe/{id}"), Some(basic(BOB)), None)
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = h
            .send(Method::GET, "/api/recipe/9999", Some(basic(ALICE)), None)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_rejects_invalid_recipe() {
        let h = Harness::new();
        h.register(ALICE).await;
        let mut body = recipe_json("Tea", "Beverage");
        body["ingredients"] = json!([]);
        let res = h
            .send(Method::POST, "/api/recipe/new", Some(basic(ALICE)), Some(body))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = h
            .send(
                Method::POST,
                "/api/recipe/new",
                Some(basic(ALICE)),
                Some(json!({ "name": 5 })),
            )
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn only_owner_may_update_or_delete() {
        let h = Harness::new();
        h.register(ALICE).await;
        h.register(BOB).await;
        let id = h.create(ALICE, "Mint Julep", "Beverage").await;
        let uri = format!("/api/recipe/{id}");

        let res = h
            .send(Method::PUT, &uri, Some(basic(BOB)), Some(recipe_json("Hijacked", "Snack")))
            .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let res = h.send(Method::DELETE, &uri, Some(basic(BOB)), None).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let stored = h.recipes.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Mint Julep");
        assert_eq!(stored.owner, ALICE.0);

        let res = h
            .send(Method::PUT, &uri, Some(basic(ALICE)), Some(recipe_json("Julep", "Beverage")))
            .await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let updated = h.recipes.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(updated.name, "Julep");
        assert!(updated.date >= stored.date);

        let res = h.send(Method::DELETE, &uri, Some(basic(ALICE)), None).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(h.recipes.find_by_id(id).await.unwrap().is_none());

        let res = h
            .send(Method::PUT, &uri, Some(basic(ALICE)), Some(recipe_json("Julep", "Beverage")))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let res = h.send(Method::DELETE, &uri, Some(basic(ALICE)), None).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn search_contract() {
        let h = Harness::new();
        h.register(ALICE).await;
        h.create(ALICE, "Mint Julep", "Beverage").await;
        h.create(ALICE, "Peppermint Tea", "Beverage").await;
        h.create(ALICE, "Crisps", "Snack").await;

        let res = search(&h, "?category=BEVERAGE").await;
        assert_eq!(res.status(), StatusCode::OK);
        let found = body_json(res).await;
        let found = found.as_array().unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|r| r["category"] == "Beverage"));
        let dates: Vec<OffsetDateTime> = found
            .iter()
            .map(|r| OffsetDateTime::parse(r["date"].as_str().unwrap(), &Rfc3339).unwrap())
            .collect();
        assert!(dates[0] >= dates[1]);

        let res = search(&h, "?name=mint").await;
        assert_eq!(res.status(), StatusCode::OK);
        let found = body_json(res).await;
        let mut names: Vec<String> = found
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        assert_eq!(names, ["Mint Julep", "Peppermint Tea"]);

        assert_eq!(
            search(&h, "?category=Beverage&name=mint").await.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(search(&h, "").await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(search(&h, "?name=%20%20").await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            search(&h, "?category=Beverage&name=%20").await.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            search(&h, "?category=Beverage&name=").await.status(),
            StatusCode::OK
        );
        assert_eq!(search(&h, "?category=Soup").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_path_and_query_are_json_validation_errors() {
        let h = Harness::new();
        h.register(ALICE).await;

        for (method, uri) in [
            (Method::GET, "/api/recipe/abc"),
            (Method::DELETE, "/api/recipe/abc"),
            (Method::GET, "/api/recipe/search?category=a&category=b"),
        ] {
            let res = h.send(method, uri, Some(basic(ALICE)), None).await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(
                res.headers()[header::CONTENT_TYPE],
                "application/json",
                "{uri}"
            );
            let body = body_json(res).await;
            assert_eq!(body["error"], "VALIDATION_ERROR", "{uri}");
            assert!(body["message"].is_string());
        }
        assert_eq!(h.recipes.calls(), 0);
    }

    #[tokio::test]
    async fn bearer_token_authenticates_like_basic() {
        let h = Harness::new();
        h.register(ALICE).await;

        let res = h.send(Method::POST, "/api/token", Some(basic(ALICE)), None).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["token_type"], "Bearer");
        let token = body["access_token"].as_str().unwrap().to_string();

        let res = h
            .send(
                Method::POST,
                "/api/recipe/new",
                Some(format!("Bearer {token}")),
                Some(recipe_json("Tea", "Beverage")),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let id = body_json(res).await["id"].as_i64().unwrap();
        assert_eq!(h.recipes.find_by_id(id).await.unwrap().unwrap().owner, ALICE.0);

        let res = h
            .send(
                Method::GET,
                "/api/recipe/1",
                Some("Bearer not.a.token".into()),
                None,
            )
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
