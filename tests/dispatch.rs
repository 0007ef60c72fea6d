//! End-to-end dispatch through a running gateway.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Method, Request, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;

use route_gateway::config::{FilterDefinition, ListenerConfig, RouteDefinition};
use route_gateway::filters::{build_route, BuiltinFilters, RespondFilter, SetResponseHeaderFilter};
use route_gateway::http::{Dispatcher, GatewayServer};
use route_gateway::routing::{HostPredicate, Route, RouteTable};

mod common;

#[tokio::test]
async fn unmatched_request_is_404() {
    let gateway = common::spawn_gateway(Arc::new(RouteTable::default())).await;

    let res = reqwest::get(gateway.url("/nowhere")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn failing_or_panicking_chain_is_500() {
    let table = Arc::new(RouteTable::default());
    table
        .add(Route::builder("fails", "/fail").filter(Arc::new(common::FailingFilter)).build())
        .unwrap();
    table
        .add(Route::builder("panics", "/panic/**").filter(Arc::new(common::PanickingFilter)).build())
        .unwrap();
    let gateway = common::spawn_gateway(table).await;

    let res = reqwest::get(gateway.url("/fail")).await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let res = reqwest::get(gateway.url("/panic/deep/path")).await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // the gateway keeps serving after a panic
    let res = reqwest::get(gateway.url("/nowhere")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chain_outcome_is_passed_through_unaltered() {
    let table = Arc::new(RouteTable::default());
    table
        .add(
            Route::builder("created", "/items")
                .method(Method::POST)
                .filter(Arc::new(SetResponseHeaderFilter::new(
                    HeaderName::from_static("x-route"),
                    HeaderValue::from_static("created"),
                )))
                .filter(Arc::new(RespondFilter::new(StatusCode::CREATED, "stored")))
                .build(),
        )
        .unwrap();
    let gateway = common::spawn_gateway(table).await;

    let client = reqwest::Client::new();
    let res = client.post(gateway.url("/items")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["x-route"], "created");
    assert_eq!(res.text().await.unwrap(), "stored");

    // method mismatch falls through to not-found
    let res = client.get(gateway.url("/items")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn literal_route_wins_over_pattern_and_variables_are_extracted() {
    let table = Arc::new(RouteTable::default());
    table
        .add(
            Route::builder("user", "/users/{id:\\d+}")
                .filter(Arc::new(common::TemplateFilter("user {id}")))
                .build(),
        )
        .unwrap();
    table
        .add(
            Route::builder("me", "/users/42")
                .filter(Arc::new(common::TemplateFilter("me")))
                .build(),
        )
        .unwrap();
    let gateway = common::spawn_gateway(table).await;

    let body = reqwest::get(gateway.url("/users/42")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "me");
    let body = reqwest::get(gateway.url("/users/7")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "user 7");
    let res = reqwest::get(gateway.url("/users/abc")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn host_predicate_selects_route() {
    let table = Arc::new(RouteTable::default());
    table
        .add(
            Route::builder("tenant", "/**")
                .predicate(Arc::new(HostPredicate::new("tenant.example.com")))
                .filter(Arc::new(common::TemplateFilter("tenant")))
                .build(),
        )
        .unwrap();
    table
        .add(Route::builder("default", "/**").filter(Arc::new(common::TemplateFilter("default"))).build())
        .unwrap();
    let server = GatewayServer::new(ListenerConfig::default(), Arc::new(Dispatcher::new(table)));

    let res = server
        .router()
        .oneshot(
            Request::builder()
                .uri("/anything")
                .header("host", "TENANT.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"tenant");

    let res = server
        .router()
        .oneshot(Request::builder().uri("/anything").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"default");
}

#[tokio::test]
async fn configured_route_with_builtin_filters() {
    let definition = RouteDefinition {
        id: "api".to_string(),
        path: "/api/**".to_string(),
        methods: vec!["GET".to_string()],
        host: None,
        headers: BTreeMap::from([("x-tenant".to_string(), "acme".to_string())]),
        metadata: Default::default(),
        filters: vec![
            FilterDefinition {
                name: "set-response-header".to_string(),
                args: BTreeMap::from([
                    ("name".to_string(), "x-served-by".to_string()),
                    ("value".to_string(), "gateway".to_string()),
                ]),
            },
            FilterDefinition {
                name: "respond".to_string(),
                args: BTreeMap::from([
                    ("status".to_string(), "202".to_string()),
                    ("body".to_string(), "accepted".to_string()),
                ]),
            },
        ],
    };
    let table = Arc::new(RouteTable::default());
    table.add(build_route(&definition, &BuiltinFilters).unwrap()).unwrap();
    let gateway = common::spawn_gateway(table).await;

    let client = reqwest::Client::new();
    let res = client
        .get(gateway.url("/api/orders"))
        .header("x-tenant", "acme")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(res.headers()["x-served-by"], "gateway");

    let res = client.get(gateway.url("/api/orders")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn serves_while_routes_change() {
    let table = Arc::new(RouteTable::default());
    table
        .add(Route::builder("stable", "/svc/**").filter(Arc::new(common::TemplateFilter("stable"))).build())
        .unwrap();
    let gateway = common::spawn_gateway(Arc::clone(&table)).await;

    let writer = {
        let table = Arc::clone(&table);
        tokio::spawn(async move {
            for i in 0..200 {
                let id = format!("churn-{}", i % 5);
                if i % 2 == 0 {
                    table
                        .add(Route::builder(id, "/svc/*/x").filter(Arc::new(common::TemplateFilter("churn"))).build())
                        .unwrap();
                } else {
                    table.remove_by_id(&id);
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let client = reqwest::Client::new();
    for _ in 0..50 {
        let res = client.get(gateway.url("/svc/a")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text().await.unwrap(), "stable");
    }
    writer.await.unwrap();
    assert!(table.get("stable").is_some());
}
