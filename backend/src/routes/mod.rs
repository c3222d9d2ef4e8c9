//! Route definitions for the inventory and sales server

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - catalog lookups
        .merge(catalog_routes(state.clone()))
        // Protected routes - purchases
        .nest("/purchases", purchase_routes(state.clone()))
        // Protected routes - sales
        .nest("/sales", sale_routes(state))
}

/// Catalog read routes (protected)
fn catalog_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/products/low-stock", get(handlers::list_low_stock))
        .route("/products/:product_id", get(handlers::get_product))
        .route(
            "/products/:product_id/presentations",
            get(handlers::list_presentations),
        )
        .route("/presentations/:presentation_id", get(handlers::get_presentation))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Purchase routes (protected)
fn purchase_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_purchases).post(handlers::create_purchase),
        )
        .route(
            "/:purchase_id",
            get(handlers::get_purchase)
                .put(handlers::update_purchase)
                .delete(handlers::delete_purchase),
        )
        .route("/:purchase_id/void", post(handlers::void_purchase))
        .route(
            "/lines/:line_id",
            put(handlers::update_purchase_line).delete(handlers::delete_purchase_line),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Sale routes (protected)
fn sale_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_sales).post(handlers::create_sale))
        .route(
            "/:sale_id",
            get(handlers::get_sale)
                .put(handlers::update_sale)
                .delete(handlers::delete_sale),
        )
        .route("/:sale_id/cancel", post(handlers::cancel_sale))
        .route(
            "/lines/:line_id",
            put(handlers::update_sale_line).delete(handlers::delete_sale_line),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DatabaseConfig, JwtConfig, ServerConfig};
    use crate::middleware::auth::Claims;
    use crate::middleware::{PURCHASES_WRITE, SALES_WRITE};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use jsonwebtoken::{encode, EncodingKey, Header};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use tower::ServiceExt;

    const SECRET: &str = "route-test-secret";

    // the pool never connects: every request here is rejected before a query
    fn test_app() -> Router {
        let config = Config {
            environment: "test".to_string(),
            server: ServerConfig {
                port: 0,
                host: "127.0.0.1".to_string(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/inventory_test".to_string(),
                max_connections: 1,
                min_connections: 0,
                acquire_timeout_secs: 1,
            },
            jwt: JwtConfig {
                secret: SECRET.to_string(),
            },
        };
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .unwrap();
        let state = AppState {
            db,
            config: Arc::new(config),
        };
        api_routes(state.clone()).with_state(state)
    }

    fn bearer(permissions: &[&str]) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: uuid::Uuid::new_v4().to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            exp: now + 600,
            iat: now,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        format!("Bearer {}", token)
    }

    #[tokio::test]
    async fn document_routes_require_a_token() {
        for uri in ["/purchases", "/sales", "/products/low-stock"] {
            let response = test_app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[tokio::test]
    async fn malformed_token_is_rejected() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/sales")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn purchase_creation_requires_purchase_permission() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/purchases")
                    .header(header::AUTHORIZATION, bearer(&[SALES_WRITE]))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"detalles":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn sale_cancel_requires_sale_permission() {
        let uri = format!("/sales/{}/cancel", uuid::Uuid::new_v4());
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::AUTHORIZATION, bearer(&[]))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn sale_line_update_requires_sale_permission() {
        let uri = format!("/sales/lines/{}", uuid::Uuid::new_v4());
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(uri)
                    .header(header::AUTHORIZATION, bearer(&[PURCHASES_WRITE]))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"cantidad":2}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
