use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};

use crate::router::ExporterState;

pub async fn prometheus_metrics(State(state): State<Arc<ExporterState>>) -> impl IntoResponse {
    let payload = state.registry.render_prometheus().await;

    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );

    response
}

pub async fn landing_page(State(state): State<Arc<ExporterState>>) -> Html<String> {
    Html(format!(
        "<html>
<head><title>AWS spot market Exporter</title></head>
<body>
<h1>AWS spot market Exporter</h1>
<p><a href=\"{}\">Metrics</a></p>
</body>
</html>
",
        state.telemetry_path
    ))
}
