use std::collections::HashMap;

use axum::{extract::rejection::JsonRejection, Extension, Json};
use dropship_pipeline::CategoryMapping;
use serde::Deserialize;
use serde_json::Value;

use crate::middleware::RequestId;

use super::ApiError;

/// Attribute keys consulted as category hints, in order.
const HINT_KEYS: [&str; 2] = ["category", "ali_first_level"];

#[derive(Debug, Deserialize)]
pub(super) struct MapCategoryRequest {
    title: String,
    #[serde(default)]
    attrs: HashMap<String, Value>,
}

/// `POST /map-category`: keyword rules on the title, then attribute hints.
pub(super) async fn map_category(
    Extension(req_id): Extension<RequestId>,
    body: Result<Json<MapCategoryRequest>, JsonRejection>,
) -> Result<Json<CategoryMapping>, ApiError> {
    let Json(body) = body
        .map_err(|rejection| ApiError::new(req_id.0, "bad_request", rejection.body_text()))?;

    let hints = HINT_KEYS
        .iter()
        .filter_map(|key| body.attrs.get(*key))
        .filter_map(Value::as_str);

    Ok(Json(dropship_pipeline::map_category(&body.title, hints)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::{app, memory_state, post_json, send};

    #[tokio::test]
    async fn title_rule_wins() {
        let (status, json) = send(
            &app(memory_state()),
            post_json("/map-category", &json!({"title": "Shockproof Phone Case"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["categoryId"], "15032");
        assert_eq!(json["source"], "rule");
    }

    #[tokio::test]
    async fn attribute_hint_maps_through_alias() {
        let (_, json) = send(
            &app(memory_state()),
            post_json(
                "/map-category",
                &json!({"title": "Garden hose", "attrs": {"ali_first_level": "Home & Garden"}}),
            ),
        )
        .await;
        assert_eq!(json["categoryId"], "11700");
        assert_eq!(json["source"], "alias");
    }

    #[tokio::test]
    async fn unknown_items_fall_back() {
        let (_, json) = send(
            &app(memory_state()),
            post_json("/map-category", &json!({"title": "Mystery", "attrs": {"category": 7}})),
        )
        .await;
        assert_eq!(json["categoryId"], "99");
        assert_eq!(json["source"], "fallback");
    }

    #[tokio::test]
    async fn missing_title_is_a_bad_request() {
        let (status, _) = send(
            &app(memory_state()),
            post_json("/map-category", &json!({"attrs": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
