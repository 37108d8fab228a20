//! HTTP API over the catalog and the row store
//!
//! Every route lives under `/v1`. Reads take the catalog read lock; changes
//! take the write lock, apply the change, and save the catalog before the
//! lock is released.

mod error;

use axum::{
    extract::{Json as AxumJson, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tablemap_core::models::{field_choices, Connection, DataGroup, Document, FieldChoice, Line, Marker, Relation, Table};
use tablemap_core::{RowStore, VirtualDefinition, VirtualTableRequest};
use tablemap_sync::{preview, PreviewResult};
use uuid::Uuid;

use crate::state::AppState;

pub use error::ApiError;

type ApiResult<T> = Result<T, ApiError>;

/// Create the API router with the specified state
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/tables", get(list_tables))
        .route("/v1/tables/virtual", post(create_virtual_table))
        .route("/v1/tables/virtual-preview", post(preview_virtual_table))
        .route("/v1/tables/:id", get(get_table).put(update_table).delete(delete_table))
        .route("/v1/tables/:id/details", get(table_details))
        .route("/v1/relations", get(list_relations).post(create_relation))
        .route("/v1/relations/:id", delete(delete_relation))
        .route("/v1/relations/:id/rows", get(relation_rows))
        .route("/v1/data-groups", get(list_data_groups).post(create_data_group))
        .route("/v1/data-groups/:id", delete(delete_data_group))
        .route("/v1/markers", get(list_markers).post(create_marker))
        .route("/v1/lines", get(list_lines).post(create_line))
        .route("/v1/connections", get(list_connections).post(save_connection))
        .route("/v1/connections/:id", get(get_connection))
        .route("/v1/field-options", get(field_options))
        .with_state(state)
}

/// Deserialize a new catalog entry, giving it a fresh id when it has none
fn with_new_id<T: DeserializeOwned>(mut body: Document) -> ApiResult<T> {
    body.entry("id").or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    serde_json::from_value(Value::Object(body)).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// A connection as served to clients, without its password
fn redacted(connection: &Connection) -> ApiResult<Value> {
    let mut value = serde_json::to_value(connection).map_err(|e| ApiError::Internal(e.to_string()))?;
    if let Some(object) = value.as_object_mut() {
        object.remove("database_password");
    }
    Ok(value)
}

// Tables

/// Filters of the table list
#[derive(Debug, Default, Deserialize)]
struct TableFilter {
    is_virtual: Option<bool>,
    is_active: Option<bool>,
}

async fn list_tables(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TableFilter>,
) -> Json<Vec<Table>> {
    let catalog = state.catalog.read().await;
    let tables = catalog
        .tables()
        .iter()
        .filter(|t| filter.is_virtual.map_or(true, |v| t.is_virtual == v))
        .filter(|t| filter.is_active.map_or(true, |v| t.is_active == v))
        .cloned()
        .collect();
    Json(tables)
}

async fn get_table(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<Json<Table>> {
    let catalog = state.catalog.read().await;
    Ok(Json(catalog.table(id)?.clone()))
}

async fn update_table(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AxumJson(mut table): AxumJson<Table>,
) -> ApiResult<Json<Table>> {
    table.id = id;
    let mut catalog = state.catalog.write().await;
    catalog.update_table(table)?;
    state.persist(&catalog)?;
    Ok(Json(catalog.table(id)?.clone()))
}

async fn delete_table(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<Json<Table>> {
    let mut catalog = state.catalog.write().await;
    let table = catalog.remove_table(id)?;
    state.persist(&catalog)?;
    state.store.remove_table(id)?;
    tracing::info!("Deleted table {}", table.table);
    Ok(Json(table))
}

/// Query of the details endpoint
#[derive(Debug, Default, Deserialize)]
struct DetailsQuery {
    search: Option<String>,
}

async fn table_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<DetailsQuery>,
) -> ApiResult<Json<Vec<Document>>> {
    let catalog = state.catalog.read().await;
    let rows = catalog.details(id, state.store.as_ref(), query.search.as_deref())?;
    Ok(Json(rows))
}

async fn create_virtual_table(
    State(state): State<Arc<AppState>>,
    AxumJson(request): AxumJson<VirtualTableRequest>,
) -> ApiResult<(StatusCode, Json<Table>)> {
    let mut catalog = state.catalog.write().await;
    let id = catalog.define_virtual(request)?;
    state.persist(&catalog)?;
    Ok((StatusCode::CREATED, Json(catalog.table(id)?.clone())))
}

/// Preview an unsaved virtual table; a preview that fails answers 400 with `{sql, error}`
async fn preview_virtual_table(
    State(state): State<Arc<AppState>>,
    AxumJson(definition): AxumJson<VirtualDefinition>,
) -> (StatusCode, Json<PreviewResult>) {
    let generated = state.catalog.read().await.preview_sql(definition);
    let result = preview(generated, state.destination.as_deref(), state.destination_timeout).await;
    let status = match result {
        PreviewResult::Details { .. } => StatusCode::OK,
        PreviewResult::Error { .. } => StatusCode::BAD_REQUEST,
    };
    (status, Json(result))
}

// Relations

/// Request to relate two tables
#[derive(Debug, Deserialize)]
struct RelationRequest {
    table_one: Uuid,
    property_table_one: String,
    table_two: Uuid,
    property_table_two: String,
    #[serde(default)]
    two_dimensional: bool,
}

async fn list_relations(State(state): State<Arc<AppState>>) -> Json<Vec<Relation>> {
    Json(state.catalog.read().await.relations().to_vec())
}

async fn create_relation(
    State(state): State<Arc<AppState>>,
    AxumJson(request): AxumJson<RelationRequest>,
) -> ApiResult<(StatusCode, Json<Relation>)> {
    let mut relation = Relation::new(
        request.table_one,
        request.property_table_one,
        request.table_two,
        request.property_table_two,
    );
    if request.two_dimensional {
        relation = relation.two_dimensional();
    }

    let mut catalog = state.catalog.write().await;
    let id = catalog.add_relation(relation)?;
    state.persist(&catalog)?;
    Ok((StatusCode::CREATED, Json(catalog.relation(id)?.clone())))
}

async fn delete_relation(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<Json<Relation>> {
    let mut catalog = state.catalog.write().await;
    let relation = catalog.remove_relation(id)?;
    state.persist(&catalog)?;
    Ok(Json(relation))
}

/// Query of the relation rows endpoint
#[derive(Debug, Default, Deserialize)]
struct RelationRowsQuery {
    geo_table: Option<Uuid>,
}

async fn relation_rows(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<RelationRowsQuery>,
) -> ApiResult<Json<Vec<Document>>> {
    let catalog = state.catalog.read().await;
    Ok(Json(catalog.relation_rows(id, state.store.as_ref(), query.geo_table)?))
}

// Data groups

/// Request to create a data group
#[derive(Debug, Deserialize)]
struct DataGroupRequest {
    description: String,
    table: Uuid,
    properties: Vec<String>,
}

/// Filter of the data group list
#[derive(Debug, Default, Deserialize)]
struct DataGroupFilter {
    table: Option<Uuid>,
}

async fn list_data_groups(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DataGroupFilter>,
) -> Json<Vec<DataGroup>> {
    let catalog = state.catalog.read().await;
    let groups = match filter.table {
        Some(table) => catalog.data_groups_of(table).cloned().collect(),
        None => catalog.data_groups().to_vec(),
    };
    Json(groups)
}

async fn create_data_group(
    State(state): State<Arc<AppState>>,
    AxumJson(request): AxumJson<DataGroupRequest>,
) -> ApiResult<(StatusCode, Json<DataGroup>)> {
    let group = DataGroup::new(request.description, request.table, request.properties);

    let mut catalog = state.catalog.write().await;
    catalog.add_data_group(group.clone())?;
    state.persist(&catalog)?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn delete_data_group(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<Json<DataGroup>> {
    let mut catalog = state.catalog.write().await;
    let group = catalog.remove_data_group(id)?;
    state.persist(&catalog)?;
    Ok(Json(group))
}

// Markers and lines

async fn list_markers(State(state): State<Arc<AppState>>) -> Json<Vec<Marker>> {
    Json(state.catalog.read().await.markers().to_vec())
}

async fn create_marker(
    State(state): State<Arc<AppState>>,
    AxumJson(body): AxumJson<Document>,
) -> ApiResult<(StatusCode, Json<Marker>)> {
    let marker: Marker = with_new_id(body)?;

    let mut catalog = state.catalog.write().await;
    catalog.add_marker(marker.clone())?;
    state.persist(&catalog)?;
    Ok((StatusCode::CREATED, Json(marker)))
}

async fn list_lines(State(state): State<Arc<AppState>>) -> Json<Vec<Line>> {
    Json(state.catalog.read().await.lines().to_vec())
}

async fn create_line(
    State(state): State<Arc<AppState>>,
    AxumJson(body): AxumJson<Document>,
) -> ApiResult<(StatusCode, Json<Line>)> {
    let line: Line = with_new_id(body)?;

    let mut catalog = state.catalog.write().await;
    catalog.add_line(line.clone())?;
    state.persist(&catalog)?;
    Ok((StatusCode::CREATED, Json(line)))
}

// Connections

async fn list_connections(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Value>>> {
    let catalog = state.catalog.read().await;
    let connections = catalog.connections().iter().map(redacted).collect::<ApiResult<_>>()?;
    Ok(Json(connections))
}

async fn get_connection(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let catalog = state.catalog.read().await;
    let connection = catalog
        .connection(id)
        .ok_or_else(|| ApiError::NotFound(format!("Connection not found: {}", id)))?;
    Ok(Json(redacted(connection)?))
}

async fn save_connection(
    State(state): State<Arc<AppState>>,
    AxumJson(body): AxumJson<Document>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let connection: Connection = with_new_id(body)?;

    let mut catalog = state.catalog.write().await;
    catalog.save_connection(connection.clone())?;
    state.persist(&catalog)?;
    Ok((StatusCode::CREATED, Json(redacted(&connection)?)))
}

// Field options

/// Query of the field options endpoint
#[derive(Debug, Deserialize)]
struct FieldOptionsQuery {
    field: String,
}

async fn field_options(Query(query): Query<FieldOptionsQuery>) -> ApiResult<Json<Vec<FieldChoice>>> {
    field_choices(&query.field)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No options for field {}", query.field)))
}
