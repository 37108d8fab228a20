//! Catalog of tables, relations and display configuration
//!
//! The catalog is the relation registry: it owns the metadata of every
//! synchronized and virtual table, the relations between them, data groups,
//! markers, lines and upstream connections. Mutations are validated first
//! and applied whole; observers are told about committed changes that
//! concern the destination store.

mod validator;

pub use validator::CatalogValidator;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::join::{self, JoinSpec, RelatedRows};
use crate::models::{
    Connection, DataGroup, Document, FieldDescriptor, Line, Marker, Relation, Table, TableInfo,
};
use crate::projector::{project_all, Projection};
use crate::search;
use crate::sql::{generate_sql, GeneratedSql, JoinPredicate, SelectField, TableResolver, VirtualDefinition};
use crate::store::RowStore;
use crate::utils::{is_valid_identifier, measure_time, slugify};

/// A committed change that concerns the destination store
#[derive(Debug, Clone)]
pub enum CatalogEvent {
    /// A virtual table was saved
    VirtualTableSaved {
        /// The saved table
        table: Table,
        /// Its defining `SELECT`
        sql: GeneratedSql,
    },

    /// A table was deleted
    TableDeleted {
        /// Identifier of the deleted table
        id: Uuid,
        /// Its local name
        name: String,
    },
}

/// Receiver of committed catalog changes
pub trait CatalogObserver: Send + Sync {
    /// Called after a change has been applied
    fn on_commit(&self, event: &CatalogEvent);
}

/// Request to define a virtual table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualTableRequest {
    /// Human alias, also the source of the table name suffix
    pub alias: String,

    /// Defining relation
    pub relation: Uuid,

    /// Fields, each naming its owning table
    pub fields: Vec<FieldDescriptor>,

    /// Side of the relation used as geo anchor; defaults to the first table
    #[serde(default)]
    pub geo_table: Option<Uuid>,

    /// Whether rows carry a map point
    #[serde(default)]
    pub show_on_map: bool,

    /// Field of the geo anchor holding the latitude
    #[serde(default)]
    pub property_latitude: Option<String>,

    /// Field of the geo anchor holding the longitude
    #[serde(default)]
    pub property_longitude: Option<String>,

    /// Field of the geo anchor holding the icon
    #[serde(default)]
    pub property_icon: Option<String>,
}

/// Serializable content of a catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSnapshot {
    /// Tables
    pub tables: Vec<Table>,

    /// Relations
    pub relations: Vec<Relation>,

    /// Data groups
    pub data_groups: Vec<DataGroup>,

    /// Markers
    pub markers: Vec<Marker>,

    /// Lines
    pub lines: Vec<Line>,

    /// Upstream connections
    pub connections: Vec<Connection>,
}

/// The catalog
pub struct Catalog {
    /// Catalog content
    data: CatalogSnapshot,

    /// Configuration
    config: CoreConfig,

    /// Observers of committed changes
    observers: Vec<Arc<dyn CatalogObserver>>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("tables", &self.data.tables.len())
            .field("relations", &self.data.relations.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl TableResolver for Catalog {
    fn table_name(&self, id: Uuid) -> Option<&str> {
        self.data
            .tables
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.table.as_str())
    }
}

impl Catalog {
    /// Create an empty catalog
    pub fn new(config: CoreConfig) -> Self {
        Catalog {
            data: CatalogSnapshot::default(),
            config,
            observers: Vec::new(),
        }
    }

    /// Create a catalog from saved content
    pub fn from_snapshot(data: CatalogSnapshot, config: CoreConfig) -> Self {
        Catalog {
            data,
            config,
            observers: Vec::new(),
        }
    }

    /// Load a catalog saved with [`Catalog::save`]; a missing file gives an empty catalog
    pub fn load(path: impl AsRef<Path>, config: CoreConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No catalog at {}, starting empty", path.display());
            return Ok(Catalog::new(config));
        }

        let data: CatalogSnapshot = serde_json::from_slice(&fs::read(path)?)?;
        info!(
            "Loaded catalog from {}: {} tables, {} relations",
            path.display(),
            data.tables.len(),
            data.relations.len()
        );
        Ok(Catalog::from_snapshot(data, config))
    }

    /// Write the catalog content as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_vec_pretty(&self.data)?)?;
        Ok(())
    }

    /// Catalog content
    pub fn snapshot(&self) -> &CatalogSnapshot {
        &self.data
    }

    /// Configuration
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Register an observer of committed changes
    pub fn subscribe(&mut self, observer: Arc<dyn CatalogObserver>) {
        self.observers.push(observer);
    }

    fn notify(&self, event: CatalogEvent) {
        for observer in &self.observers {
            observer.on_commit(&event);
        }
    }

    // Tables

    /// Every table
    pub fn tables(&self) -> &[Table] {
        &self.data.tables
    }

    /// Get a table by id
    pub fn table(&self, id: Uuid) -> Result<&Table> {
        self.data
            .tables
            .iter()
            .find(|t| t.id == id)
            .ok_or(CoreError::TableNotFound(id))
    }

    /// Get a table by local name
    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.data.tables.iter().find(|t| t.table == name)
    }

    /// Add a synchronized table
    pub fn add_table(&mut self, table: Table) -> Result<Uuid> {
        CatalogValidator::validate_table(&table)?;
        if table.is_virtual {
            return Err(CoreError::ValidationError(
                "Virtual tables are defined from a relation".to_string(),
            ));
        }
        self.ensure_unique_name(&table)?;

        let id = table.id;
        debug!("Adding table {}", table.table);
        self.data.tables.push(table);
        Ok(id)
    }

    /// Replace the metadata of an existing table
    ///
    /// A table keeps its kind and defining relation. Native tables keep their
    /// name; the name of a virtual table is derived again from its alias, and
    /// a virtual table whose name changes is announced as deleted under the
    /// old name before it is saved under the new one.
    pub fn update_table(&mut self, mut table: Table) -> Result<()> {
        let index = self.table_index(table.id)?;
        let previous = self.data.tables[index].table.clone();
        {
            let current = &self.data.tables[index];
            if table.is_virtual != current.is_virtual || table.relation != current.relation {
                return Err(CoreError::ValidationError(format!(
                    "The kind and defining relation of table {} cannot change",
                    current.table
                )));
            }
            if !table.is_virtual && table.table != current.table {
                return Err(CoreError::ValidationError(format!(
                    "Table {} cannot be renamed",
                    current.table
                )));
            }
        }

        let mut sql = None;
        if table.is_virtual {
            let relation_id = table.relation.ok_or(CoreError::ValidationError(format!(
                "Virtual table {} needs a defining relation",
                table.table
            )))?;
            let relation = self.relation(relation_id)?.clone();
            table.table = self.virtual_table_name(&relation, &table.alias)?;
            CatalogValidator::validate_virtual(&table, &relation)?;

            let generated = self.generate_for(&table);
            if let GeneratedSql::Failed { error, .. } = &generated {
                return Err(CoreError::ValidationError(error.clone()));
            }
            sql = Some(generated);
        }
        CatalogValidator::validate_table(&table)?;
        self.ensure_unique_name(&table)?;

        table.touch();
        self.data.tables[index] = table;

        if let Some(sql) = sql {
            let saved = self.data.tables[index].clone();
            if saved.table != previous {
                info!("Renamed virtual table {} to {}", previous, saved.table);
                self.notify(CatalogEvent::TableDeleted {
                    id: saved.id,
                    name: previous,
                });
            }
            self.notify(CatalogEvent::VirtualTableSaved { table: saved, sql });
        }
        Ok(())
    }

    /// Delete a table that nothing references
    pub fn remove_table(&mut self, id: Uuid) -> Result<Table> {
        let index = self.table_index(id)?;
        let name = self.data.tables[index].table.clone();

        let mut references = Vec::new();
        references.extend(
            self.data
                .relations
                .iter()
                .filter(|r| r.involves(id))
                .map(|r| format!("relation {}", r.id)),
        );
        references.extend(
            self.data
                .data_groups
                .iter()
                .filter(|g| g.table == id)
                .map(|g| format!("data group {}", g.description)),
        );
        references.extend(
            self.data
                .markers
                .iter()
                .filter(|m| m.table == id || m.tables.contains(&id) || m.field_refs().any(|f| f.table == id))
                .map(|m| format!("marker {}", m.name)),
        );
        references.extend(
            self.data
                .lines
                .iter()
                .filter(|l| l.origin_field.table == id || l.destination_field.table == id)
                .map(|l| format!("line {}", l.id)),
        );
        if !references.is_empty() {
            return Err(CoreError::TableInUse {
                table: name,
                references: references.join(", "),
            });
        }

        let table = self.data.tables.remove(index);
        info!("Deleted table {}", table.table);
        self.notify(CatalogEvent::TableDeleted { id, name });
        Ok(table)
    }

    fn table_index(&self, id: Uuid) -> Result<usize> {
        self.data
            .tables
            .iter()
            .position(|t| t.id == id)
            .ok_or(CoreError::TableNotFound(id))
    }

    fn ensure_unique_name(&self, table: &Table) -> Result<()> {
        match self.table_by_name(&table.table) {
            Some(existing) if existing.id != table.id => Err(CoreError::ValidationError(format!(
                "Table {} already exists",
                table.table
            ))),
            _ => Ok(()),
        }
    }

    // Relations

    /// Every relation
    pub fn relations(&self) -> &[Relation] {
        &self.data.relations
    }

    /// Get a relation by id
    pub fn relation(&self, id: Uuid) -> Result<&Relation> {
        self.data
            .relations
            .iter()
            .find(|r| r.id == id)
            .ok_or(CoreError::RelationNotFound(id))
    }

    /// Add a relation
    pub fn add_relation(&mut self, relation: Relation) -> Result<Uuid> {
        CatalogValidator::validate_relation(&relation, &self.data.tables, &self.data.relations)?;

        let id = relation.id;
        self.data.relations.push(relation);
        Ok(id)
    }

    /// Delete a relation that defines no virtual table
    pub fn remove_relation(&mut self, id: Uuid) -> Result<Relation> {
        let index = self
            .data
            .relations
            .iter()
            .position(|r| r.id == id)
            .ok_or(CoreError::RelationNotFound(id))?;

        if let Some(table) = self.data.tables.iter().find(|t| t.relation == Some(id)) {
            return Err(CoreError::RelationInUse {
                relation: id,
                table: table.table.clone(),
            });
        }

        Ok(self.data.relations.remove(index))
    }

    // Virtual tables

    /// Local name of a virtual table over `relation` called `alias`
    pub fn virtual_table_name(&self, relation: &Relation, alias: &str) -> Result<String> {
        let one = self.table(relation.table_one)?;
        let two = self.table(relation.table_two)?;
        Ok(format!(
            "{}_{}_{}_{}",
            self.config.virtual_table_prefix,
            one.table,
            two.table,
            slugify(alias)
        ))
    }

    /// Define a virtual table and announce its defining SQL
    pub fn define_virtual(&mut self, request: VirtualTableRequest) -> Result<Uuid> {
        let relation = self.relation(request.relation)?.clone();
        let name = self.virtual_table_name(&relation, &request.alias)?;

        let mut table = Table::virtual_table(name, request.alias, relation.id, request.fields);
        table.geo_table = Some(request.geo_table.unwrap_or(relation.table_one));
        table.show_on_map = request.show_on_map;
        table.property_latitude = request.property_latitude;
        table.property_longitude = request.property_longitude;
        table.property_icon = request.property_icon;

        CatalogValidator::validate_table(&table)?;
        CatalogValidator::validate_virtual(&table, &relation)?;
        self.ensure_unique_name(&table)?;
        for descriptor in &table.fields {
            if let Some(owner) = descriptor.table {
                let owner = self.table(owner)?;
                if !owner.fields.is_empty() && !owner.has_field(&descriptor.field) {
                    return Err(CoreError::ValidationError(format!(
                        "Table {} has no field {}",
                        owner.table, descriptor.field
                    )));
                }
            }
        }

        let sql = self.generate_for(&table);
        if let GeneratedSql::Failed { error, .. } = &sql {
            return Err(CoreError::ValidationError(error.clone()));
        }

        let id = table.id;
        info!("Defined virtual table {}", table.table);
        self.data.tables.push(table.clone());
        self.notify(CatalogEvent::VirtualTableSaved { table, sql });
        Ok(id)
    }

    /// Select definition of a virtual table
    pub fn virtual_definition(&self, table: &Table) -> Result<VirtualDefinition> {
        let relation_id = table.relation.ok_or(CoreError::ValidationError(format!(
            "Table {} is not virtual",
            table.table
        )))?;
        let relation = self.relation(relation_id)?;

        Ok(VirtualDefinition {
            fields: table.fields.iter().filter_map(SelectField::from_descriptor).collect(),
            relations: vec![JoinPredicate::from(relation)],
            tables: Vec::new(),
            limit: None,
        })
    }

    fn generate_for(&self, table: &Table) -> GeneratedSql {
        match self.virtual_definition(table) {
            Ok(definition) => generate_sql(&definition, self),
            Err(e) => GeneratedSql::Failed {
                sql: String::new(),
                error: e.to_string(),
            },
        }
    }

    /// SQL of an unsaved definition, limited to the preview row count
    pub fn preview_sql(&self, definition: VirtualDefinition) -> GeneratedSql {
        let limit = definition.limit.or(self.config.preview_limit);
        generate_sql(&definition.with_limit(limit), self)
    }

    // Rows

    /// Current rows of a table; the rows of a virtual table are joined from its relation
    pub fn rows_of(&self, id: Uuid, store: &dyn RowStore) -> Result<Vec<Document>> {
        let table = self.table(id)?;
        if !table.is_virtual {
            return store.rows_for(id);
        }

        let relation = self.relation(table.relation.ok_or(CoreError::ValidationError(format!(
            "Virtual table {} needs a defining relation",
            table.table
        )))?)?;
        let rows_one = store.rows_for(relation.table_one)?;
        let rows_two = store.rows_for(relation.table_two)?;
        let spec = JoinSpec::from_relation(relation, table.geo_table, &self.config.collision_suffix);

        Ok(measure_time(&table.table, || {
            join::virtual_rows(&spec, &table.fields, &rows_one, &rows_two)
        }))
    }

    /// Merged rows of the two tables of a relation, projected like its first table
    pub fn relation_rows(&self, id: Uuid, store: &dyn RowStore, geo_table: Option<Uuid>) -> Result<Vec<Document>> {
        let relation = self.relation(id)?;
        let rows_one = store.rows_for(relation.table_one)?;
        let rows_two = store.rows_for(relation.table_two)?;
        let spec = JoinSpec::from_relation(relation, geo_table, &self.config.collision_suffix);

        Ok(join::join(&spec, &rows_one, &rows_two).collect())
    }

    /// Relations shown inline with the rows of `table`
    fn related_tables(&self, table: Uuid) -> Vec<(&Relation, &Table, bool)> {
        self.data
            .relations
            .iter()
            .filter_map(|r| {
                let (other, forward) = if r.table_one == table {
                    (r.table_two, true)
                } else if r.table_two == table && r.two_dimensional {
                    (r.table_one, false)
                } else {
                    return None;
                };
                self.table(other).ok().map(|t| (r, t, forward))
            })
            .collect()
    }

    /// Rows of a table as served to map clients
    ///
    /// Rows are projected with the table's projection and, for native
    /// tables, carry the matching rows of every related table. When `search`
    /// is given only rows containing it in one of the table's output fields
    /// are kept.
    pub fn details(&self, id: Uuid, store: &dyn RowStore, search: Option<&str>) -> Result<Vec<Document>> {
        let table = self.table(id)?;
        let rows = self.rows_of(id, store)?;
        let projection = Projection::for_table(table, &self.data.data_groups);
        let mut projected = project_all(&rows, &projection);

        if !table.is_virtual {
            let related = self.related_tables(id);
            let mut snapshots = Vec::with_capacity(related.len());
            for (_, other, _) in &related {
                snapshots.push(store.rows_for(other.id)?);
            }

            let nested: Vec<RelatedRows<'_>> = related
                .iter()
                .zip(&snapshots)
                .map(|((relation, other, forward), rows)| {
                    let (own_key, other_key) = if *forward {
                        (&relation.property_table_one, &relation.property_table_two)
                    } else {
                        (&relation.property_table_two, &relation.property_table_one)
                    };
                    RelatedRows {
                        name: &other.table,
                        own_key,
                        other_key,
                        rows,
                    }
                })
                .collect();

            if !nested.is_empty() {
                // Join keys may be projected away, so nest from the full rows
                let full = join::nest_related(rows, &nested);
                for (out, mut row) in projected.iter_mut().zip(full) {
                    for r in &nested {
                        if let Some(value) = row.remove(r.name) {
                            out.insert(r.name.to_string(), value);
                        }
                    }
                }
            }
        }

        Ok(search::filter_rows(projected, &table.output_fields(), search))
    }

    // Data groups

    /// Every data group
    pub fn data_groups(&self) -> &[DataGroup] {
        &self.data.data_groups
    }

    /// Data groups of a table
    pub fn data_groups_of(&self, table: Uuid) -> impl Iterator<Item = &DataGroup> {
        self.data.data_groups.iter().filter(move |g| g.table == table)
    }

    /// Add a data group
    pub fn add_data_group(&mut self, group: DataGroup) -> Result<Uuid> {
        CatalogValidator::validate_data_group(&group, &self.data.tables, &self.data.data_groups)?;

        let id = group.id;
        self.data.data_groups.push(group);
        Ok(id)
    }

    /// Delete a data group
    pub fn remove_data_group(&mut self, id: Uuid) -> Result<DataGroup> {
        let index = self
            .data
            .data_groups
            .iter()
            .position(|g| g.id == id)
            .ok_or(CoreError::DataGroupNotFound(id))?;
        Ok(self.data.data_groups.remove(index))
    }

    // Markers and lines

    /// Every marker
    pub fn markers(&self) -> &[Marker] {
        &self.data.markers
    }

    /// Add a marker
    pub fn add_marker(&mut self, marker: Marker) -> Result<Uuid> {
        CatalogValidator::validate_marker(&marker, &self.data.tables)?;

        let id = marker.id;
        self.data.markers.push(marker);
        Ok(id)
    }

    /// Every line
    pub fn lines(&self) -> &[Line] {
        &self.data.lines
    }

    /// Add a line
    pub fn add_line(&mut self, line: Line) -> Result<Uuid> {
        CatalogValidator::validate_line(&line, &self.data.tables)?;

        let id = line.id;
        self.data.lines.push(line);
        Ok(id)
    }

    // Connections

    /// Every connection
    pub fn connections(&self) -> &[Connection] {
        &self.data.connections
    }

    /// Get a connection by id
    pub fn connection(&self, id: Uuid) -> Option<&Connection> {
        self.data.connections.iter().find(|c| c.id == id)
    }

    /// Add or replace a connection and register its selected tables
    pub fn save_connection(&mut self, connection: Connection) -> Result<()> {
        CatalogValidator::validate_connection(&connection)?;

        match self.data.connections.iter_mut().find(|c| c.id == connection.id) {
            Some(existing) => *existing = connection.clone(),
            None => self.data.connections.push(connection.clone()),
        }
        self.apply_connection(&connection);
        Ok(())
    }

    /// Register the tables selected on `connection` and deactivate the others
    ///
    /// Newly registered tables start with every field unselected.
    pub fn apply_connection(&mut self, connection: &Connection) {
        for selection in &connection.info_to_sync_selected {
            let existing = self.data.tables.iter_mut().find(|t| {
                t.connection == Some(connection.id) && t.table_origin.as_deref() == Some(selection.table.as_str())
            });

            match existing {
                Some(table) => {
                    if !table.is_active {
                        info!("Reactivating table {}", table.table);
                        table.is_active = true;
                        table.touch();
                    }
                }
                None => {
                    let fields = match connection.discovered_fields(&selection.table) {
                        Some(fields) => usable_fields(fields),
                        None => selection
                            .fields
                            .iter()
                            .filter(|f| is_valid_identifier(f))
                            .map(FieldDescriptor::new)
                            .collect(),
                    };
                    let table = Table::synchronized(
                        connection.id,
                        selection.table.clone(),
                        connection.local_table_name(&selection.table),
                        fields,
                    );
                    if let Err(e) = self.add_table(table) {
                        warn!("Cannot register {} of {}: {}", selection.table, connection.label(), e);
                    }
                }
            }
        }

        for table in self.data.tables.iter_mut().filter(|t| t.connection == Some(connection.id)) {
            let selected = table
                .table_origin
                .as_deref()
                .map(|origin| connection.is_selected(origin))
                .unwrap_or(false);
            if table.is_active && !selected {
                info!("Deactivating table {}", table.table);
                table.is_active = false;
                table.touch();
            }
        }
    }

    /// Record the discovered columns of an upstream table
    ///
    /// Existing descriptors keep their alias and selection.
    pub fn upsert_discovered_table(&mut self, connection: &Connection, info: &TableInfo) -> Result<Uuid> {
        let fields = usable_fields(&info.fields);
        let existing = self.data.tables.iter_mut().find(|t| {
            t.connection == Some(connection.id) && t.table_origin.as_deref() == Some(info.table.as_str())
        });

        match existing {
            Some(table) => {
                let merged = fields
                    .into_iter()
                    .map(|mut field| {
                        if let Some(previous) = table.field(&field.field) {
                            field.alias = previous.alias.clone();
                            field.selected = previous.selected;
                        }
                        field
                    })
                    .collect();
                table.fields = merged;
                table.touch();
                Ok(table.id)
            }
            None => self.add_table(Table::synchronized(
                connection.id,
                info.table.clone(),
                connection.local_table_name(&info.table),
                fields,
            )),
        }
    }

    /// Replace the discovered catalogue of a connection
    pub fn set_discovered(&mut self, connection: Uuid, infos: Vec<TableInfo>) -> Result<()> {
        let connection = self
            .data
            .connections
            .iter_mut()
            .find(|c| c.id == connection)
            .ok_or_else(|| CoreError::ValidationError(format!("Connection not found: {}", connection)))?;
        connection.info_to_sync = infos;
        Ok(())
    }
}

/// Descriptors usable as columns: up to the first aggregate, valid identifiers only
fn usable_fields(fields: &[FieldDescriptor]) -> Vec<FieldDescriptor> {
    fields
        .iter()
        .take_while(|f| !f.field.starts_with("MAX("))
        .filter(|f| {
            let valid = is_valid_identifier(&f.field);
            if !valid {
                warn!("Skipping field {:?}", f.field);
            }
            valid
        })
        .cloned()
        .map(|mut f| {
            f.selected = false;
            f.alias = None;
            f
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldRef, SyncSelection};
    use crate::store::tests::doc;
    use crate::store::MemoryRowStore;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<CatalogEvent>>,
    }

    impl CatalogObserver for RecordingObserver {
        fn on_commit(&self, event: &CatalogEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    struct Fixture {
        catalog: Catalog,
        clients: Uuid,
        orders: Uuid,
        relation: Uuid,
        observer: Arc<RecordingObserver>,
    }

    // Helper to create a test catalog with clients, orders and a relation between them
    fn create_test_catalog() -> Fixture {
        let mut catalog = Catalog::new(CoreConfig::default());
        let observer = Arc::new(RecordingObserver::default());
        catalog.subscribe(observer.clone());

        let connection = Uuid::new_v4();
        let mut clients = Table::synchronized(
            connection,
            "clients",
            "shop_clients",
            vec![
                FieldDescriptor::new("id").selected(),
                FieldDescriptor::new("name").selected(),
                FieldDescriptor::new("lat"),
                FieldDescriptor::new("lng"),
            ],
        )
        .with_geo("lat", "lng");
        clients.show_on_map = true;
        let orders = Table::synchronized(
            connection,
            "orders",
            "shop_orders",
            vec![
                FieldDescriptor::new("client_id").selected(),
                FieldDescriptor::new("name").selected(),
                FieldDescriptor::new("total").selected(),
            ],
        );

        let clients = catalog.add_table(clients).unwrap();
        let orders = catalog.add_table(orders).unwrap();
        let relation = catalog
            .add_relation(Relation::new(clients, "id", orders, "client_id"))
            .unwrap();

        Fixture {
            catalog,
            clients,
            orders,
            relation,
            observer,
        }
    }

    fn create_test_store(f: &Fixture) -> MemoryRowStore {
        let store = MemoryRowStore::new();
        store
            .replace_rows(
                f.clients,
                vec![
                    doc(json!({"id": 1, "name": "Ana", "lat": 10.5, "lng": -66.9})),
                    doc(json!({"id": 2, "name": "Luis", "lat": 0, "lng": -66.9})),
                ],
            )
            .unwrap();
        store
            .replace_rows(
                f.orders,
                vec![
                    doc(json!({"client_id": 1, "name": "first", "total": 10})),
                    doc(json!({"client_id": 1, "name": "second", "total": 20})),
                ],
            )
            .unwrap();
        store
    }

    fn route_request(f: &Fixture) -> VirtualTableRequest {
        VirtualTableRequest {
            alias: "Client Routes".to_string(),
            relation: f.relation,
            fields: vec![
                FieldDescriptor::of_table(f.clients, "name", Some("client".to_string())),
                FieldDescriptor::of_table(f.clients, "lat", None),
                FieldDescriptor::of_table(f.clients, "lng", None),
                FieldDescriptor::of_table(f.orders, "total", None),
            ],
            geo_table: None,
            show_on_map: true,
            property_latitude: Some("lat".to_string()),
            property_longitude: Some("lng".to_string()),
            property_icon: None,
        }
    }

    #[test]
    fn test_define_virtual_announces_sql() {
        let mut f = create_test_catalog();
        let request = route_request(&f);
        let id = f.catalog.define_virtual(request).unwrap();

        let table = f.catalog.table(id).unwrap();
        assert_eq!(table.table, "virtual_shop_clients_shop_orders_client_routes");
        assert_eq!(table.geo_table, Some(f.clients));

        let events = f.observer.events.lock().unwrap();
        match &events[..] {
            [CatalogEvent::VirtualTableSaved { sql, .. }] => assert_eq!(
                sql.statement(),
                Some(
                    "SELECT shop_clients.name AS client, shop_clients.lat, shop_clients.lng, shop_orders.total \
                     FROM shop_clients, shop_orders WHERE shop_clients.id = shop_orders.client_id"
                )
            ),
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[test]
    fn test_update_virtual_table_derives_name_from_alias() {
        let mut f = create_test_catalog();
        let request = route_request(&f);
        let id = f.catalog.define_virtual(request).unwrap();

        let mut table = f.catalog.table(id).unwrap().clone();
        table.table = "anything".to_string();
        table.alias = "Other Alias".to_string();
        f.catalog.update_table(table).unwrap();

        assert_eq!(
            f.catalog.table(id).unwrap().table,
            "virtual_shop_clients_shop_orders_other_alias"
        );
        let events = f.observer.events.lock().unwrap();
        match &events[..] {
            [CatalogEvent::VirtualTableSaved { .. }, CatalogEvent::TableDeleted { name, .. }, CatalogEvent::VirtualTableSaved { table, .. }] =>
            {
                assert_eq!(name, "virtual_shop_clients_shop_orders_client_routes");
                assert_eq!(table.table, "virtual_shop_clients_shop_orders_other_alias");
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[test]
    fn test_update_virtual_table_keeping_alias_only_saves() {
        let mut f = create_test_catalog();
        let request = route_request(&f);
        let id = f.catalog.define_virtual(request).unwrap();

        let mut table = f.catalog.table(id).unwrap().clone();
        table.show_on_map = false;
        f.catalog.update_table(table).unwrap();

        let events = f.observer.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], CatalogEvent::VirtualTableSaved { .. }));
    }

    #[test]
    fn test_update_table_keeps_kind_and_native_name() {
        let mut f = create_test_catalog();
        let request = route_request(&f);
        let virtual_id = f.catalog.define_virtual(request).unwrap();

        let mut flipped = f.catalog.table(f.orders).unwrap().clone();
        flipped.is_virtual = true;
        flipped.relation = Some(f.relation);
        assert!(f.catalog.update_table(flipped).is_err());

        let mut renamed = f.catalog.table(f.orders).unwrap().clone();
        renamed.table = "shop_sales".to_string();
        assert!(f.catalog.update_table(renamed).is_err());

        let mut detached = f.catalog.table(virtual_id).unwrap().clone();
        detached.is_virtual = false;
        detached.relation = None;
        assert!(f.catalog.update_table(detached).is_err());

        assert_eq!(f.catalog.table(f.orders).unwrap().table, "shop_orders");
        assert!(!f.catalog.table(f.orders).unwrap().is_virtual);
        assert_eq!(f.observer.events.lock().unwrap().len(), 1);

        let mut described = f.catalog.table(f.orders).unwrap().clone();
        described.alias = "Orders".to_string();
        f.catalog.update_table(described).unwrap();
        assert_eq!(f.catalog.table(f.orders).unwrap().alias, "Orders");
        assert_eq!(f.observer.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_define_virtual_rejects_unknown_field() {
        let mut f = create_test_catalog();
        let mut request = route_request(&f);
        request.fields.push(FieldDescriptor::of_table(f.orders, "missing", None));

        assert!(f.catalog.define_virtual(request).is_err());
        assert_eq!(f.catalog.tables().len(), 2);
        assert!(f.observer.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_virtual_details_take_first_match() {
        let mut f = create_test_catalog();
        let store = create_test_store(&f);
        let request = route_request(&f);
        let id = f.catalog.define_virtual(request).unwrap();

        let rows = f.catalog.details(id, &store, None).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["client"], json!("Ana"));
        assert_eq!(rows[0]["total"], json!(10));
        assert_eq!(rows[0]["point"], json!({"latitude": 10.5, "longitude": -66.9}));
    }

    #[test]
    fn test_native_details_nest_related_rows() {
        let f = create_test_catalog();
        let store = create_test_store(&f);

        let rows = f.catalog.details(f.clients, &store, None).unwrap();

        assert_eq!(rows[0]["shop_orders"].as_array().unwrap().len(), 2);
        assert_eq!(rows[1]["shop_orders"], json!([]));
        assert_eq!(rows[1]["point"], json!(null));
        assert!(!rows[0].contains_key("lat"));

        // Not two-dimensional, so orders do not nest clients
        let orders = f.catalog.details(f.orders, &store, None).unwrap();
        assert!(!orders[0].contains_key("shop_clients"));

        let found = f.catalog.details(f.clients, &store, Some("luis")).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_two_dimensional_relation_nests_both_ways() {
        let mut f = create_test_catalog();
        let store = create_test_store(&f);
        f.catalog.remove_relation(f.relation).unwrap();
        f.catalog
            .add_relation(Relation::new(f.clients, "id", f.orders, "client_id").two_dimensional())
            .unwrap();

        let orders = f.catalog.details(f.orders, &store, None).unwrap();

        assert_eq!(orders[0]["shop_clients"][0]["name"], json!("Ana"));
    }

    #[test]
    fn test_referenced_table_and_relation_cannot_be_deleted() {
        let mut f = create_test_catalog();
        let request = route_request(&f);
        let virtual_id = f.catalog.define_virtual(request).unwrap();

        assert!(matches!(
            f.catalog.remove_table(f.clients),
            Err(CoreError::TableInUse { .. })
        ));
        assert!(matches!(
            f.catalog.remove_relation(f.relation),
            Err(CoreError::RelationInUse { .. })
        ));

        f.catalog.remove_table(virtual_id).unwrap();
        f.catalog.remove_relation(f.relation).unwrap();
        f.catalog.remove_table(f.clients).unwrap();

        let events = f.observer.events.lock().unwrap();
        assert!(matches!(events.last(), Some(CatalogEvent::TableDeleted { id, .. }) if *id == f.clients));
    }

    #[test]
    fn test_preview_sql_applies_limit() {
        let f = create_test_catalog();
        let definition = VirtualDefinition {
            fields: vec![SelectField {
                table: f.orders,
                field: "total".to_string(),
                alias: None,
            }],
            ..Default::default()
        };

        assert_eq!(
            f.catalog.preview_sql(definition).statement(),
            Some("SELECT shop_orders.total FROM shop_orders LIMIT 100")
        );
    }

    #[test]
    fn test_connection_hook_registers_and_deactivates() {
        let mut catalog = Catalog::new(CoreConfig::default());
        let mut connection: Connection = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "description": "erp",
            "host": "10.0.0.5",
            "database_name": "shop",
            "database_username": "reader",
            "info_to_sync": [{"table": "clients", "fields": [
                {"Field": "id", "Type": "int(11)", "Null": "NO"},
                {"Field": "MAX(id)", "Type": "int(11)"}
            ]}],
            "info_to_sync_selected": [{"table": "clients", "fields": ["id"]}]
        }))
        .unwrap();

        catalog.save_connection(connection.clone()).unwrap();
        let table = catalog.table_by_name("shop_clients").unwrap();
        assert!(table.is_active);
        assert_eq!(table.fields.len(), 1);
        assert!(!table.fields[0].selected);

        connection.info_to_sync_selected.clear();
        catalog.save_connection(connection.clone()).unwrap();
        assert!(!catalog.table_by_name("shop_clients").unwrap().is_active);

        connection.info_to_sync_selected.push(SyncSelection {
            table: "clients".to_string(),
            fields: vec![],
        });
        catalog.save_connection(connection).unwrap();
        assert!(catalog.table_by_name("shop_clients").unwrap().is_active);
        assert_eq!(catalog.tables().len(), 1);
    }

    #[test]
    fn test_upsert_keeps_selection() {
        let mut f = create_test_catalog();
        let connection = f.catalog.table(f.clients).unwrap().connection.unwrap();
        let connection: Connection = serde_json::from_value(json!({
            "id": connection,
            "description": "erp",
            "host": "10.0.0.5",
            "database_name": "shop",
            "database_username": "reader"
        }))
        .unwrap();
        let info = TableInfo {
            table: "clients".to_string(),
            fields: vec![
                FieldDescriptor::new("id").with_type("int(11)", false),
                FieldDescriptor::new("email").with_type("varchar(80)", true),
            ],
        };

        let id = f.catalog.upsert_discovered_table(&connection, &info).unwrap();

        assert_eq!(id, f.clients);
        let table = f.catalog.table(id).unwrap();
        assert!(table.field("id").unwrap().selected);
        assert!(!table.field("email").unwrap().selected);
        assert!(!table.has_field("name"));
    }

    #[test]
    fn test_markers_and_lines_reference_known_tables() {
        let mut f = create_test_catalog();
        f.catalog
            .add_marker(Marker::new("clients", f.clients, "lat", "lng"))
            .unwrap();
        assert!(f
            .catalog
            .add_marker(Marker::new("ghost", Uuid::new_v4(), "lat", "lng"))
            .is_err());

        f.catalog
            .add_line(Line::new(FieldRef::new(f.clients, "id"), FieldRef::new(f.orders, "client_id")))
            .unwrap();
        assert_eq!(f.catalog.lines().len(), 1);
        assert_eq!(f.catalog.markers().len(), 1);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let f = create_test_catalog();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        f.catalog.save(&path).unwrap();
        let loaded = Catalog::load(&path, CoreConfig::default()).unwrap();

        assert_eq!(loaded.snapshot(), f.catalog.snapshot());
        assert!(Catalog::load(dir.path().join("missing.json"), CoreConfig::default())
            .unwrap()
            .tables()
            .is_empty());
    }
}
