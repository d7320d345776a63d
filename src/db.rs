//! Local SQLite store for orders, order items and settings.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations, settings helpers,
//! whole-record order writes and the [`OrderStore`] query interface the
//! duplicate detector and the board read through.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::models::{Order, OrderItem};

/// Shared database handle.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    /// Lock the connection for a single unit of work.
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Fully migrated in-memory database.
    pub fn open_in_memory() -> Result<DbState> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        run_migrations(&conn)?;
        Ok(DbState {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }
}

/// Schema migrations in application order. Each runs in its own
/// transaction together with its `schema_version` row.
const MIGRATIONS: &[(i32, &str)] = &[
    (1, SCHEMA_V1),
    // Lookup index for ERP references.
    (2, "CREATE INDEX IF NOT EXISTS idx_orders_external_ref ON orders(external_ref);"),
];

const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS[MIGRATIONS.len() - 1].0;

const SCHEMA_V1: &str = "
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            order_number TEXT NOT NULL,
            customer_name TEXT NOT NULL,
            customer_document TEXT,
            delivery_date TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            category TEXT,
            order_type TEXT,
            external_ref TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS order_items (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            item_code TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            requested_quantity REAL NOT NULL DEFAULT 0,
            delivered_quantity REAL NOT NULL DEFAULT 0,
            source_type TEXT NOT NULL DEFAULT 'in_stock',
            status TEXT NOT NULL DEFAULT 'pending'
        );

        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
        CREATE INDEX IF NOT EXISTS idx_orders_order_number ON orders(order_number);
        CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders(created_at);
        CREATE INDEX IF NOT EXISTS idx_order_items_order_id ON order_items(order_id);
";

/// Open (or create) `{data_dir}/orders.db` and bring its schema up to date.
///
/// A file that cannot be opened is treated as corrupt: it is removed along
/// with its WAL sidecars and opened fresh, once.
pub fn init(data_dir: &Path) -> Result<DbState> {
    fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("orders.db");
    info!(path = %db_path.display(), "Opening order database");

    let conn = open_and_configure(&db_path).or_else(|e| {
        warn!(error = %e, "Order database unreadable, recreating");
        discard_db_files(&db_path);
        open_and_configure(&db_path)
    })?;
    run_migrations(&conn)?;

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

fn discard_db_files(db_path: &Path) {
    for ext in ["db", "db-wal", "db-shm"] {
        let path = db_path.with_extension(ext);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Could not remove database file");
            }
        }
    }
}

fn open_and_configure(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(conn)
}

/// Apply every migration newer than the recorded schema version.
fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let applied: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if applied >= CURRENT_SCHEMA_VERSION {
        debug!(version = applied, "Order database schema up to date");
        return Ok(());
    }

    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > applied) {
        let tx = conn.unchecked_transaction()?;
        let applied_ok = tx.execute_batch(sql).and_then(|_| {
            tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        });
        if let Err(e) = applied_ok {
            error!(version, error = %e, "Schema migration failed");
            return Err(e.into());
        }
        tx.commit()?;
        info!(version, "Applied schema migration");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Read a setting value by category and key.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Query interface
// ---------------------------------------------------------------------------

/// Order columns usable in equality filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    OrderNumber,
    ExternalRef,
    Status,
    Category,
    CustomerName,
    CustomerDocument,
}

impl OrderField {
    fn column(self) -> &'static str {
        match self {
            OrderField::OrderNumber => "order_number",
            OrderField::ExternalRef => "external_ref",
            OrderField::Status => "status",
            OrderField::Category => "category",
            OrderField::CustomerName => "customer_name",
            OrderField::CustomerDocument => "customer_document",
        }
    }
}

/// Filter/order/limit description for reading the `orders` collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderQuery {
    pub equals: Vec<(OrderField, String)>,
    pub status_not_in: Vec<String>,
    pub newest_first: bool,
    pub limit: Option<usize>,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: OrderField, value: impl Into<String>) -> Self {
        self.equals.push((field, value.into()));
        self
    }

    pub fn status_not_in(mut self, statuses: &[&str]) -> Self {
        self.status_not_in
            .extend(statuses.iter().map(|s| s.to_string()));
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn to_sql(&self) -> (String, Vec<String>) {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1 = 1");
        let mut values: Vec<String> = Vec::new();

        for (field, value) in &self.equals {
            values.push(value.clone());
            sql.push_str(&format!(" AND {} = ?{}", field.column(), values.len()));
        }

        if !self.status_not_in.is_empty() {
            let mut placeholders = Vec::with_capacity(self.status_not_in.len());
            for status in &self.status_not_in {
                values.push(status.clone());
                placeholders.push(format!("?{}", values.len()));
            }
            sql.push_str(&format!(" AND status NOT IN ({})", placeholders.join(", ")));
        }

        if self.newest_first {
            sql.push_str(" ORDER BY created_at DESC");
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        (sql, values)
    }
}

/// Read access to the order collection.
pub trait OrderStore {
    fn query_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;
}

impl OrderStore for DbState {
    fn query_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let conn = self.lock()?;
        let (sql, values) = query.to_sql();
        let mut stmt = conn.prepare(&sql)?;
        let mut orders = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), order_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for order in &mut orders {
            order.items = load_items(&conn, &order.id)?;
        }
        Ok(orders)
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

const ORDER_COLUMNS: &str = "id, order_number, customer_name, customer_document, delivery_date, \
     status, category, order_type, external_ref, created_at, updated_at";

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_date(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
    }
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        order_number: row.get(1)?,
        customer_name: row.get(2)?,
        customer_document: row.get(3)?,
        delivery_date: parse_date(4, row.get(4)?)?,
        status: row.get(5)?,
        category: row.get(6)?,
        order_type: row.get(7)?,
        external_ref: row.get(8)?,
        created_at: parse_timestamp(9, &row.get::<_, String>(9)?)?,
        updated_at: parse_timestamp(10, &row.get::<_, String>(10)?)?,
        items: Vec::new(),
    })
}

fn load_items(conn: &Connection, order_id: &str) -> Result<Vec<OrderItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, order_id, item_code, description, requested_quantity,
                delivered_quantity, source_type, status
         FROM order_items WHERE order_id = ?1 ORDER BY rowid",
    )?;
    let items = stmt
        .query_map(params![order_id], |row| {
            Ok(OrderItem {
                id: row.get(0)?,
                order_id: row.get(1)?,
                item_code: row.get(2)?,
                description: row.get(3)?,
                requested_quantity: row.get(4)?,
                delivered_quantity: row.get(5)?,
                source_type: row.get(6)?,
                status: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items)
}

fn insert_items(conn: &Connection, order: &Order) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO order_items (id, order_id, item_code, description, requested_quantity,
                                  delivered_quantity, source_type, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for item in &order.items {
        stmt.execute(params![
            item.id,
            order.id,
            item.item_code,
            item.description,
            item.requested_quantity,
            item.delivered_quantity,
            item.source_type,
            item.status,
        ])?;
    }
    Ok(())
}

/// Insert an order and its items in one transaction.
pub fn insert_order(conn: &Connection, order: &Order) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO orders (id, order_number, customer_name, customer_document, delivery_date,
                             status, category, order_type, external_ref, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            order.id,
            order.order_number,
            order.customer_name,
            order.customer_document,
            order.delivery_date.map(|d| d.format("%Y-%m-%d").to_string()),
            order.status,
            order.category,
            order.order_type,
            order.external_ref,
            format_timestamp(&order.created_at),
            format_timestamp(&order.updated_at),
        ],
    )?;
    insert_items(&tx, order)?;
    tx.commit()?;
    info!(order_id = %order.id, order_number = %order.order_number, "Order inserted");
    Ok(())
}

/// Replace an existing order record (and its items) by id.
///
/// Returns `false` when no order with that id exists.
pub fn update_order(conn: &Connection, order: &Order) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let changed = tx.execute(
        "UPDATE orders SET order_number = ?2, customer_name = ?3, customer_document = ?4,
                delivery_date = ?5, status = ?6, category = ?7, order_type = ?8,
                external_ref = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            order.id,
            order.order_number,
            order.customer_name,
            order.customer_document,
            order.delivery_date.map(|d| d.format("%Y-%m-%d").to_string()),
            order.status,
            order.category,
            order.order_type,
            order.external_ref,
            format_timestamp(&Utc::now()),
        ],
    )?;
    if changed == 0 {
        return Ok(false);
    }
    tx.execute(
        "DELETE FROM order_items WHERE order_id = ?1",
        params![order.id],
    )?;
    insert_items(&tx, order)?;
    tx.commit()?;
    Ok(true)
}

/// Move an order to a new status. Returns `false` when the id is unknown.
pub fn update_order_status(conn: &Connection, order_id: &str, status: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![order_id, status, format_timestamp(&Utc::now())],
    )?;
    if changed > 0 {
        info!(order_id = %order_id, status = %status, "Order status updated");
    }
    Ok(changed > 0)
}

/// Fetch a single order with its items.
pub fn get_order(conn: &Connection, order_id: &str) -> Result<Option<Order>> {
    let order = conn
        .query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
            params![order_id],
            order_from_row,
        )
        .optional()?;
    match order {
        Some(mut order) => {
            order.items = load_items(conn, &order.id)?;
            Ok(Some(order))
        }
        None => Ok(None),
    }
}

/// All orders, newest first.
pub fn list_orders(conn: &Connection) -> Result<Vec<Order>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
    ))?;
    let mut orders = stmt
        .query_map([], order_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for order in &mut orders {
        order.items = load_items(conn, &order.id)?;
    }
    Ok(orders)
}

// ===========================================================================
// Tests
// ===========================================================================
