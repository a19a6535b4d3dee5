//! Catalog repository: dimension tables (departments, buildings, printer
//! models, printers, computers, ports).
//!
//! Functions take a `&Connection` so they compose inside the caller's
//! transaction or savepoint. Inserts are `ON CONFLICT DO NOTHING`: the
//! return value says whether this call created the row, and a `false`
//! means a concurrent writer (or an earlier call) already holds the key.

use rusqlite::{params, Connection, Row};

use super::{now_timestamp, DatabaseError};

/// A row of a `code`/`name` dimension (departments, buildings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeNameRow {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub created_at: String,
}

pub type DepartmentRow = CodeNameRow;
pub type BuildingRow = CodeNameRow;

impl CodeNameRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            code: row.get("code")?,
            name: row.get("name")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterModelRow {
    pub id: i64,
    pub code: String,
    pub manufacturer: String,
    pub model: String,
    pub is_color: bool,
    pub is_duplex: bool,
    pub created_at: String,
}

impl PrinterModelRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            code: row.get("code")?,
            manufacturer: row.get("manufacturer")?,
            model: row.get("model")?,
            is_color: row.get("is_color")?,
            is_duplex: row.get("is_duplex")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterRow {
    pub id: i64,
    pub name: String,
    pub model_id: i64,
    pub building_id: i64,
    pub department_id: i64,
    pub room_number: String,
    pub printer_index: i64,
    pub is_active: bool,
    pub created_at: String,
}

impl PrinterRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            model_id: row.get("model_id")?,
            building_id: row.get("building_id")?,
            department_id: row.get("department_id")?,
            room_number: row.get("room_number")?,
            printer_index: row.get("printer_index")?,
            is_active: row.get("is_active")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// New printer values. `room_number` is matched case-insensitively.
#[derive(Debug, Clone)]
pub struct NewPrinter<'a> {
    pub name: &'a str,
    pub model_id: i64,
    pub building_id: i64,
    pub department_id: i64,
    pub room_number: &'a str,
    pub printer_index: i64,
}

/// A computer or port row; both carry an optional decomposed location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRow {
    pub id: i64,
    pub name: String,
    pub building_id: Option<i64>,
    pub department_id: Option<i64>,
    pub room_number: Option<String>,
    /// `number_in_room` for computers, `printer_index` for ports.
    pub index: Option<i64>,
    pub created_at: String,
}

pub type ComputerRow = EndpointRow;
pub type PortRow = EndpointRow;

/// Location fields for a new computer or port.
#[derive(Debug, Clone, Default)]
pub struct EndpointLocation<'a> {
    pub building_id: Option<i64>,
    pub department_id: Option<i64>,
    pub room_number: Option<&'a str>,
    pub index: Option<i64>,
}

/// Tables that can be counted through [`count_rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Departments,
    Buildings,
    PrinterModels,
    Printers,
    Computers,
    Ports,
    Users,
    PrintEvents,
}

impl Table {
    fn name(self) -> &'static str {
        match self {
            Table::Departments => "departments",
            Table::Buildings => "buildings",
            Table::PrinterModels => "printer_models",
            Table::Printers => "printers",
            Table::Computers => "computers",
            Table::Ports => "ports",
            Table::Users => "users",
            Table::PrintEvents => "print_events",
        }
    }
}

#[derive(Clone, Copy)]
enum EndpointTable {
    Computers,
    Ports,
}

impl EndpointTable {
    fn name(self) -> &'static str {
        match self {
            EndpointTable::Computers => "computers",
            EndpointTable::Ports => "ports",
        }
    }

    fn index_column(self) -> &'static str {
        match self {
            EndpointTable::Computers => "number_in_room",
            EndpointTable::Ports => "printer_index",
        }
    }
}

fn first<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: impl FnMut(&Row<'_>) -> Result<T, rusqlite::Error>,
) -> Result<Option<T>, DatabaseError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let mut rows = stmt.query_map(params, map)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Finds a department by code, ignoring case.
pub fn find_department(conn: &Connection, code: &str) -> Result<Option<DepartmentRow>, DatabaseError> {
    first(
        conn,
        "SELECT * FROM departments WHERE code = ?1",
        params![code],
        CodeNameRow::from_row,
    )
}

/// Inserts a department unless one with the same code (any case) exists.
pub fn insert_department(conn: &Connection, code: &str, name: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT INTO departments (code, name, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(code) DO NOTHING",
        params![code, name, now_timestamp()],
    )?;
    Ok(changed == 1)
}

/// Finds a building by code, ignoring case.
pub fn find_building(conn: &Connection, code: &str) -> Result<Option<BuildingRow>, DatabaseError> {
    first(
        conn,
        "SELECT * FROM buildings WHERE code = ?1",
        params![code],
        CodeNameRow::from_row,
    )
}

/// Inserts a building unless one with the same code (any case) exists.
pub fn insert_building(conn: &Connection, code: &str, name: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT INTO buildings (code, name, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(code) DO NOTHING",
        params![code, name, now_timestamp()],
    )?;
    Ok(changed == 1)
}

pub fn find_printer_model(
    conn: &Connection,
    code: &str,
) -> Result<Option<PrinterModelRow>, DatabaseError> {
    first(
        conn,
        "SELECT * FROM printer_models WHERE code = ?1",
        params![code],
        PrinterModelRow::from_row,
    )
}

pub fn insert_printer_model(
    conn: &Connection,
    code: &str,
    manufacturer: &str,
    model: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT INTO printer_models (code, manufacturer, model, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(code) DO NOTHING",
        params![code, manufacturer, model, now_timestamp()],
    )?;
    Ok(changed == 1)
}

/// Finds a printer by its natural key `(building, room, index)`; the room
/// comparison ignores case.
pub fn find_printer(
    conn: &Connection,
    building_id: i64,
    room_number: &str,
    printer_index: i64,
) -> Result<Option<PrinterRow>, DatabaseError> {
    first(
        conn,
        "SELECT * FROM printers WHERE building_id = ?1 AND room_number = ?2 AND printer_index = ?3",
        params![building_id, room_number, printer_index],
        PrinterRow::from_row,
    )
}

pub fn insert_printer(conn: &Connection, printer: &NewPrinter<'_>) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT INTO printers (name, model_id, building_id, department_id, room_number,
         printer_index, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)
         ON CONFLICT(building_id, room_number, printer_index) DO NOTHING",
        params![
            printer.name,
            printer.model_id,
            printer.building_id,
            printer.department_id,
            printer.room_number,
            printer.printer_index,
            now_timestamp(),
        ],
    )?;
    Ok(changed == 1)
}

fn find_endpoint(
    conn: &Connection,
    table: EndpointTable,
    name: &str,
) -> Result<Option<EndpointRow>, DatabaseError> {
    let sql = format!(
        "SELECT id, name, building_id, department_id, room_number, {} AS idx, created_at
         FROM {} WHERE name = ?1",
        table.index_column(),
        table.name()
    );
    first(conn, &sql, params![name], |row| {
        Ok(EndpointRow {
            id: row.get("id")?,
            name: row.get("name")?,
            building_id: row.get("building_id")?,
            department_id: row.get("department_id")?,
            room_number: row.get("room_number")?,
            index: row.get("idx")?,
            created_at: row.get("created_at")?,
        })
    })
}

fn insert_endpoint(
    conn: &Connection,
    table: EndpointTable,
    name: &str,
    location: &EndpointLocation<'_>,
) -> Result<bool, DatabaseError> {
    let sql = format!(
        "INSERT INTO {} (name, building_id, department_id, room_number, {}, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(name) DO NOTHING",
        table.name(),
        table.index_column()
    );
    let changed = conn.execute(
        &sql,
        params![
            name,
            location.building_id,
            location.department_id,
            location.room_number,
            location.index,
            now_timestamp(),
        ],
    )?;
    Ok(changed == 1)
}

/// Finds a computer by hostname, ignoring case.
pub fn find_computer(conn: &Connection, name: &str) -> Result<Option<ComputerRow>, DatabaseError> {
    find_endpoint(conn, EndpointTable::Computers, name)
}

pub fn insert_computer(
    conn: &Connection,
    name: &str,
    location: &EndpointLocation<'_>,
) -> Result<bool, DatabaseError> {
    insert_endpoint(conn, EndpointTable::Computers, name, location)
}

/// Finds a port by name, ignoring case.
pub fn find_port(conn: &Connection, name: &str) -> Result<Option<PortRow>, DatabaseError> {
    find_endpoint(conn, EndpointTable::Ports, name)
}

pub fn insert_port(
    conn: &Connection,
    name: &str,
    location: &EndpointLocation<'_>,
) -> Result<bool, DatabaseError> {
    insert_endpoint(conn, EndpointTable::Ports, name, location)
}

/// Counts the rows of a table.
pub fn count_rows(conn: &Connection, table: Table) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", table.name()),
        [],
        |r| r.get(0),
    )?;
    Ok(count)
}
