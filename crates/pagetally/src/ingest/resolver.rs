//! Case-insensitive get-or-create for dimension rows.
//!
//! Every lookup is an exact match under `COLLATE NOCASE`. An absent row is
//! inserted with `ON CONFLICT DO NOTHING` and then selected again, so when
//! two writers race on the same natural key both end up with the winner's
//! row. Existing rows are returned unchanged.

use rusqlite::Connection;

use super::error::{IngestError, ValidationError};
use super::record::{EndpointKey, EndpointLocationKey, PrinterKey};
use crate::db::catalog_repo::{
    self, BuildingRow, ComputerRow, DepartmentRow, EndpointLocation, NewPrinter, PortRow,
    PrinterModelRow, PrinterRow,
};
use crate::db::user_repo::{self, UserRow};
use crate::db::DatabaseError;

/// Resolves dimension rows on one connection, typically the savepoint of
/// the record being imported.
pub struct IdentityResolver<'c> {
    conn: &'c Connection,
}

impl<'c> IdentityResolver<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Department by code; created as `code = name = upper(code)`.
    pub fn department(&self, code: &str) -> Result<DepartmentRow, IngestError> {
        let code = normalize_code(code, "Department")?;
        let conn = self.conn;
        Ok(get_or_create(
            || catalog_repo::find_department(conn, &code),
            || catalog_repo::insert_department(conn, &code, &code),
        )?)
    }

    /// Building by code; same creation policy as departments.
    pub fn building(&self, code: &str) -> Result<BuildingRow, IngestError> {
        let code = normalize_code(code, "Building")?;
        let conn = self.conn;
        Ok(get_or_create(
            || catalog_repo::find_building(conn, &code),
            || catalog_repo::insert_building(conn, &code, &code),
        )?)
    }

    /// Printer model by code. A new model takes its manufacturer from the
    /// first word of the code and its model name from the rest.
    pub fn printer_model(&self, code: &str) -> Result<PrinterModelRow, IngestError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ValidationError::EmptyCode { kind: "Printer model" }.into());
        }
        let (manufacturer, model) = match code.split_once(char::is_whitespace) {
            Some((manufacturer, model)) => (manufacturer, model.trim()),
            None => (code, ""),
        };
        let conn = self.conn;
        Ok(get_or_create(
            || catalog_repo::find_printer_model(conn, code),
            || catalog_repo::insert_printer_model(conn, code, manufacturer, model),
        )?)
    }

    /// Printer by `(building, room, index)`. A new printer is named after
    /// the composite key it was first seen under.
    pub fn printer(
        &self,
        key: &PrinterKey,
        building: &BuildingRow,
        department: &DepartmentRow,
        model: &PrinterModelRow,
    ) -> Result<PrinterRow, IngestError> {
        let conn = self.conn;
        let new = NewPrinter {
            name: &key.name,
            model_id: model.id,
            building_id: building.id,
            department_id: department.id,
            room_number: &key.room_number,
            printer_index: key.index,
        };
        Ok(get_or_create(
            || catalog_repo::find_printer(conn, building.id, &key.room_number, key.index),
            || catalog_repo::insert_printer(conn, &new),
        )?)
    }

    /// Resolves every dimension a printer key references.
    pub fn printer_for_key(&self, key: &PrinterKey) -> Result<PrinterRow, IngestError> {
        let building = self.building(&key.building_code)?;
        let department = self.department(&key.department_code)?;
        let model = self.printer_model(&key.model_code)?;
        self.printer(key, &building, &department, &model)
    }

    /// Computer by hostname. Building and department of a structured
    /// hostname are only resolved when the computer is new.
    pub fn computer(&self, key: &EndpointKey) -> Result<ComputerRow, IngestError> {
        if let Some(row) = catalog_repo::find_computer(self.conn, &key.name)? {
            return Ok(row);
        }
        let location = self.endpoint_location(key.location.as_ref())?;
        let conn = self.conn;
        Ok(get_or_create(
            || catalog_repo::find_computer(conn, &key.name),
            || catalog_repo::insert_computer(conn, &key.name, &location.as_location()),
        )?)
    }

    /// Port by name, same policy as [`IdentityResolver::computer`].
    pub fn port(&self, key: &EndpointKey) -> Result<PortRow, IngestError> {
        if let Some(row) = catalog_repo::find_port(self.conn, &key.name)? {
            return Ok(row);
        }
        let location = self.endpoint_location(key.location.as_ref())?;
        let conn = self.conn;
        Ok(get_or_create(
            || catalog_repo::find_port(conn, &key.name),
            || catalog_repo::insert_port(conn, &key.name, &location.as_location()),
        )?)
    }

    /// Existing user by username (any case).
    pub fn find_user(&self, username: &str) -> Result<Option<UserRow>, IngestError> {
        Ok(user_repo::find_by_username(self.conn, username)?)
    }

    /// User by username, created active with `fio = username` and no
    /// department when absent. The flag is true when this call created it.
    pub fn user(&self, username: &str) -> Result<(UserRow, bool), IngestError> {
        let username = username.trim().to_lowercase();
        if username.is_empty() {
            return Err(ValidationError::MissingUsername.into());
        }
        if let Some(row) = user_repo::find_by_username(self.conn, &username)? {
            return Ok((row, false));
        }
        let created = user_repo::insert_if_absent(self.conn, &username, &username, None, true)?;
        let row = user_repo::find_by_username(self.conn, &username)?.ok_or(missing_row())?;
        Ok((row, created))
    }

    fn endpoint_location(
        &self,
        key: Option<&EndpointLocationKey>,
    ) -> Result<ResolvedLocation, IngestError> {
        let Some(key) = key else {
            return Ok(ResolvedLocation::default());
        };
        Ok(ResolvedLocation {
            building_id: Some(self.building(&key.building_code)?.id),
            department_id: Some(self.department(&key.department_code)?.id),
            room_number: Some(key.room_number.clone()),
            index: Some(key.index),
        })
    }
}

#[derive(Default)]
struct ResolvedLocation {
    building_id: Option<i64>,
    department_id: Option<i64>,
    room_number: Option<String>,
    index: Option<i64>,
}

impl ResolvedLocation {
    fn as_location(&self) -> EndpointLocation<'_> {
        EndpointLocation {
            building_id: self.building_id,
            department_id: self.department_id,
            room_number: self.room_number.as_deref(),
            index: self.index,
        }
    }
}

fn normalize_code(code: &str, kind: &'static str) -> Result<String, ValidationError> {
    let code = code.trim().to_uppercase();
    if code.is_empty() {
        return Err(ValidationError::EmptyCode { kind });
    }
    Ok(code)
}

fn missing_row() -> DatabaseError {
    DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows)
}

fn get_or_create<T>(
    find: impl Fn() -> Result<Option<T>, DatabaseError>,
    insert: impl FnOnce() -> Result<bool, DatabaseError>,
) -> Result<T, DatabaseError> {
    if let Some(row) = find()? {
        return Ok(row);
    }
    if !insert()? {
        log::debug!("Dimension row was created concurrently, reusing it");
    }
    find()?.ok_or_else(missing_row)
}
