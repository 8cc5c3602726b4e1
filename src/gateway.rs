//! Login and activity CRUD expressed as row operations on the sheet store.
//!
//! Employees live in one shared table (A = name, B = id). Each employee's
//! activities live in their own table, see [`activity_table`]. Records are
//! addressed by physical row number, which shifts whenever a row above is
//! deleted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::record::{
    self, activity_table, ActivityFields, ActivityRecord, Employee, FIRST_DATA_ROW,
    LAST_ACTIVITY_COLUMN, LAST_EMPLOYEE_COLUMN,
};
use crate::sheets::{A1Range, SheetStore, StoreError};

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Employee ID `{0}` not found")]
    EmployeeNotFound(String),
    #[error("No activity table for employee `{0}`")]
    TableNotFound(String),
    #[error("Row {0} is not an activity row")]
    InvalidRow(u32),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Login {
    pub employee: Employee,
    pub records: Vec<ActivityRecord>,
}

#[derive(Clone)]
pub struct ActivityGateway {
    store: Arc<dyn SheetStore>,
    employee_table: String,
}

impl ActivityGateway {
    pub fn new(store: Arc<dyn SheetStore>, employee_table: impl Into<String>) -> Self {
        ActivityGateway {
            store,
            employee_table: employee_table.into(),
        }
    }

    pub async fn authenticate(&self, employee_id: &str) -> GatewayResult<Login> {
        let employee = self.find_employee(employee_id).await?;
        let records = self.list_records(employee_id).await?;
        info!(employee_id, records = records.len(), "employee logged in");

        Ok(Login { employee, records })
    }

    pub async fn find_employee(&self, employee_id: &str) -> GatewayResult<Employee> {
        let range = A1Range::columns(&self.employee_table, 0, LAST_EMPLOYEE_COLUMN);
        let rows = self.store.get_range(&range).await?;

        record::find_employee(&rows, employee_id)
            .ok_or_else(|| GatewayError::EmployeeNotFound(employee_id.to_string()))
    }

    /// Records of an employee; a missing table means no records.
    pub async fn list_records(&self, employee_id: &str) -> GatewayResult<Vec<ActivityRecord>> {
        match self.store.get_range(&activity_range(employee_id)).await {
            Ok(rows) => Ok(record::records_from_rows(&rows)),
            Err(StoreError::UnknownTable(table)) => {
                debug!(%table, "no activity table yet");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes into the first blank row if there is one, else appends.
    pub async fn create_record(
        &self,
        employee_id: &str,
        fields: ActivityFields,
    ) -> GatewayResult<Vec<ActivityRecord>> {
        let table = activity_table(employee_id);
        let range = activity_range(employee_id);
        let rows = self.store.get_range(&range).await?;

        match record::first_blank_slot(&rows) {
            Some(row) => {
                debug!(%table, row, "reusing blank row");
                let target = A1Range::row(&table, row, 0, LAST_ACTIVITY_COLUMN);
                self.store
                    .update_range(&target, vec![fields.into_row()])
                    .await?;
            }
            None => {
                debug!(%table, after = rows.len(), "appending row");
                self.store.append_row(&range, fields.into_row()).await?;
            }
        }
        info!(%table, "activity created");

        self.list_records(employee_id).await
    }

    /// Overwrites row `row_number`. The row is not checked against the
    /// current table contents.
    pub async fn update_record(
        &self,
        employee_id: &str,
        row_number: u32,
        fields: ActivityFields,
    ) -> GatewayResult<Vec<ActivityRecord>> {
        check_row(row_number)?;

        let table = activity_table(employee_id);
        let target = A1Range::row(&table, row_number, 0, LAST_ACTIVITY_COLUMN);
        self.store
            .update_range(&target, vec![fields.into_row()])
            .await?;
        info!(%table, row_number, "activity updated");

        self.list_records(employee_id).await
    }

    /// Deletes the physical row; every record below moves up by one.
    pub async fn delete_record(
        &self,
        employee_id: &str,
        row_number: u32,
    ) -> GatewayResult<Vec<ActivityRecord>> {
        check_row(row_number)?;

        let table = activity_table(employee_id);
        let table_id = self
            .store
            .list_tables()
            .await?
            .into_iter()
            .find(|info| info.title == table)
            .map(|info| info.id)
            .ok_or_else(|| GatewayError::TableNotFound(employee_id.to_string()))?;

        self.store
            .delete_rows(table_id, row_number - 1, row_number)
            .await?;
        info!(%table, row_number, "activity deleted");

        self.list_records(employee_id).await
    }
}

fn activity_range(employee_id: &str) -> A1Range {
    A1Range::columns(&activity_table(employee_id), 0, LAST_ACTIVITY_COLUMN)
}

fn check_row(row_number: u32) -> GatewayResult<()> {
    if row_number < FIRST_DATA_ROW {
        return Err(GatewayError::InvalidRow(row_number));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sheets::memory::{grid, MemoryStore};
    use anyhow::Result;
    use fake::{Fake, Faker};

    pub(crate) const EMPLOYEES: &str = "Employees";

    const HEADER: &[&str] = &["Date", "Worksite", "Task", "Start", "End", "Hours", "Km", "Notes"];

    /// Employees 7 (with four activities) and 8 (no table).
    pub(crate) fn seeded_store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.add_table(
            EMPLOYEES,
            grid(&[&["name", "id"], &["Ada Rossi", "7"], &["Bruno Neri", "8"]]),
        );
        store.add_table(
            "Activity-7",
            grid(&[
                HEADER,
                &["2024-03-01", "Depot", "Loading", "08:00", "12:00", "4", "10", ""],
                &["2024-03-02", "Bridge", "Welding", "07:00", "15:00", "8", "32", "rain"],
                &["2024-03-03", "Depot", "Sorting", "09:00", "11:00", "2", "10", ""],
                &["2024-03-04", "School", "Painting", "13:00", "17:30", "4.5", "5", ""],
            ]),
        );
        Arc::new(store)
    }

    fn gateway(store: Arc<MemoryStore>) -> ActivityGateway {
        ActivityGateway::new(store, EMPLOYEES)
    }

    fn fields(date: &str, worksite: &str) -> ActivityFields {
        ActivityFields {
            date: date.to_string(),
            worksite: worksite.to_string(),
            ..Faker.fake::<ActivityFields>()
        }
    }

    #[tokio::test]
    async fn test_authenticate() -> Result<()> {
        let login = gateway(seeded_store()).authenticate("7").await?;

        assert_eq!(login.employee.name, "Ada Rossi");
        assert_eq!(login.employee.id, "7");
        assert_eq!(login.records.len(), 4);

        Ok(())
    }

    #[tokio::test]
    async fn test_authenticate_unknown_id() {
        let result = gateway(seeded_store()).authenticate("99").await;
        assert!(matches!(result, Err(GatewayError::EmployeeNotFound(id)) if id == "99"));
    }

    #[tokio::test]
    async fn test_authenticate_without_table() -> Result<()> {
        let login = gateway(seeded_store()).authenticate("8").await?;

        assert_eq!(login.employee.name, "Bruno Neri");
        assert!(login.records.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_list_records_row_numbers() -> Result<()> {
        let store = seeded_store();
        store.add_table(
            "Activity-3",
            grid(&[
                HEADER,
                &["2024-03-01", "Depot"],
                &["", "left", "over"],
                &["2024-03-05", "Bridge"],
            ]),
        );

        let records = gateway(store).list_records("3").await?;
        let rows: Vec<u32> = records.iter().map(|r| r.row_number).collect();
        assert_eq!(rows, vec![2, 4]);
        assert_eq!(records[1].fields.worksite, "Bridge");

        Ok(())
    }

    #[tokio::test]
    async fn test_create_reuses_blank_row() -> Result<()> {
        let store = seeded_store();
        store.add_table(
            "Activity-3",
            grid(&[
                HEADER,
                &["2024-03-01", "Depot", "Loading"],
                &["", "", "", "", "", "", "", "", ""],
                &["2024-03-05", "Bridge", "Welding"],
            ]),
        );

        let records = gateway(store.clone())
            .create_record("3", fields("2024-03-06", "School"))
            .await?;

        let created = records.iter().find(|r| r.fields.worksite == "School").unwrap();
        assert_eq!(created.row_number, 3);
        assert_eq!(records.len(), 3);
        assert_eq!(store.rows("Activity-3").unwrap().len(), 4);

        Ok(())
    }

    #[tokio::test]
    async fn test_create_reuses_trailing_blank_row() -> Result<()> {
        let store = seeded_store();
        store.add_table(
            "Activity-3",
            grid(&[HEADER, &["2024-03-01", "Depot"], &["", "left over"]]),
        );

        let records = gateway(store.clone())
            .create_record("3", fields("2024-03-06", "School"))
            .await?;

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].row_number, 3);
        assert_eq!(records[1].fields.worksite, "School");
        assert_eq!(store.rows("Activity-3").unwrap().len(), 3);

        Ok(())
    }

    #[tokio::test]
    async fn test_create_appends_after_empty_trailing_row() -> Result<()> {
        let store = seeded_store();
        store.add_table(
            "Activity-3",
            grid(&[HEADER, &["2024-03-01", "Depot"], &[""]]),
        );

        let records = gateway(store)
            .create_record("3", fields("2024-03-06", "School"))
            .await?;

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].row_number, 3);
        assert_eq!(records[1].fields.worksite, "School");

        Ok(())
    }

    #[tokio::test]
    async fn test_whitespace_date_is_a_record() -> Result<()> {
        let store = seeded_store();
        store.add_table(
            "Activity-3",
            grid(&[HEADER, &[" ", "Depot", "Real work"]]),
        );
        let gateway = gateway(store.clone());

        let listed = gateway.list_records("3").await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].row_number, 2);
        assert_eq!(listed[0].fields.task, "Real work");

        let records = gateway
            .create_record("3", fields("2024-03-06", "School"))
            .await?;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fields.task, "Real work");
        assert_eq!(records[1].row_number, 3);
        assert_eq!(store.rows("Activity-3").unwrap()[1][2], "Real work");

        Ok(())
    }

    #[tokio::test]
    async fn test_create_appends_when_full() -> Result<()> {
        let store = seeded_store();
        let records = gateway(store.clone())
            .create_record("7", fields("2024-03-05", "Harbour"))
            .await?;

        assert_eq!(records.len(), 5);
        assert_eq!(records[4].row_number, 6);
        assert_eq!(records[4].fields.worksite, "Harbour");
        assert_eq!(store.rows("Activity-7").unwrap()[5][1], "Harbour");

        Ok(())
    }

    #[tokio::test]
    async fn test_create_without_table_fails() {
        let result = gateway(seeded_store())
            .create_record("8", fields("2024-03-05", "Harbour"))
            .await;
        assert!(matches!(result, Err(GatewayError::Store(StoreError::UnknownTable(_)))));
    }

    #[tokio::test]
    async fn test_update_record() -> Result<()> {
        let store = seeded_store();
        let new_fields = fields("2024-03-02", "Harbour");

        let records = gateway(store.clone())
            .update_record("7", 3, new_fields.clone())
            .await?;

        assert_eq!(records.len(), 4);
        assert_eq!(records[1].row_number, 3);
        assert_eq!(records[1].fields, new_fields);
        assert_eq!(records[0].fields.worksite, "Depot");

        Ok(())
    }

    #[tokio::test]
    async fn test_update_rejects_header_row() {
        let store = seeded_store();
        for row in [0, 1] {
            let result = gateway(store.clone())
                .update_record("7", row, fields("2024-03-02", "Harbour"))
                .await;
            assert!(matches!(result, Err(GatewayError::InvalidRow(r)) if r == row));
        }
        assert_eq!(store.rows("Activity-7").unwrap()[0][0], "Date");
    }

    #[tokio::test]
    async fn test_update_far_row_is_rejected() {
        let store = seeded_store();
        let result = gateway(store.clone())
            .update_record("7", u32::MAX, fields("2024-03-02", "Harbour"))
            .await;

        assert!(matches!(result, Err(GatewayError::Store(StoreError::InvalidRange(_)))));
        assert_eq!(store.rows("Activity-7").unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_delete_renumbers_following_rows() -> Result<()> {
        let records = gateway(seeded_store()).delete_record("7", 3).await?;

        assert_eq!(records.len(), 3);
        assert_eq!(records[1].fields.task, "Sorting");
        assert_eq!(records[1].row_number, 3);
        assert_eq!(records[2].fields.task, "Painting");
        assert_eq!(records[2].row_number, 4);

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_without_table() {
        let result = gateway(seeded_store()).delete_record("8", 2).await;
        assert!(matches!(result, Err(GatewayError::TableNotFound(id)) if id == "8"));
    }
}
