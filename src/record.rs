use anyhow::{anyhow, Result};
use chrono::NaiveTime;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Rows occupied by the header at the top of every table.
pub const HEADER_ROWS: u32 = 1;
/// 1-based row number of the first data row.
pub const FIRST_DATA_ROW: u32 = HEADER_ROWS + 1;
/// Activity tables are read as columns A..=I. Column I is reserved.
pub const LAST_ACTIVITY_COLUMN: u32 = 8;
/// Employee table: A = name, B = id.
pub const LAST_EMPLOYEE_COLUMN: u32 = 1;

const TIME_FORMATS: [&str; 2] = ["%H:%M", "%H%M"];

/// Name of the table holding an employee's activities.
pub fn activity_table(employee_id: &str) -> String {
    format!("Activity-{}", employee_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub name: String,
    pub id: String,
}

impl Employee {
    fn from_row(row: &[String]) -> Self {
        Employee {
            name: cell(row, 0),
            id: cell(row, 1),
        }
    }
}

/// Looks up `id` in the rows of the employee table, header excluded.
pub fn find_employee(rows: &[Vec<String>], id: &str) -> Option<Employee> {
    rows.iter()
        .skip(HEADER_ROWS as usize)
        .find(|row| row.get(1).map(String::as_str) == Some(id))
        .map(|row| Employee::from_row(row))
}

/// The eight writable columns of an activity row, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(test, derive(fake::Dummy))]
#[serde(rename_all = "camelCase")]
pub struct ActivityFields {
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub worksite: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub task: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_time: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub end_time: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub total_hours: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub km: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub notes: String,
}

impl ActivityFields {
    pub fn from_row(row: &[String]) -> Self {
        ActivityFields {
            date: cell(row, 0),
            worksite: cell(row, 1),
            task: cell(row, 2),
            start_time: cell(row, 3),
            end_time: cell(row, 4),
            total_hours: cell(row, 5),
            km: cell(row, 6),
            notes: cell(row, 7),
        }
    }

    pub fn into_row(self) -> Vec<String> {
        vec![
            self.date,
            self.worksite,
            self.task,
            self.start_time,
            self.end_time,
            self.total_hours,
            self.km,
            self.notes,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    #[serde(flatten)]
    pub fields: ActivityFields,
    pub row_number: u32,
}

/// Maps the rows of an activity table (header included) to records.
///
/// Row numbers are physical: the first data row is `FIRST_DATA_ROW`. Rows
/// with a blank date are free slots and are left out.
pub fn records_from_rows(rows: &[Vec<String>]) -> Vec<ActivityRecord> {
    rows.iter()
        .enumerate()
        .skip(HEADER_ROWS as usize)
        .filter(|(_, row)| !is_blank_slot(row))
        .map(|(index, row)| ActivityRecord {
            fields: ActivityFields::from_row(row),
            row_number: index as u32 + 1,
        })
        .collect()
}

/// Row number of the first data row whose first column is blank.
pub fn first_blank_slot(rows: &[Vec<String>]) -> Option<u32> {
    rows.iter()
        .enumerate()
        .skip(HEADER_ROWS as usize)
        .find(|(_, row)| is_blank_slot(row))
        .map(|(index, _)| index as u32 + 1)
}

fn is_blank_slot(row: &[String]) -> bool {
    row.first().map_or(true, |date| date.is_empty())
}

fn cell(row: &[String], index: usize) -> String {
    row.get(index).cloned().unwrap_or_default()
}

/// Accepts a JSON string, number or bool (stored as text). `null` is empty.
pub fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Text(String),
        Number(serde_json::Number),
        Flag(bool),
    }

    Ok(match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Text(text)) => text,
        Some(Lenient::Number(number)) => number.to_string(),
        Some(Lenient::Flag(flag)) => flag.to_string(),
        None => String::new(),
    })
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value, format).ok())
        .ok_or_else(|| anyhow!("Invalid time `{}`, expected HH:MM", value))
}

/// Hours between two wall-clock times, rounded to two decimals.
///
/// An end time before the start time is taken to be on the next day.
pub fn total_hours(start: &str, end: &str) -> Result<String> {
    let start = parse_time(start)?;
    let end = parse_time(end)?;

    let mut minutes = end.signed_duration_since(start).num_minutes();
    if minutes < 0 {
        minutes += 24 * 60;
    }

    let hours = (minutes as f64 / 60.0 * 100.0).round() / 100.0;
    Ok(hours.to_string())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorksiteTotals {
    pub entries: usize,
    pub hours: f64,
    pub km: f64,
}

/// Sums hours and km per worksite, keeping worksites in first-seen order.
pub fn summarize_by_worksite(records: &[ActivityRecord]) -> IndexMap<String, WorksiteTotals> {
    let mut totals: IndexMap<String, WorksiteTotals> = IndexMap::new();
    for record in records {
        let entry = totals.entry(record.fields.worksite.clone()).or_default();
        entry.entries += 1;
        entry.hours += parse_amount(&record.fields.total_hours);
        entry.km += parse_amount(&record.fields.km);
    }
    totals
}

// Sheets written by hand often use a decimal comma.
fn parse_amount(value: &str) -> f64 {
    value.trim().replace(',', ".").parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::{Fake, Faker};

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_records_skip_header_and_blank_dates() {
        let rows = vec![
            row(&["Date", "Worksite", "Task", "Start", "End", "Hours", "Km", "Notes"]),
            row(&["2024-03-01", "Depot", "Loading", "08:00", "12:00", "4", "12", ""]),
            row(&["", "Leftover", "", "", "", "", "", ""]),
            vec![],
            row(&["2024-03-02", "Bridge", "Welding"]),
            row(&[" ", "Yard"]),
        ];

        let records = records_from_rows(&rows);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].row_number, 2);
        assert_eq!(records[0].fields.worksite, "Depot");
        assert_eq!(records[1].row_number, 5);
        assert_eq!(records[1].fields.task, "Welding");
        assert_eq!(records[1].fields.notes, "");
        assert_eq!(records[2].row_number, 6);
        assert_eq!(records[2].fields.date, " ");
    }

    #[test]
    fn test_header_only_table_has_no_records() {
        let rows = vec![row(&["Date", "Worksite"])];
        assert!(records_from_rows(&rows).is_empty());
        assert!(records_from_rows(&[]).is_empty());
    }

    #[test]
    fn test_reserved_column_is_ignored() {
        let rows = vec![
            row(&["Date"]),
            row(&["2024-03-01", "a", "b", "c", "d", "e", "f", "g", "reserved"]),
        ];
        let records = records_from_rows(&rows);
        assert_eq!(records[0].fields.clone().into_row().len(), 8);
        assert_eq!(records[0].fields.notes, "g");
    }

    #[test]
    fn test_first_blank_slot() {
        let rows = vec![
            row(&[""]),
            row(&["2024-03-01"]),
            row(&["  ", "x"]),
            vec![],
        ];
        assert_eq!(first_blank_slot(&rows), Some(4));

        let full = vec![row(&["Date"]), row(&["2024-03-01"])];
        assert_eq!(first_blank_slot(&full), None);
    }

    #[test]
    fn test_find_employee_skips_header() {
        let rows = vec![
            row(&["name", "id"]),
            row(&["Ada Rossi", "17"]),
            row(&["Bruno Neri", "42"]),
        ];
        let found = find_employee(&rows, "42").unwrap();
        assert_eq!(found.name, "Bruno Neri");
        assert!(find_employee(&rows, "id").is_none());
        assert!(find_employee(&rows, "4").is_none());
    }

    #[test]
    fn test_fields_row_order() {
        let fields: ActivityFields = Faker.fake();
        let row = fields.clone().into_row();
        assert_eq!(row[0], fields.date);
        assert_eq!(row[3], fields.start_time);
        assert_eq!(row[5], fields.total_hours);
        assert_eq!(row[7], fields.notes);
        assert_eq!(ActivityFields::from_row(&row), fields);
    }

    #[test]
    fn test_lenient_fields_from_json() {
        let fields: ActivityFields = serde_json::from_str(
            r#"{"date":"2024-03-01","totalHours":7.5,"km":12,"notes":null}"#,
        )
        .unwrap();
        assert_eq!(fields.total_hours, "7.5");
        assert_eq!(fields.km, "12");
        assert_eq!(fields.notes, "");
        assert_eq!(fields.worksite, "");
    }

    #[test]
    fn test_record_json_shape() {
        let record = ActivityRecord {
            fields: ActivityFields {
                date: "2024-03-01".to_string(),
                start_time: "08:00".to_string(),
                ..Default::default()
            },
            row_number: 4,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["rowNumber"], 4);
        assert_eq!(json["startTime"], "08:00");
        assert_eq!(json["totalHours"], "");
    }

    #[test]
    fn test_total_hours() {
        assert_eq!(total_hours("08:00", "16:30").unwrap(), "8.5");
        assert_eq!(total_hours("0800", "1220").unwrap(), "4.33");
        assert_eq!(total_hours("22:00", "02:00").unwrap(), "4");
        assert!(total_hours("8am", "16:00").is_err());
    }

    #[test]
    fn test_summarize_by_worksite() {
        let record = |worksite: &str, hours: &str, km: &str| ActivityRecord {
            fields: ActivityFields {
                date: "2024-03-01".to_string(),
                worksite: worksite.to_string(),
                total_hours: hours.to_string(),
                km: km.to_string(),
                ..Default::default()
            },
            row_number: 2,
        };
        let records = vec![
            record("Depot", "4", "10"),
            record("Bridge", "2,5", ""),
            record("Depot", "3.5", "5"),
        ];

        let totals = summarize_by_worksite(&records);
        let sites: Vec<&String> = totals.keys().collect();
        assert_eq!(sites, vec!["Depot", "Bridge"]);
        assert_eq!(totals["Depot"].entries, 2);
        assert_eq!(totals["Depot"].hours, 7.5);
        assert_eq!(totals["Depot"].km, 15.0);
        assert_eq!(totals["Bridge"].hours, 2.5);
    }
}
