// Macros
#[macro_use]
extern crate clap;
#[macro_use]
extern crate prettytable;
#[macro_use]
extern crate anyhow;

// Std
use std::env;

// Crates
use anyhow::{Context, Result};
use clap::{App, Arg};
use dotenv::dotenv;
use http::StatusCode;
use prettytable::{color, Attr, Cell, Row, Table};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

// Local
use fieldsheet::api::{ActivityRequest, EmployeeRequest, MessageReply, RecordsReply};
use fieldsheet::record::{summarize_by_worksite, total_hours};
use fieldsheet::{ActivityFields, ActivityRecord, Login};

const MAX_WIDTH: usize = 20;
const ACTIVITY_VALUES: usize = 7;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let base_url: String = env::var("BASE_URL").context("BASE_URL env var must be set!")?;

    let client = Client::new();

    let matches = App::new("fieldsheet")
        .version(crate_version!())
        .about("Clock in and keep your field timesheet.")
        .arg(
            Arg::with_name("id")
                .short("i")
                .long("id")
                .takes_value(true)
                .value_name("ID")
                .help("Employee ID. Defaults to FIELDSHEET_ID."),
        )
        .arg(
            Arg::with_name("list")
                .short("l")
                .long("list")
                .help("List your activities (the default)."),
        )
        .arg(
            Arg::with_name("add")
                .short("a")
                .long("add")
                .value_names(&["date", "worksite", "task", "start", "end", "km", "notes"])
                .help("Add an activity. Hours are computed from start and end.")
                .takes_value(true)
                .value_delimiter("|"),
        )
        .arg(
            Arg::with_name("edit")
                .short("e")
                .long("edit")
                .value_names(&["row", "date", "worksite", "task", "start", "end", "km", "notes"])
                .help("Replace the activity on a row.")
                .takes_value(true)
                .value_delimiter("|"),
        )
        .arg(
            Arg::with_name("delete")
                .short("d")
                .long("delete")
                .takes_value(true)
                .value_name("row")
                .help("Delete the activity on a row. Rows below move up by one."),
        )
        .arg(
            Arg::with_name("summary")
                .short("s")
                .long("summary")
                .help("Print hours and km per worksite."),
        )
        .get_matches();

    let id = match matches.value_of("id") {
        Some(id) => id.to_string(),
        None => env::var("FIELDSHEET_ID").context("Pass --id or set FIELDSHEET_ID")?,
    };

    if let Some(values) = matches.values_of("add") {
        let fields = activity_fields(&values.collect::<Vec<&str>>())?;
        let request = ActivityRequest { id, fields };

        let url = format!("{}/api/activities", &base_url);
        match send::<RecordsReply>(client.post(&url).json(&request)).await {
            Ok(reply) => print_reply(reply),
            Err(e) => {
                eprintln!("Error adding activity: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    if let Some(values) = matches.values_of("edit") {
        let values: Vec<&str> = values.collect();
        let row = parse_row(values[0])?;
        let fields = activity_fields(&values[1..])?;
        let request = ActivityRequest { id, fields };

        let url = format!("{}/api/activities/{}", &base_url, row);
        match send::<RecordsReply>(client.put(&url).json(&request)).await {
            Ok(reply) => print_reply(reply),
            Err(e) => {
                eprintln!("Error updating row {}: {}", row, e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    if let Some(value) = matches.value_of("delete") {
        let row = parse_row(value)?;
        let request = EmployeeRequest { id };

        let url = format!("{}/api/activities/{}", &base_url, row);
        match send::<RecordsReply>(client.delete(&url).json(&request)).await {
            Ok(reply) => print_reply(reply),
            Err(e) => {
                eprintln!("Error deleting row {}: {}", row, e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let url = format!("{}/api/login", &base_url);
    let login = send::<Login>(client.post(&url).json(&EmployeeRequest { id })).await?;
    println!("{} ({})", login.employee.name, login.employee.id);

    if matches.is_present("summary") {
        summary_table(&login.records).printstd();
    } else {
        records_table(&login.records).printstd();
    }

    Ok(())
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let res = request.send().await?;
    let status = res.status();

    if status.is_success() {
        return Ok(res.json::<T>().await?);
    }

    let message = res
        .json::<MessageReply>()
        .await
        .map(|reply| reply.message)
        .unwrap_or_default();

    match status {
        StatusCode::NOT_FOUND => Err(anyhow!("Not found: {}", message)),
        _ => Err(anyhow!("Status code {}: {}", status, message)),
    }
}

fn activity_fields(values: &[&str]) -> Result<ActivityFields> {
    if values.len() != ACTIVITY_VALUES {
        bail!(
            "Expected {} values separated by '|', got {}",
            ACTIVITY_VALUES,
            values.len()
        );
    }

    Ok(ActivityFields {
        date: values[0].to_string(),
        worksite: values[1].to_string(),
        task: values[2].to_string(),
        start_time: values[3].to_string(),
        end_time: values[4].to_string(),
        total_hours: total_hours(values[3], values[4])?,
        km: values[5].to_string(),
        notes: values[6].to_string(),
    })
}

fn parse_row(value: &str) -> Result<u32> {
    value
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Row must be a number, got '{}'", value))
}

fn print_reply(reply: RecordsReply) {
    println!("{}", reply.message);
    records_table(&reply.records).printstd();
}

fn wrap(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(MAX_WIDTH)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<String>>()
        .join("\n")
}

fn records_table(records: &[ActivityRecord]) -> Table {
    let mut table = Table::new();
    table.add_row(row![Fb => "Row", "Date", "Worksite", "Task", "Start", "End", "Hours", "Km", "Notes"]);

    for (index, record) in records.iter().enumerate() {
        let text_color = if index % 2 == 1 {
            color::MAGENTA
        } else {
            color::WHITE
        };

        let f = &record.fields;
        let values = [
            record.row_number.to_string(),
            f.date.clone(),
            f.worksite.clone(),
            f.task.clone(),
            f.start_time.clone(),
            f.end_time.clone(),
            f.total_hours.clone(),
            f.km.clone(),
            wrap(&f.notes),
        ];
        let cells: Vec<Cell> = values
            .iter()
            .map(|value| Cell::new(value).with_style(Attr::ForegroundColor(text_color)))
            .collect();
        table.add_row(Row::new(cells));
    }
    table
}

fn summary_table(records: &[ActivityRecord]) -> Table {
    let mut table = Table::new();
    table.add_row(row![Fb => "Worksite", "Entries", "Hours", "Km"]);

    let (mut hours, mut km) = (0.0, 0.0);
    for (worksite, totals) in summarize_by_worksite(records) {
        hours += totals.hours;
        km += totals.km;
        table.add_row(row![worksite, totals.entries, totals.hours, totals.km]);
    }
    table.add_row(row![b => "Total", records.len(), hours, km]);
    table
}
