use std::path::Path;

use charge_recorder::adapters::db::{
    close_open_session, insert_session, open_connection, run_migrations, schema_version,
};
use charge_recorder::domain::models::{NewChargingSession, SessionClosure};
use charge_recorder::domain::session_state::{Clock, SystemClock, TimestampMs};

const TEMPLATE_DB_PATH: &str = "./data/charge_recorder_test.db";
const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 24 * HOUR_MS;

fn main() {
    if let Err(error) = run() {
        eprintln!("failed to create test db: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut path = TEMPLATE_DB_PATH.to_string();
    let mut force = false;
    let mut seed = false;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--path" => {
                let Some(value) = args.get(index + 1) else {
                    return Err("--path requires a value".to_string());
                };
                path = value.clone();
                index += 2;
            }
            "--force" => {
                force = true;
                index += 1;
            }
            "--seed" => {
                seed = true;
                index += 1;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }

    // unit tests copy the template and expect it empty
    if seed && path == TEMPLATE_DB_PATH {
        return Err("--seed requires --path pointing somewhere other than the test template".to_string());
    }

    let path_ref = Path::new(&path);
    if let Some(parent) = path_ref.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|error| format!("failed to create parent directory: {error}"))?;
    }

    if force && path_ref.exists() {
        std::fs::remove_file(path_ref)
            .map_err(|error| format!("failed to remove existing db file: {error}"))?;
    }

    let mut connection = open_connection(&path).map_err(|error| error.to_string())?;
    run_migrations(&mut connection).map_err(|error| error.to_string())?;
    let version = schema_version(&connection).map_err(|error| error.to_string())?;

    println!("created/updated test db at: {path}");
    println!("schema version: {version}");

    if seed {
        let inserted = seed_sessions(&connection).map_err(|error| error.to_string())?;
        println!("seeded sessions: {inserted}");
    }

    Ok(())
}

/// Three closed sessions on consecutive days plus one still open.
fn seed_sessions(
    connection: &rusqlite::Connection,
) -> Result<usize, charge_recorder::adapters::db::DbError> {
    let now = SystemClock.now().0;
    let readings = [(18_u8, Some(82_u8)), (25, Some(90)), (40, Some(75)), (55, None)];

    for (offset, (start, end)) in readings.iter().enumerate() {
        let start_time = TimestampMs(now - (readings.len() - offset) as i64 * DAY_MS);
        let session = insert_session(
            connection,
            &NewChargingSession {
                start_percentage: *start,
                start_time,
            },
        )?;

        if let Some(end) = end {
            close_open_session(
                connection,
                &SessionClosure {
                    session_id: session.id,
                    end_percentage: *end,
                    end_time: TimestampMs(start_time.0 + 3 * HOUR_MS),
                },
            )?;
        }
    }

    Ok(readings.len())
}

fn print_help() {
    println!("create_test_db");
    println!();
    println!("Usage:");
    println!("  cargo run --bin create_test_db -- [--path <file>] [--force] [--seed]");
    println!();
    println!("Options:");
    println!("  --path <file>   target sqlite file (default: ./data/charge_recorder_test.db)");
    println!("  --force         delete existing file before creating");
    println!("  --seed          insert a few demo charging sessions (requires --path)");
}
