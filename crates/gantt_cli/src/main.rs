//! Command-line front end for the Gantt core.
//!
//! # Responsibility
//! - Apply one mutation request to a database file from a shell.
//! - Print the tree and links as JSON for quick inspection.
//!
//! Logging goes to files only when `GANTT_LOG_DIR` is set;
//! `GANTT_LOG_LEVEL` overrides the build default.

use gantt_core::db::open_db;
use gantt_core::{core_version, init_logging_from_env, HierarchyService, MutationRequest, TaskId};
use serde_json::json;
use std::error::Error;
use std::process::ExitCode;

const USAGE: &str = "usage:
  gantt_cli version
  gantt_cli <db-path> list
  gantt_cli <db-path> add '<task json>'
  gantt_cli <db-path> mutate <task-id> '<mutation json>'";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("event=cli_run module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    init_logging_from_env()?;
    log::debug!("event=cli_run module=cli status=start args={}", args.len());

    match args {
        [command] if command == "version" => {
            println!("gantt_core version={}", core_version());
            Ok(())
        }
        [db_path, command] if command == "list" => {
            let conn = open_db(db_path)?;
            let service = HierarchyService::try_new(&conn)?;
            let body = json!({
                "tasks": service.list_tasks()?,
                "links": service.list_links()?,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        [db_path, command, payload] if command == "add" => {
            let conn = open_db(db_path)?;
            let service = HierarchyService::try_new(&conn)?;
            let update = MutationRequest::from_json(payload)?.task_update();
            let id = service.add_task(&update)?;
            println!("{}", json!({ "id": id, "action": "inserted" }));
            Ok(())
        }
        [db_path, command, task_id, payload] if command == "mutate" => {
            let task_id: TaskId = task_id
                .trim()
                .parse()
                .map_err(|_| format!("task id must be an integer, got `{task_id}`"))?;
            let conn = open_db(db_path)?;
            let service = HierarchyService::try_new(&conn)?;
            let response = service.handle_request(task_id, payload)?;
            println!("{}", serde_json::to_string(&response)?);
            Ok(())
        }
        _ => Err(USAGE.into()),
    }
}
