//! Piped-mode session tests: one statement or meta-command per line.

mod common;

use std::io::Cursor;

use serde_json::json;

use anql_cli::config::OutputFormat;
use anql_cli::logging::LogControl;
use anql_cli::session::{Session, SessionState};

use common::{completed, runner, ScriptedTransport};

fn session(transport: ScriptedTransport, scratch: &std::path::Path) -> Session<ScriptedTransport, Vec<u8>> {
    let state = SessionState {
        silent: true,
        ..SessionState::default()
    };
    Session::new(runner(transport, scratch), state, LogControl::noop(), false, Vec::new())
}

fn output(session: &Session<ScriptedTransport, Vec<u8>>) -> String {
    String::from_utf8(session.output().clone()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_piped_statements_until_exit() {
    let scratch = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new(vec![completed()], "{\"name\":\"a, b\",\"n\":2}\n");
    let mut session = session(transport, scratch.path());

    let input = ".format csv\n\nSELECT name, n FROM t;\nquit\nSELECT 2;\n";
    session.run_piped(Cursor::new(input)).await.unwrap();

    let text = output(&session);
    assert!(text.contains("Output format set to: csv"));
    assert!(text.contains("name,n\n\"a, b\",2\n"), "{text}");
    assert_eq!(session.state().format, OutputFormat::Csv);

    // trailing ';' stripped, nothing after the exit command runs
    let transport = session_transport(&session);
    assert_eq!(transport.submitted_sql(), vec!["SELECT name, n FROM t"]);
}

#[tokio::test(start_paused = true)]
async fn test_window_commands() {
    let scratch = tempfile::tempdir().unwrap();
    let mut session = session(ScriptedTransport::new(vec![completed()], ""), scratch.path());

    let input = ".window 1640995200 1641081600\n.window bad now\n.window clear\n.window show\n";
    session.run_piped(Cursor::new(input)).await.unwrap();

    let text = output(&session);
    assert!(text.contains("Time window set: from 1640995200 to 1641081600"));
    assert!(text.contains("  From: 1640995200 ("));
    assert!(text.contains("Time window cleared."));
    assert!(text.ends_with("No time window set (queries will use default time range)\n"));
    assert!(session.state().window.is_unset());
}

#[tokio::test(start_paused = true)]
async fn test_empty_result() {
    let scratch = tempfile::tempdir().unwrap();
    let mut session = session(ScriptedTransport::new(vec![completed()], ""), scratch.path());

    session.run_piped(Cursor::new("SELECT 1 WHERE false;\n")).await.unwrap();
    assert_eq!(output(&session), "No results found.\n");
}

#[tokio::test(start_paused = true)]
async fn test_tables_and_schema() {
    let scratch = tempfile::tempdir().unwrap();
    let mut transport = ScriptedTransport::new(vec![completed()], "");
    transport.schema = json!({
        "tables": [
            {"name": "SIM_STATS", "columns": [{"name": "imsi", "type": "VARCHAR"}]},
            {"name": "HARVEST_DATA", "columns": [{"name": "ts", "data_type": "BIGINT"}]}
        ]
    });
    let mut session = session(transport, scratch.path());

    session
        .run_piped(Cursor::new(".tables\n.schema harvest_data;\n"))
        .await
        .unwrap();

    let text = output(&session);
    let listing = text.find("HARVEST_DATA").unwrap();
    assert!(listing < text.find("SIM_STATS").unwrap());
    assert!(text.contains("(2 tables)"));
    assert!(text.contains("Schema for table: HARVEST_DATA"));
    assert!(text.contains("BIGINT"));
    assert!(text.contains("(1 columns)"));
}

#[tokio::test(start_paused = true)]
async fn test_ask_runs_suggested_query() {
    let scratch = tempfile::tempdir().unwrap();
    let mut transport = ScriptedTransport::new(vec![completed()], "{\"total\":7}\n");
    transport.assistant = json!({
        "id": "a-1",
        "sql_query": "SELECT COUNT(*) AS total FROM sim_stats",
        "context": "Counts all rows."
    });
    let mut session = session(transport, scratch.path());

    session
        .run_piped(Cursor::new(".format json\n.ask how many rows?\n"))
        .await
        .unwrap();

    let text = output(&session);
    assert!(text.contains("\nCounts all rows.\n"));
    assert!(text.contains("Suggested SQL:\nSELECT COUNT(*) AS total FROM sim_stats"));
    assert!(text.contains("\"total\": 7"));
    assert!(session.state().history.is_empty());
}

fn session_transport(session: &Session<ScriptedTransport, Vec<u8>>) -> &ScriptedTransport {
    session.runner().api().transport()
}
