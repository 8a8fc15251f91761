use std::time::Duration;

use anyhow::Result;

use deckgen_lib::task::StatusRecord;

use crate::app::App;
use crate::render::terminal::{paint, render_status, Color};
use crate::OutputFormat;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub fn run(
    app: &App,
    task_id: &str,
    watch: bool,
    stale_after: Duration,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let task = app.find_task(task_id)?;

    if !watch {
        let record = app.status(&task)?;
        print_record(&record, stale_after, format, use_color)?;
        return Ok(());
    }

    let mut last: Option<StatusRecord> = None;
    loop {
        let record = app.status(&task)?;
        let changed = last
            .as_ref()
            .map_or(true, |prev| prev.state != record.state || prev.progress != record.progress);
        if changed {
            print_record(&record, stale_after, format, use_color)?;
        }

        let status = record.status();
        if status.is_terminal() || record.is_stale(stale_after) {
            break;
        }
        last = Some(record);
        std::thread::sleep(POLL_INTERVAL);
    }

    Ok(())
}

fn print_record(
    record: &StatusRecord,
    stale_after: Duration,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let stale = record.is_stale(stale_after);
    match format {
        OutputFormat::Json => {
            let mut output = serde_json::to_value(record)?;
            output["stale"] = serde_json::Value::Bool(stale);
            println!("{}", serde_json::to_string(&output)?);
        }
        OutputFormat::Plain => {
            let mut line = render_status(&record.status(), use_color);
            if stale {
                line.push_str(&paint(" (stale, worker may have died)", Color::RED, use_color));
            }
            println!("{}", line);
        }
    }
    Ok(())
}
