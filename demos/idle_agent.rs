//! A minimal agent: buys one gatherer, collects whenever it stands on a
//! resource, and otherwise just ends every phase.
//!
//! Build it and hand the binary to the host:
//!
//! ```text
//! cargo build --example idle_agent
//! skirmish run target/debug/examples/idle_agent target/debug/examples/idle_agent
//! ```

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::TcpStream;

use serde_json::{json, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let port: u16 = std::env::args()
        .last()
        .ok_or("missing port argument")?
        .parse()?;
    let stream = TcpStream::connect(("127.0.0.1", port))?;
    let mut writer = BufWriter::new(stream.try_clone()?);
    let reader = BufReader::new(stream);

    let mut me = None;
    let mut resources = Vec::new();
    let mut bought = false;

    for line in reader.lines() {
        let message: Value = serde_json::from_str(&line?)?;
        let mut replies = Vec::new();

        match message["type"].as_str() {
            Some("initialize") => {
                me = message["player_id"].as_u64();
                resources = resource_cells(&message["map"]);
            }
            Some("part_start") => {
                let turn = &message["turn"];
                let part = message["part"].as_str().unwrap_or_default();
                let units = message["state"]["units"].as_array().cloned().unwrap_or_default();
                let mine = units.iter().filter(|u| u["owner"].as_u64() == me);

                match part {
                    "collect" => {
                        for unit in mine.filter(|u| resources.contains(&u["position"])) {
                            replies.push(json!({"command": "collect", "turn": turn, "unit": unit["id"]}));
                        }
                    }
                    "spawn" if !bought => {
                        bought = true;
                        replies.push(json!({"command": "spawn", "turn": turn, "unit_type": "gatherer"}));
                    }
                    _ => {}
                }
                replies.push(json!({"command": format!("end_{part}"), "turn": turn}));
            }
            Some("end_game") => break,
            _ => {}
        }

        for reply in replies {
            serde_json::to_writer(&mut writer, &reply)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    Ok(())
}

/// Wood and metal cells of a column-major terrain grid, as `[x, y]` values.
fn resource_cells(map: &Value) -> Vec<Value> {
    let mut cells = Vec::new();
    for (x, column) in map.as_array().into_iter().flatten().enumerate() {
        for (y, code) in column.as_array().into_iter().flatten().enumerate() {
            if matches!(code.as_u64(), Some(3 | 4)) {
                cells.push(json!([x, y]));
            }
        }
    }
    cells
}
