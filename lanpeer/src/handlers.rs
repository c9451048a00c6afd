//! Built-in paths served by `lanpeer respond`

use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::peer::PeerTable;
use crate::rpc::Responder;

/// Paths registered by [`register_builtin`]
pub const BUILTIN_PATHS: [&str; 4] = ["echo", "greet", "peers", "time"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GreetRequest {
    Name(String),
    Named { name: String },
}

#[derive(Debug, Serialize)]
struct PeerView {
    id: String,
    address: String,
    last_seen_ms: u64,
}

/// Register `echo`, `greet`, `time` and `peers` on `responder`
pub fn register_builtin(responder: &Responder, node_name: &str) {
    responder.on("echo", Ok);

    let name = node_name.to_string();
    responder.on("greet", move |data| greet(&name, data));

    let name = node_name.to_string();
    responder.on("time", move |_| {
        Ok(json!({
            "node": name,
            "time": chrono::Utc::now().to_rfc3339(),
        }))
    });

    let peers = Arc::clone(responder.discovery().peers());
    responder.on("peers", move |_| list_peers(&peers));
}

fn greet(node_name: &str, data: Value) -> anyhow::Result<Value> {
    let request: GreetRequest =
        serde_json::from_value(data).context("greet expects a name or {\"name\": ...}")?;
    let who = match request {
        GreetRequest::Name(name) | GreetRequest::Named { name } => name,
    };
    if who.trim().is_empty() {
        anyhow::bail!("greet needs a non-empty name");
    }
    Ok(json!({ "greeting": format!("Hello, {}! This is {}.", who, node_name) }))
}

fn list_peers(peers: &PeerTable) -> anyhow::Result<Value> {
    let view: Vec<PeerView> = peers
        .all_peers()
        .into_iter()
        .map(|p| PeerView {
            last_seen_ms: p.last_seen.elapsed().as_millis() as u64,
            id: p.id,
            address: p.address,
        })
        .collect();
    Ok(serde_json::to_value(view)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greet_accepts_string_and_object() {
        let by_string = greet("kitchen", json!("ada")).unwrap();
        assert_eq!(by_string["greeting"], "Hello, ada! This is kitchen.");

        let by_object = greet("kitchen", json!({"name": "bob"})).unwrap();
        assert_eq!(by_object["greeting"], "Hello, bob! This is kitchen.");
    }

    #[test]
    fn test_greet_rejects_missing_name() {
        let err = greet("kitchen", Value::Null).unwrap_err();
        assert!(format!("{:#}", err).contains("greet expects a name"));

        let err = greet("kitchen", json!("  ")).unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }

    #[test]
    fn test_list_peers() {
        let table = PeerTable::new();
        table.upsert("b", "10.0.0.2:1024");
        table.upsert("a", "10.0.0.1:1024");

        let listed = list_peers(&table).unwrap();
        let ids: Vec<&str> = listed
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(listed[0]["address"], "10.0.0.1:1024");
    }
}
