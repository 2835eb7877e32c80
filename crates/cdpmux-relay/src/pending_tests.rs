use super::*;
use serde_json::json;

fn request(client: &str, epoch: u64) -> PendingRequest {
    PendingRequest {
        client_id: Some(client.to_string()),
        client_request_id: json!(1),
        method: "Page.navigate".to_string(),
        epoch,
    }
}

#[test]
fn test_take_removes_entry() {
    let table = PendingTable::new();
    table.insert(1, request("c1", 1));

    let taken = table.take(1);
    assert!(taken.is_some());
    assert!(table.take(1).is_none());
    assert!(table.is_empty());
}

#[test]
fn test_take_unknown_id_is_none() {
    let table = PendingTable::new();
    assert!(table.take(99).is_none());
}

#[test]
fn test_take_epoch_only_matches_that_epoch() {
    let table = PendingTable::new();
    table.insert(1, request("c1", 1));
    table.insert(2, request("c1", 2));
    table.insert(3, request("c2", 1));

    let old = table.take_epoch(1);
    assert_eq!(old.len(), 2);
    assert_eq!(table.len(), 1);
    assert!(table.take(2).is_some());
}

#[test]
fn test_take_client_only_matches_that_client() {
    let table = PendingTable::new();
    table.insert(1, request("c1", 1));
    table.insert(2, request("c2", 1));
    table.insert(
        3,
        PendingRequest {
            client_id: None,
            client_request_id: json!(null),
            method: "Target.setDiscoverTargets".to_string(),
            epoch: 1,
        },
    );

    let taken = table.take_client("c1");
    assert_eq!(taken.len(), 1);
    assert_eq!(table.len(), 2);
}

#[test]
fn test_take_all_drains_table() {
    let table = PendingTable::new();
    table.insert(1, request("c1", 1));
    table.insert(2, request("c2", 2));

    let all = table.take_all();
    assert_eq!(all.len(), 2);
    assert!(table.is_empty());
}

#[test]
fn test_exactly_one_taker_wins() {
    // Two competing takers (response vs timeout) can never both get the
    // entry.
    let table = PendingTable::new();
    table.insert(7, request("c1", 1));

    let first = table.take(7);
    let second = table.take(7);
    assert!(first.is_some());
    assert!(second.is_none());
}
